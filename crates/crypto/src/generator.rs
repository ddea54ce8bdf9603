//! Erzeugung frischer Schluessel aus OsRng

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CryptoResult;
use crate::kek::Kek;
use crate::types::{CipherSuite, KeyKind, SymmetricKey};

/// Schluessel-Generator fuer eine feste Cipher-Suite
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyGenerator {
    suite: CipherSuite,
}

impl KeyGenerator {
    pub fn new(suite: CipherSuite) -> Self {
        Self { suite }
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    /// Zufaelliger symmetrischer Schluessel
    pub fn random_key(&self) -> CryptoResult<SymmetricKey> {
        let mut bytes = vec![0u8; self.suite.key_len()];
        OsRng.fill_bytes(&mut bytes);
        SymmetricKey::new(self.suite, bytes)
    }

    /// Frischer KEK fuer den Knoten mit ID `id`
    pub fn gen_kek(&self, id: u32) -> CryptoResult<Kek> {
        Ok(Kek::new(id, KeyKind::Kek, self.random_key()?))
    }

    /// Frischer Session-Schluessel der Generation `id`
    pub fn gen_sek(&self, id: u32) -> CryptoResult<Kek> {
        Ok(Kek::new(id, KeyKind::Sek, self.random_key()?))
    }
}
