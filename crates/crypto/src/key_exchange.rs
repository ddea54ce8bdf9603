//! X25519 Diffie-Hellman fuer den Join-Handshake
//!
//! Ablauf auf der Unicast-Verbindung:
//! 1. Server sendet `[public_key(32)] [server_random(32)]`
//! 2. Client sendet `[public_key(32)] [client_random(32)]`
//! 3. Beide leiten per HKDF-SHA256 den Session-Schluessel ab
//!
//! Mit dem Session-Schluessel wird der Blatt-KEK des neuen Mitglieds
//! verschluesselt uebertragen.

use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};

use crate::error::{CryptoError, CryptoResult};
use crate::types::{CipherSuite, SymmetricKey};

/// Laenge einer Hello-Nachricht: Public Key + Zufallswert
pub const HANDSHAKE_HELLO_LEN: usize = 64;

const SESSION_INFO: &[u8] = b"lkhcast-session-key-v1";

/// Ephemere Key-Exchange-Instanz (fuer Client und Server identisch)
pub struct KeyExchange {
    ephemeral_secret: Option<EphemeralSecret>,
    public_key: [u8; 32],
    random: [u8; 32],
}

impl KeyExchange {
    /// Erstellt eine Instanz mit frischem Schluesselpaar und Zufallswert
    pub fn new() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public_key = X25519PublicKey::from(&secret);
        let mut random = [0u8; 32];
        OsRng.fill_bytes(&mut random);
        Self {
            ephemeral_secret: Some(secret),
            public_key: public_key.to_bytes(),
            random,
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.public_key
    }

    pub fn random(&self) -> [u8; 32] {
        self.random
    }

    /// Eigene Hello-Nachricht
    pub fn hello(&self) -> [u8; HANDSHAKE_HELLO_LEN] {
        let mut out = [0u8; HANDSHAKE_HELLO_LEN];
        out[..32].copy_from_slice(&self.public_key);
        out[32..].copy_from_slice(&self.random);
        out
    }

    /// Zerlegt eine Hello-Nachricht der Gegenseite
    pub fn parse_hello(bytes: &[u8]) -> CryptoResult<([u8; 32], [u8; 32])> {
        if bytes.len() != HANDSHAKE_HELLO_LEN {
            return Err(CryptoError::KeyExchange(format!(
                "Hello hat {} statt {} Bytes",
                bytes.len(),
                HANDSHAKE_HELLO_LEN
            )));
        }
        let mut public_key = [0u8; 32];
        let mut random = [0u8; 32];
        public_key.copy_from_slice(&bytes[..32]);
        random.copy_from_slice(&bytes[32..]);
        Ok((public_key, random))
    }

    /// Fuehrt den DH-Austausch durch und leitet den Session-Schluessel ab
    ///
    /// Das ephemere Secret wird dabei verbraucht.
    pub fn session_key(
        &mut self,
        peer_public_key: &[u8; 32],
        client_random: &[u8; 32],
        server_random: &[u8; 32],
        suite: CipherSuite,
    ) -> CryptoResult<SymmetricKey> {
        let secret = self
            .ephemeral_secret
            .take()
            .ok_or_else(|| CryptoError::KeyExchange("Secret bereits verwendet".to_string()))?;

        let peer = X25519PublicKey::from(*peer_public_key);
        let dh_output = secret.diffie_hellman(&peer);

        let mut salt = [0u8; 64];
        salt[..32].copy_from_slice(client_random);
        salt[32..].copy_from_slice(server_random);

        let bytes = hkdf_derive(dh_output.as_bytes(), &salt, SESSION_INFO, suite.key_len())?;
        SymmetricKey::new(suite, bytes)
    }
}

impl Default for KeyExchange {
    fn default() -> Self {
        Self::new()
    }
}

/// HKDF-basierte Key Derivation (allgemein verwendbar)
pub fn hkdf_derive(ikm: &[u8], salt: &[u8], info: &[u8], len: usize) -> CryptoResult<Vec<u8>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(okm)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
