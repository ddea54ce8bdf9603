//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};
use lkhcast_core::SecretBytes;

/// Symmetrischer Algorithmus, einmalig beim Server-Setup gewaehlt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CipherSuite {
    #[default]
    #[serde(rename = "aes256gcm")]
    Aes256Gcm,
    #[serde(rename = "chacha20poly1305")]
    ChaCha20Poly1305,
}

impl CipherSuite {
    /// Schluessellaenge in Bytes
    pub fn key_len(self) -> usize {
        32
    }

    /// Kennung im oberen Halbwort des Typ-Tags
    pub fn id(self) -> u16 {
        match self {
            Self::Aes256Gcm => 1,
            Self::ChaCha20Poly1305 => 2,
        }
    }

    pub fn from_id(id: u16) -> CryptoResult<Self> {
        match id {
            1 => Ok(Self::Aes256Gcm),
            2 => Ok(Self::ChaCha20Poly1305),
            andere => Err(CryptoError::UnbekannteSuite(andere)),
        }
    }
}

/// Art des transportierten Schluesselmaterials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// Key-Encryption-Key eines Baumknotens
    Kek,
    /// Session-Encryption-Key
    Sek,
    /// Geblendeter Knotenschluessel (OFT)
    Blinded,
    /// Geblendeter Zufallswert R (Single-Message)
    Random,
}

impl KeyKind {
    pub fn id(self) -> u16 {
        match self {
            Self::Kek => 1,
            Self::Sek => 2,
            Self::Blinded => 3,
            Self::Random => 4,
        }
    }

    pub fn from_id(id: u16) -> CryptoResult<Self> {
        match id {
            1 => Ok(Self::Kek),
            2 => Ok(Self::Sek),
            3 => Ok(Self::Blinded),
            4 => Ok(Self::Random),
            andere => Err(CryptoError::UnbekannteSchluesselart(andere)),
        }
    }
}

/// Typ-Tag eines KEK-Segments: `(suite << 16) | kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyTag {
    pub suite: CipherSuite,
    pub kind: KeyKind,
}

impl KeyTag {
    pub fn new(suite: CipherSuite, kind: KeyKind) -> Self {
        Self { suite, kind }
    }

    pub fn to_u32(self) -> u32 {
        (u32::from(self.suite.id()) << 16) | u32::from(self.kind.id())
    }

    pub fn from_u32(wert: u32) -> CryptoResult<Self> {
        let suite = CipherSuite::from_id((wert >> 16) as u16)?;
        let kind = KeyKind::from_id((wert & 0xFFFF) as u16)?;
        Ok(Self { suite, kind })
    }
}

/// Symmetrischer Schluessel samt Cipher-Suite
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey {
    suite: CipherSuite,
    bytes: SecretBytes,
}

impl SymmetricKey {
    /// Erstellt einen Schluessel, prueft die Laenge gegen die Suite
    pub fn new(suite: CipherSuite, bytes: Vec<u8>) -> CryptoResult<Self> {
        if bytes.len() != suite.key_len() {
            return Err(CryptoError::UngueltigeSchluesselLaenge {
                erwartet: suite.key_len(),
                erhalten: bytes.len(),
            });
        }
        Ok(Self {
            suite,
            bytes: SecretBytes::new(bytes),
        })
    }

    /// Erstellt einen Schluessel ohne Laengenpruefung
    ///
    /// Nur fuer abgeleitete Werte, deren Laenge bereits feststeht.
    pub(crate) fn from_parts(suite: CipherSuite, bytes: SecretBytes) -> Self {
        Self { suite, bytes }
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_bytes()
    }

    pub fn secret(&self) -> &SecretBytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("suite", &self.suite)
            .field("bytes", &self.bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_kodierung() {
        let tag = KeyTag::new(CipherSuite::ChaCha20Poly1305, KeyKind::Blinded);
        assert_eq!(tag.to_u32(), 0x0002_0003);
        assert_eq!(KeyTag::from_u32(0x0002_0003).unwrap(), tag);
    }

    #[test]
    fn unbekannter_tag() {
        assert!(matches!(
            KeyTag::from_u32(0x0009_0001),
            Err(CryptoError::UnbekannteSuite(9))
        ));
        assert!(matches!(
            KeyTag::from_u32(0x0001_0077),
            Err(CryptoError::UnbekannteSchluesselart(0x77))
        ));
    }

    #[test]
    fn schluessel_laenge_wird_geprueft() {
        assert!(SymmetricKey::new(CipherSuite::Aes256Gcm, vec![0u8; 32]).is_ok());
        assert!(matches!(
            SymmetricKey::new(CipherSuite::Aes256Gcm, vec![0u8; 16]),
            Err(CryptoError::UngueltigeSchluesselLaenge {
                erwartet: 32,
                erhalten: 16
            })
        ));
    }

    #[test]
    fn suite_serde_name() {
        let json = serde_json::to_string(&CipherSuite::ChaCha20Poly1305).unwrap();
        assert_eq!(json, "\"chacha20poly1305\"");
    }
}
