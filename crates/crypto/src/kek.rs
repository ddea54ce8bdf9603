//! Key-Encryption-Key (KEK)
//!
//! Ein KEK ist das Schluesselmaterial eines Baumknotens (oder eines SEK,
//! Blind- bzw. Zufallswerts) zusammen mit seiner ID und seinem Typ-Tag.
//!
//! ## Wire-Format
//! ```text
//! [id(4, BE)] [tag(4, BE)] [nonce(12)] [ciphertext + auth_tag(16)]
//! ```
//! Die ersten 8 Bytes dienen als AAD. ID und Tag sind damit lesbar, aber
//! nicht austauschbar.

use crate::cipher::{self, NONCE_LEN, TAG_LEN};
use crate::error::{CryptoError, CryptoResult};
use crate::types::{CipherSuite, KeyKind, KeyTag, SymmetricKey};

/// Laenge des Klartext-Headers eines KEK-Segments
pub const KEK_HEADER_LEN: usize = 8;

/// Schluessel mit ID und Art
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kek {
    /// Knoten-ID (Heap-Index) bzw. SEK-Generation
    pub id: u32,
    pub kind: KeyKind,
    pub key: SymmetricKey,
}

impl Kek {
    pub fn new(id: u32, kind: KeyKind, key: SymmetricKey) -> Self {
        Self { id, kind, key }
    }

    pub fn suite(&self) -> CipherSuite {
        self.key.suite()
    }

    pub fn tag(&self) -> KeyTag {
        KeyTag::new(self.key.suite(), self.kind)
    }

    /// Minimale Laenge eines serialisierten Segments fuer die Suite
    pub fn segment_len(suite: CipherSuite) -> usize {
        KEK_HEADER_LEN + NONCE_LEN + suite.key_len() + TAG_LEN
    }

    /// Serialisiert den KEK, verschluesselt mit `cipher`
    pub fn to_bytes(&self, cipher: &SymmetricKey) -> CryptoResult<Vec<u8>> {
        let header = self.header();
        let sealed = cipher::seal(cipher, self.key.as_bytes(), &header)?;

        let mut out = Vec::with_capacity(KEK_HEADER_LEN + sealed.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Liest ID und Tag ohne zu entschluesseln
    pub fn peek(bytes: &[u8]) -> CryptoResult<(u32, KeyTag)> {
        if bytes.len() < KEK_HEADER_LEN {
            return Err(CryptoError::UngueltigeDaten(format!(
                "KEK-Segment zu kurz: {} Bytes",
                bytes.len()
            )));
        }
        let id = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let tag = KeyTag::from_u32(u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]))?;
        Ok((id, tag))
    }

    /// Entschluesselt ein Segment mit `cipher`
    pub fn from_bytes(cipher: &SymmetricKey, bytes: &[u8]) -> CryptoResult<Self> {
        let (id, tag) = Self::peek(bytes)?;
        let (header, sealed) = bytes.split_at(KEK_HEADER_LEN);
        let klartext = cipher::open(cipher, sealed, header)?;
        let key = SymmetricKey::new(tag.suite, klartext)?;
        Ok(Self {
            id,
            kind: tag.kind,
            key,
        })
    }

    fn header(&self) -> [u8; KEK_HEADER_LEN] {
        let mut header = [0u8; KEK_HEADER_LEN];
        header[..4].copy_from_slice(&self.id.to_be_bytes());
        header[4..].copy_from_slice(&self.tag().to_u32().to_be_bytes());
        header
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::KeyGenerator;

    #[test]
    fn kek_serialisierung() {
        let gen = KeyGenerator::new(CipherSuite::Aes256Gcm);
        let kek = gen.gen_kek(5).unwrap();
        let huelle = gen.random_key().unwrap();

        let bytes = kek.to_bytes(&huelle).unwrap();
        assert_eq!(bytes.len(), Kek::segment_len(CipherSuite::Aes256Gcm));
        assert_eq!(&bytes[..4], &5u32.to_be_bytes());

        let zurueck = Kek::from_bytes(&huelle, &bytes).unwrap();
        assert_eq!(zurueck, kek);
    }

    #[test]
    fn falscher_huellschluessel() {
        let gen = KeyGenerator::new(CipherSuite::ChaCha20Poly1305);
        let kek = gen.gen_sek(1).unwrap();
        let bytes = kek.to_bytes(&gen.random_key().unwrap()).unwrap();
        assert!(matches!(
            Kek::from_bytes(&gen.random_key().unwrap(), &bytes),
            Err(CryptoError::Entschluesselung(_))
        ));
    }

    #[test]
    fn manipulierte_id_wird_erkannt() {
        let gen = KeyGenerator::new(CipherSuite::Aes256Gcm);
        let huelle = gen.random_key().unwrap();
        let mut bytes = gen.gen_kek(2).unwrap().to_bytes(&huelle).unwrap();
        bytes[3] = 3;
        assert_eq!(Kek::peek(&bytes).unwrap().0, 3);
        assert!(Kek::from_bytes(&huelle, &bytes).is_err());
    }

    #[test]
    fn peek_liest_tag() {
        let gen = KeyGenerator::new(CipherSuite::ChaCha20Poly1305);
        let huelle = gen.random_key().unwrap();
        let bytes = gen.gen_sek(9).unwrap().to_bytes(&huelle).unwrap();
        let (id, tag) = Kek::peek(&bytes).unwrap();
        assert_eq!(id, 9);
        assert_eq!(tag.kind, KeyKind::Sek);
        assert_eq!(tag.suite, CipherSuite::ChaCha20Poly1305);
    }
}
