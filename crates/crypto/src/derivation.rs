//! Schluessel-Ableitungen
//!
//! - `xor` verknuepft zwei gleich lange Schluessel
//! - `blind` ist die Einwegfunktion des One-way Function Tree
//! - `node_mask` ist die Funktion F der Single-Message-Varianten:
//!   `F(seed, id, k)`, abhaengig vom Gruppen-Seed, der Knoten-ID und dem
//!   bisherigen Knotenschluessel.
//!
//! Beide Hash-Funktionen basieren auf SHA-256 mit Domain-Label. Ist der
//! Schluessel laenger als 32 Bytes, wird mit Zaehlerbloecken erweitert.

use sha2::{Digest, Sha256};

use crate::types::SymmetricKey;
use lkhcast_core::SecretBytes;

const BLIND_LABEL: &[u8] = b"lkhcast-blind-v1";
const MASK_LABEL: &[u8] = b"lkhcast-f-v1";

/// XOR zweier Schluessel, `None` bei unterschiedlicher Laenge oder Suite
pub fn xor(a: &SymmetricKey, b: &SymmetricKey) -> Option<SymmetricKey> {
    if a.len() != b.len() || a.suite() != b.suite() {
        return None;
    }
    let bytes: Vec<u8> = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .map(|(x, y)| x ^ y)
        .collect();
    Some(SymmetricKey::from_parts(a.suite(), SecretBytes::new(bytes)))
}

/// Blendet einen Knotenschluessel (OFT)
pub fn blind(key: &SymmetricKey) -> SymmetricKey {
    let bytes = expand(&[BLIND_LABEL, key.as_bytes()], key.len());
    SymmetricKey::from_parts(key.suite(), SecretBytes::new(bytes))
}

/// F(seed, id, k) fuer die Single-Message-Rotation
pub fn node_mask(seed: &[u8], id: u32, key: &SymmetricKey) -> SymmetricKey {
    let id_bytes = id.to_be_bytes();
    let bytes = expand(&[MASK_LABEL, seed, &id_bytes, key.as_bytes()], key.len());
    SymmetricKey::from_parts(key.suite(), SecretBytes::new(bytes))
}

/// SHA-256 ueber die Teile, auf `len` Bytes gekuerzt oder erweitert
fn expand(teile: &[&[u8]], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut zaehler: u32 = 0;
    while out.len() < len {
        let mut hasher = Sha256::new();
        for teil in teile {
            hasher.update(teil);
        }
        if zaehler > 0 {
            hasher.update(zaehler.to_be_bytes());
        }
        out.extend_from_slice(&hasher.finalize());
        zaehler += 1;
    }
    out.truncate(len);
    out
}
