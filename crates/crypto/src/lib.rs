//! # lkhcast-crypto
//!
//! Kryptografische Bausteine fuer die Logical Key Hierarchy.
//!
//! ## Module
//! - `types` - Cipher-Suite, Schluesselart, symmetrischer Schluessel
//! - `cipher` - AEAD-Verschluesselung von Schluesselmaterial
//! - `kek` - Key-Encryption-Key mit Wire-Serialisierung
//! - `generator` - Erzeugung frischer KEKs und SEKs
//! - `derivation` - XOR, Blind (OFT) und F (Single-Message)
//! - `key_exchange` - X25519 Diffie-Hellman fuer den Join-Handshake
//! - `error` - Fehlertypen

pub mod cipher;
pub mod derivation;
pub mod error;
pub mod generator;
pub mod kek;
pub mod key_exchange;
pub mod types;

// Bequeme Re-Exports
pub use derivation::{blind, node_mask, xor};
pub use error::{CryptoError, CryptoResult};
pub use generator::KeyGenerator;
pub use kek::Kek;
pub use key_exchange::{hkdf_derive, KeyExchange, HANDSHAKE_HELLO_LEN};
pub use lkhcast_core::SecretBytes;
pub use types::{CipherSuite, KeyKind, KeyTag, SymmetricKey};
