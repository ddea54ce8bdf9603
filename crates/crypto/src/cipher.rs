//! AEAD-Verschluesselung von Schluesselmaterial
//!
//! ## Format
//! ```text
//! [nonce(12)] [ciphertext + auth_tag(16)]
//! ```
//!
//! Die AAD wird nicht mit uebertragen, der Aufrufer muss sie beim Oeffnen
//! identisch rekonstruieren (bei KEK-Segmenten der 8-Byte-Header).

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce as AesNonce,
};
use chacha20poly1305::{ChaCha20Poly1305, Key as ChaChaKey, Nonce as ChaChaNonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};
use crate::types::{CipherSuite, SymmetricKey};

/// Nonce-Laenge beider Suiten
pub const NONCE_LEN: usize = 12;
/// Laenge des Authentifizierungs-Tags
pub const TAG_LEN: usize = 16;

/// Verschluesselt `plaintext` mit zufaelliger Nonce
pub fn seal(key: &SymmetricKey, plaintext: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = match key.suite() {
        CipherSuite::Aes256Gcm => encrypt_aes256gcm(plaintext, key.as_bytes(), &nonce, aad)?,
        CipherSuite::ChaCha20Poly1305 => {
            encrypt_chacha20(plaintext, key.as_bytes(), &nonce, aad)?
        }
    };

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Entschluesselt die Ausgabe von [`seal`]
///
/// Falscher Schluessel oder manipulierte Daten fuehren zu
/// `CryptoError::Entschluesselung`.
pub fn open(key: &SymmetricKey, data: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
    if data.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::UngueltigeDaten(format!(
            "Chiffrat zu kurz: {} Bytes",
            data.len()
        )));
    }
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);

    match key.suite() {
        CipherSuite::Aes256Gcm => decrypt_aes256gcm(ciphertext, key.as_bytes(), nonce, aad),
        CipherSuite::ChaCha20Poly1305 => decrypt_chacha20(ciphertext, key.as_bytes(), nonce, aad),
    }
}

fn pruefe_laenge(key_bytes: &[u8]) -> CryptoResult<()> {
    if key_bytes.len() != 32 {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet: 32,
            erhalten: key_bytes.len(),
        });
    }
    Ok(())
}

fn encrypt_aes256gcm(
    plaintext: &[u8],
    key_bytes: &[u8],
    nonce_bytes: &[u8],
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    pruefe_laenge(key_bytes)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes));
    cipher
        .encrypt(
            AesNonce::from_slice(nonce_bytes),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))
}

fn decrypt_aes256gcm(
    ciphertext: &[u8],
    key_bytes: &[u8],
    nonce_bytes: &[u8],
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    pruefe_laenge(key_bytes)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes));
    cipher
        .decrypt(
            AesNonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|e| CryptoError::Entschluesselung(e.to_string()))
}

fn encrypt_chacha20(
    plaintext: &[u8],
    key_bytes: &[u8],
    nonce_bytes: &[u8],
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    pruefe_laenge(key_bytes)?;
    let cipher = ChaCha20Poly1305::new(ChaChaKey::from_slice(key_bytes));
    cipher
        .encrypt(
            ChaChaNonce::from_slice(nonce_bytes),
            chacha20poly1305::aead::Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))
}

fn decrypt_chacha20(
    ciphertext: &[u8],
    key_bytes: &[u8],
    nonce_bytes: &[u8],
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    pruefe_laenge(key_bytes)?;
    let cipher = ChaCha20Poly1305::new(ChaChaKey::from_slice(key_bytes));
    cipher
        .decrypt(
            ChaChaNonce::from_slice(nonce_bytes),
            chacha20poly1305::aead::Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|e| CryptoError::Entschluesselung(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
