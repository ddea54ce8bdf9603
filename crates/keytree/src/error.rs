//! Fehlertypen fuer Schluesselbaum und Algorithmen

use thiserror::Error;

use lkhcast_core::{LkhError, MemberId};
use lkhcast_crypto::CryptoError;
use lkhcast_protocol::ProtocolError;

/// Fehler bei Baum-Operationen
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Unbekanntes Mitglied: {0}")]
    UnbekanntesMitglied(MemberId),

    #[error("Mitglied bereits im Baum: {0}")]
    MitgliedExistiert(MemberId),

    #[error("Unbekannter Knoten: {0}")]
    UnbekannterKnoten(u32),

    #[error("Ungueltiger Knoten-Handle")]
    UngueltigerHandle,

    #[error("Baum inkonsistent: {0}")]
    Inkonsistent(String),

    #[error("Struktur-Fehler: {0}")]
    Struktur(#[from] LkhError),

    #[error("Krypto-Fehler: {0}")]
    Krypto(#[from] CryptoError),

    #[error("Protokoll-Fehler: {0}")]
    Protokoll(#[from] ProtocolError),
}

pub type TreeResult<T> = Result<T, TreeError>;
