//! Fehlertypen der Transportschicht

use thiserror::Error;

use lkhcast_crypto::CryptoError;
use lkhcast_protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtocolError),

    #[error("Kryptofehler: {0}")]
    Krypto(#[from] CryptoError),

    #[error("Verbindung geschlossen")]
    Geschlossen,

    #[error("Zeitueberschreitung nach {0} ms")]
    Zeitueberschreitung(u64),

    #[error("Multicast-Gruppe nicht beigetreten")]
    NichtBeigetreten,

    #[error("Datagramm zu gross: {laenge} Bytes (max {max})")]
    DatagrammZuGross { laenge: usize, max: usize },
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;
