//! Fehlertypen des Gruppen-Servers

use thiserror::Error;

use lkhcast_crypto::CryptoError;
use lkhcast_keytree::TreeError;
use lkhcast_protocol::ProtocolError;
use lkhcast_transport::TransportError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transportfehler: {0}")]
    Transport(#[from] TransportError),

    /// Baum-Operation abgelehnt, der Baum ist unveraendert
    #[error("Schluesselbaum: {0}")]
    Baum(#[from] TreeError),

    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtocolError),

    #[error("Kryptofehler: {0}")]
    Krypto(#[from] CryptoError),

    /// Erste Nachricht weder "joining" noch "leaving"
    #[error("Unerwartete Anfrage ({0} Bytes)")]
    UnerwarteteAnfrage(usize),

    #[error("Handshake abgebrochen: {0}")]
    Handshake(String),
}

pub type ServerResult<T> = std::result::Result<T, ServerError>;
