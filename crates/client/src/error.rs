//! Fehlertypen des Clients

use thiserror::Error;

use lkhcast_core::AlgorithmVersion;
use lkhcast_crypto::CryptoError;
use lkhcast_protocol::ProtocolError;
use lkhcast_transport::TransportError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Join- oder Leave-Handshake gescheitert
    #[error("Handshake fehlgeschlagen: {0}")]
    Handshake(String),

    #[error("Transportfehler: {0}")]
    Transport(#[from] TransportError),

    /// Server-Antwort nicht dekodierbar
    #[error("Ungueltige Antwort: {0}")]
    UngueltigeAntwort(String),

    #[error("Paket fuer Version {erhalten}, Schluessel gehoeren zu {erwartet}")]
    FalscheVersion {
        erwartet: AlgorithmVersion,
        erhalten: AlgorithmVersion,
    },

    #[error("Schluessel fuer Knoten {0} fehlt")]
    SchluesselFehlt(u32),

    #[error("Kein Zufallswert entschluesselbar")]
    KeinZufallswert,

    #[error("Ungueltiges Paket: {0}")]
    UngueltigesPaket(String),

    #[error("Schluesselpfad inkonsistent: {0}")]
    Inkonsistent(String),

    #[error("Nicht Mitglied einer Gruppe")]
    NichtVerbunden,

    #[error("Bereits Mitglied einer Gruppe")]
    BereitsVerbunden,

    #[error("Kryptofehler: {0}")]
    Krypto(#[from] CryptoError),

    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtocolError),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
