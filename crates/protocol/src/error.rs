//! Fehlertypen fuer das Wire-Format

use thiserror::Error;

/// Fehler beim Kodieren oder Dekodieren
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Paket unvollstaendig: {feld} benoetigt {erwartet} Bytes, {vorhanden} vorhanden")]
    Unvollstaendig {
        feld: &'static str,
        erwartet: usize,
        vorhanden: usize,
    },

    #[error("Unbekannte Algorithmus-Version im Paket: {0}")]
    UnbekannteVersion(u8),

    #[error("Unbekannte Baum-Operation: {0}")]
    UnbekannteOperation(u8),

    #[error("Zu viele Elemente fuer {feld}: {anzahl}")]
    ZuViele { feld: &'static str, anzahl: usize },

    #[error("Ueberzaehlige Bytes am Paketende: {0}")]
    UeberzaehligeBytes(usize),

    #[error("Unerwartete Nachricht: {0}")]
    UnerwarteteNachricht(String),

    #[error("Rekey-Paket zu gross: {laenge} Bytes (Maximum: {max} Bytes)")]
    PaketZuGross { laenge: usize, max: usize },

    #[error("Frame zu gross: {laenge} Bytes (Maximum: {max} Bytes)")]
    FrameZuGross { laenge: usize, max: usize },

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
