//! Fehlertypen fuer lkhcast-core
//!
//! Deckt die Validierung der gemeinsamen Typen ab (Knotennamen,
//! Algorithmus-Versionen). Die uebrigen Crates definieren eigene Fehler-Enums.

use thiserror::Error;

/// Result-Alias fuer lkhcast-core
pub type Result<T> = std::result::Result<T, LkhError>;

/// Fehler bei der Arbeit mit den gemeinsamen Typen
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LkhError {
    #[error("Ungueltiger Knotenname: Zeile {row}, Spalte {col}")]
    UngueltigerKnotenname { row: u32, col: u32 },

    #[error("Ungueltige Knoten-ID: {0}")]
    UngueltigeKnotenId(u32),

    #[error("Baum zu tief: maximal {max} Ebenen")]
    BaumZuTief { max: u32 },

    #[error("Unbekannte Algorithmus-Version: {0}")]
    UnbekannteVersion(u32),
}
