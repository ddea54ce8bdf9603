//! Gemeinsame Identifikationstypen fuer lkhcast
//!
//! IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Mitglieds-IDs und Knoten-IDs zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};

use crate::error::{LkhError, Result};

/// Maximale Anzahl Ebenen im Schluesselbaum (Knoten-ID passt in u32)
pub const MAX_EBENEN: u32 = 32;

// ---------------------------------------------------------------------------
// MemberId
// ---------------------------------------------------------------------------

/// Eindeutige ID eines Multicast-Gruppenmitglieds
///
/// Wird beim Join vom Server vergeben und waehrend der Laufzeit des Servers
/// nie wiederverwendet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId(pub u32);

impl MemberId {
    /// Gibt den inneren Wert zurueck
    pub fn inner(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "member:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// NodeName
// ---------------------------------------------------------------------------

/// Struktureller Name eines Knotens im Schluesselbaum
///
/// Die Wurzel heisst `(1,1)`. Linkes Kind von `(r,c)` ist `(r+1, 2c-1)`,
/// rechtes Kind `(r+1, 2c)`. Die numerische Identitaet ist der Heap-Index
/// `2^(r-1) + c - 1`: Wurzel = 1, linkes Kind = 2i, rechtes Kind = 2i+1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeName {
    pub row: u32,
    pub col: u32,
}

impl NodeName {
    /// Name der Wurzel
    pub const ROOT: NodeName = NodeName { row: 1, col: 1 };

    /// Erstellt einen validierten Knotennamen
    pub fn new(row: u32, col: u32) -> Result<Self> {
        if row == 0 || row > MAX_EBENEN || col == 0 || u64::from(col) > (1u64 << (row - 1)) {
            return Err(LkhError::UngueltigerKnotenname { row, col });
        }
        Ok(Self { row, col })
    }

    /// Rekonstruiert den Namen aus der numerischen Identitaet
    pub fn from_id(id: u32) -> Result<Self> {
        if id == 0 {
            return Err(LkhError::UngueltigeKnotenId(id));
        }
        let row = MAX_EBENEN - id.leading_zeros();
        let col = id - (1u32 << (row - 1)) + 1;
        Ok(Self { row, col })
    }

    /// Numerische Identitaet (gleichzeitig die KEK-ID des Knotens)
    pub fn id(&self) -> u32 {
        (1u32 << (self.row - 1)) + self.col - 1
    }

    /// Name des linken Kindes
    pub fn left_child(&self) -> Result<Self> {
        if self.row >= MAX_EBENEN {
            return Err(LkhError::BaumZuTief { max: MAX_EBENEN });
        }
        Ok(Self {
            row: self.row + 1,
            col: 2 * self.col - 1,
        })
    }

    /// Name des rechten Kindes
    pub fn right_child(&self) -> Result<Self> {
        if self.row >= MAX_EBENEN {
            return Err(LkhError::BaumZuTief { max: MAX_EBENEN });
        }
        Ok(Self {
            row: self.row + 1,
            col: 2 * self.col,
        })
    }

    /// Name des Kindes auf der angegebenen Seite
    pub fn child(&self, links: bool) -> Result<Self> {
        if links {
            self.left_child()
        } else {
            self.right_child()
        }
    }

    /// Name des Elternknotens (None fuer die Wurzel)
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            row: self.row - 1,
            col: self.col.div_ceil(2),
        })
    }

    /// Name des Geschwisterknotens (None fuer die Wurzel)
    pub fn sibling(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let col = if self.is_left() {
            self.col + 1
        } else {
            self.col - 1
        };
        Some(Self { row: self.row, col })
    }

    /// Linke Kinder haben eine ungerade Spalte
    pub fn is_left(&self) -> bool {
        self.col % 2 == 1
    }

    pub fn is_root(&self) -> bool {
        self.row == 1
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

// ---------------------------------------------------------------------------
// AlgorithmVersion
// ---------------------------------------------------------------------------

/// Variante des Rekeying-Algorithmus
///
/// Der numerische Wert wird im Paket-Header und im Join-Handshake uebertragen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AlgorithmVersion {
    #[default]
    Simple = 1,
    Batch = 2,
    BalancedBatch = 3,
    Oft = 4,
    SingleMessage = 5,
    BatchSingleMessage = 6,
}

impl AlgorithmVersion {
    /// Konvertiert ein Byte in eine `AlgorithmVersion`
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Simple),
            2 => Some(Self::Batch),
            3 => Some(Self::BalancedBatch),
            4 => Some(Self::Oft),
            5 => Some(Self::SingleMessage),
            6 => Some(Self::BatchSingleMessage),
            _ => None,
        }
    }

    /// Liest die Version aus dem 4-Byte-Feld des Join-Handshakes
    pub fn from_u32(wert: u32) -> Result<Self> {
        u8::try_from(wert)
            .ok()
            .and_then(Self::from_u8)
            .ok_or(LkhError::UnbekannteVersion(wert))
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Batch-Varianten sammeln Aenderungen und rekeyen per Timer
    pub fn is_batch(self) -> bool {
        matches!(
            self,
            Self::Batch | Self::BalancedBatch | Self::BatchSingleMessage
        )
    }

    /// Single-Message-Varianten rotieren mit einem Zufallswert R
    pub fn is_single_message(self) -> bool {
        matches!(self, Self::SingleMessage | Self::BatchSingleMessage)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Batch => "batch",
            Self::BalancedBatch => "balanced_batch",
            Self::Oft => "oft",
            Self::SingleMessage => "single_message",
            Self::BatchSingleMessage => "batch_single_message",
        }
    }
}

impl std::fmt::Display for AlgorithmVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// SecretBytes
// ---------------------------------------------------------------------------

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone, Default)]
pub struct SecretBytes(Vec<u8>);

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl PartialEq for SecretBytes {
    fn eq(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        // Ohne fruehen Abbruch vergleichen
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Eq for SecretBytes {}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
