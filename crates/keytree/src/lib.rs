//! lkhcast-keytree: Schluesselbaum und Rekeying-Algorithmen
//!
//! Der Server haelt pro Gruppe einen [`KeyTree`] und einen
//! [`RekeyAlgorithm`], der Joins und Leaves in Rekey-Pakete uebersetzt.
//! Alle Mutationen einer Runde laufen ueber `&mut self`; die Serialisierung
//! paralleler Anfragen ist Sache des Aufrufers.

pub mod algorithm;
pub mod error;
pub mod node;
pub mod tree;

pub use algorithm::{
    AlgorithmConfig, AppliedChanges, LkhStrategy, OftStrategy, RekeyAlgorithm, RekeyStrategy,
    SingleMessageStrategy,
};
pub use error::{TreeError, TreeResult};
pub use node::{Node, NodeHandle};
pub use tree::{InsertOutcome, KeyTree, RemoveOutcome};
