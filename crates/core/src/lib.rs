//! lkhcast-core: Gemeinsame Typen, Events und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen lkhcast-Crates gemeinsam genutzt werden: Mitglieds-IDs,
//! strukturelle Knotennamen im Schluesselbaum, die LKH-Algorithmus-Version
//! und den Event-Kanal zur Anwendung.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{LkhError, Result};
pub use event::{EventSink, GroupEvent, NullSink};
pub use types::{AlgorithmVersion, MemberId, NodeName, SecretBytes};
