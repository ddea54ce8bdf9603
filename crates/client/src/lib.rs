//! lkhcast-client: Mitgliedsseite der Gruppe
//!
//! - `store` - Schluesselpfad und Verarbeitung der Rekey-Pakete
//! - `engine` - Join-/Leave-Handshake und Multicast-Empfangs-Loop
//! - `sink` - Event-Weiterleitung ueber einen tokio-Kanal
//! - `config` - Server- und Multicast-Adressen

pub mod config;
pub mod engine;
pub mod error;
pub mod sink;
pub mod store;

pub use config::ClientConfig;
pub use engine::{ClientEngine, ClientZustand};
pub use error::{ClientError, ClientResult};
pub use sink::ChannelSink;
pub use store::StoredKeys;
