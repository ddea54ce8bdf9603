//! lkhcast-transport: Kanaele zwischen Server und Mitgliedern
//!
//! Unicast traegt die Join- und Leave-Handshakes, Multicast die
//! Rekey-Pakete an die ganze Gruppe.

pub mod error;
pub mod multicast;
pub mod unicast;

pub use error::{TransportError, TransportResult};
pub use multicast::{
    MemoryMulticast, MemoryReceiver, MemorySender, MulticastConfig, MulticastReceiver,
    MulticastSender, UdpMulticastReceiver, UdpMulticastSender,
};
pub use unicast::{FramedUnicast, HandshakeRole, TcpUnicast, UnicastChannel};
