//! lkhcast-protocol: Wire-Format fuer Multicast-Rekeying und Unicast-Handshake
//!
//! - `rekey` - Rekey-Pakete (Multicast), strukturelle Baum-Operationen
//! - `handshake` - Token und Antworten des Join-/Leave-Handshakes
//! - `wire` - Laengen-praefixierte Frames fuer die Unicast-Verbindung
//!
//! Alle Mehrbyte-Werte sind big-endian. Schluesselmaterial wird hier nur als
//! opakes, bereits verschluesseltes KEK-Segment transportiert.

pub mod error;
pub mod handshake;
pub mod rekey;
pub mod wire;

pub use error::{ProtocolError, ProtocolResult};
pub use handshake::{HandshakeToken, JoinReply, LeaveRequest};
pub use rekey::{KeyEntry, PacketType, RekeyPacket, TreeOp, MAX_PAKET_LAENGE};
pub use wire::FrameCodec;
