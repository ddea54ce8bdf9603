//! Unicast-Handshake fuer Join und Leave
//!
//! ```text
//! Join:   C -> S  "joining"
//!         S -> C  [server_pub 32][server_random 32]
//!         C -> S  [client_pub 32][client_random 32]
//!         S -> C  JoinReply: [version u32][member u32][KEK-Segment]
//!         C -> S  "end"
//!
//! Leave:  C -> S  "leaving"
//!         S -> C  "id?"
//!         C -> S  LeaveRequest: [member u32]
//!         S -> C  "left" | "unknown"
//! ```
//!
//! Das KEK-Segment der JoinReply ist mit dem Session-Schluessel aus dem
//! X25519-Austausch verschluesselt.

use crate::error::{ProtocolError, ProtocolResult};
use lkhcast_core::{AlgorithmVersion, MemberId};

/// Feste Text-Token des Handshakes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeToken {
    Joining,
    End,
    Leaving,
    IdAnfrage,
    Left,
    Unknown,
}

impl HandshakeToken {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Joining => b"joining",
            Self::End => b"end",
            Self::Leaving => b"leaving",
            Self::IdAnfrage => b"id?",
            Self::Left => b"left",
            Self::Unknown => b"unknown",
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"joining" => Some(Self::Joining),
            b"end" => Some(Self::End),
            b"leaving" => Some(Self::Leaving),
            b"id?" => Some(Self::IdAnfrage),
            b"left" => Some(Self::Left),
            b"unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Erwartet genau dieses Token, sonst `UnerwarteteNachricht`
    pub fn erwarten(self, bytes: &[u8]) -> ProtocolResult<()> {
        if Self::from_bytes(bytes) == Some(self) {
            Ok(())
        } else {
            Err(ProtocolError::UnerwarteteNachricht(format!(
                "erwartet {:?}, erhalten {} Bytes",
                self,
                bytes.len()
            )))
        }
    }
}

/// Antwort des Servers auf einen erfolgreichen Join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinReply {
    pub version: AlgorithmVersion,
    pub member: MemberId,
    /// Blatt-KEK, verschluesselt mit dem Session-Schluessel
    pub kek: Vec<u8>,
}

impl JoinReply {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.kek.len());
        out.extend_from_slice(&u32::from(self.version.as_u8()).to_be_bytes());
        out.extend_from_slice(&self.member.inner().to_be_bytes());
        out.extend_from_slice(&self.kek);
        out
    }

    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        if bytes.len() < 8 {
            return Err(ProtocolError::Unvollstaendig {
                feld: "join_reply",
                erwartet: 8,
                vorhanden: bytes.len(),
            });
        }
        let version_wert = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let version = AlgorithmVersion::from_u32(version_wert)
            .map_err(|_| ProtocolError::UnbekannteVersion(version_wert.min(255) as u8))?;
        let member = MemberId(u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]));
        Ok(Self {
            version,
            member,
            kek: bytes[8..].to_vec(),
        })
    }
}

/// Mitglieds-ID in der Leave-Anfrage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveRequest {
    pub member: MemberId,
}

impl LeaveRequest {
    pub fn encode(&self) -> [u8; 4] {
        self.member.inner().to_be_bytes()
    }

    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let arr: [u8; 4] = bytes
            .try_into()
            .map_err(|_| ProtocolError::UnerwarteteNachricht(format!(
                "Leave-Anfrage mit {} statt 4 Bytes",
                bytes.len()
            )))?;
        Ok(Self {
            member: MemberId(u32::from_be_bytes(arr)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_zuordnung() {
        for token in [
            HandshakeToken::Joining,
            HandshakeToken::End,
            HandshakeToken::Leaving,
            HandshakeToken::IdAnfrage,
            HandshakeToken::Left,
            HandshakeToken::Unknown,
        ] {
            assert_eq!(HandshakeToken::from_bytes(token.as_bytes()), Some(token));
        }
        assert_eq!(HandshakeToken::from_bytes(b"JOINING"), None);
        assert!(HandshakeToken::End.erwarten(b"left").is_err());
    }

    #[test]
    fn join_reply_format() {
        let reply = JoinReply {
            version: AlgorithmVersion::Oft,
            member: MemberId(100),
            kek: vec![1, 2, 3],
        };
        let bytes = reply.encode();
        assert_eq!(&bytes[..8], &[0, 0, 0, 4, 0, 0, 0, 100]);
        assert_eq!(JoinReply::decode(&bytes).unwrap(), reply);
        assert!(JoinReply::decode(&bytes[..7]).is_err());
    }

    #[test]
    fn join_reply_unbekannte_version() {
        let bytes = [0, 0, 0, 9, 0, 0, 0, 1];
        assert!(matches!(
            JoinReply::decode(&bytes),
            Err(ProtocolError::UnbekannteVersion(9))
        ));
    }

    #[test]
    fn leave_anfrage() {
        let req = LeaveRequest {
            member: MemberId(0x0102_0304),
        };
        assert_eq!(req.encode(), [1, 2, 3, 4]);
        assert_eq!(LeaveRequest::decode(&[1, 2, 3, 4]).unwrap(), req);
        assert!(LeaveRequest::decode(&[1, 2, 3]).is_err());
    }
}
