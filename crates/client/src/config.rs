//! Client-Konfiguration

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use lkhcast_crypto::CipherSuite;
use lkhcast_transport::MulticastConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Unicast-Adresse des Gruppen-Servers
    pub server: SocketAddr,
    pub multicast: MulticastConfig,
    /// Erwartete Cipher-Suite; `None` uebernimmt die des Servers
    pub suite: Option<CipherSuite>,
    /// Wartezeit je Handshake-Nachricht
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 4445)),
            multicast: MulticastConfig::default(),
            suite: None,
            timeout_ms: 5_000,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
