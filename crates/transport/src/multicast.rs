//! Multicast-Kanaele fuer Rekey-Pakete
//!
//! - [`UdpMulticastSender`] / [`UdpMulticastReceiver`]: IPv4-Multicast
//! - [`MemoryMulticast`]: prozessinterner Verteiler auf Basis von
//!   `tokio::sync::broadcast`, fuer Tests und eingebettete Gruppen
//!
//! Ein Empfaenger sieht nur Pakete, die nach `join_group` gesendet wurden.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use crate::error::{TransportError, TransportResult};

/// Groesste UDP-Nutzlast ueber IPv4
pub const MAX_DATAGRAM: usize = lkhcast_protocol::MAX_PAKET_LAENGE;

#[async_trait]
pub trait MulticastSender: Send + Sync {
    async fn send(&self, data: &[u8]) -> TransportResult<()>;
}

#[async_trait]
pub trait MulticastReceiver: Send {
    async fn join_group(&mut self) -> TransportResult<()>;

    /// Naechstes Datagramm, wartet bis eines eintrifft
    async fn receive(&mut self) -> TransportResult<Vec<u8>>;

    async fn leave_group(&mut self) -> TransportResult<()>;
}

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Adresse und Socket-Optionen der Multicast-Gruppe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MulticastConfig {
    pub gruppe: Ipv4Addr,
    pub port: u16,
    /// Lokales Interface fuer den Beitritt (0.0.0.0 = Standard)
    pub interface: Ipv4Addr,
    pub ttl: u32,
    /// Eigene Pakete auf dem Host zurueckspiegeln
    pub loopback: bool,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            gruppe: Ipv4Addr::new(239, 255, 42, 99),
            port: 4446,
            interface: Ipv4Addr::UNSPECIFIED,
            ttl: 1,
            loopback: true,
        }
    }
}

impl MulticastConfig {
    pub fn ziel(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.gruppe, self.port))
    }
}

// ---------------------------------------------------------------------------
// UDP
// ---------------------------------------------------------------------------

pub struct UdpMulticastSender {
    socket: UdpSocket,
    ziel: SocketAddr,
}

impl UdpMulticastSender {
    pub async fn binden(config: &MulticastConfig) -> TransportResult<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(config.interface, 0)).await?;
        socket.set_multicast_ttl_v4(config.ttl)?;
        socket.set_multicast_loop_v4(config.loopback)?;
        tracing::info!(gruppe = %config.ziel(), ttl = config.ttl, "Multicast-Sender gebunden");
        Ok(Self {
            socket,
            ziel: config.ziel(),
        })
    }
}

#[async_trait]
impl MulticastSender for UdpMulticastSender {
    async fn send(&self, data: &[u8]) -> TransportResult<()> {
        if data.len() > MAX_DATAGRAM {
            return Err(TransportError::DatagrammZuGross {
                laenge: data.len(),
                max: MAX_DATAGRAM,
            });
        }
        self.socket.send_to(data, self.ziel).await?;
        tracing::trace!(bytes = data.len(), ziel = %self.ziel, "Multicast gesendet");
        Ok(())
    }
}

/// Empfaenger, der Socket entsteht erst beim Beitritt
pub struct UdpMulticastReceiver {
    config: MulticastConfig,
    socket: Option<UdpSocket>,
    puffer: Vec<u8>,
}

impl UdpMulticastReceiver {
    pub fn new(config: MulticastConfig) -> Self {
        Self {
            config,
            socket: None,
            puffer: vec![0u8; MAX_DATAGRAM],
        }
    }

    fn socket_oeffnen(&self) -> TransportResult<UdpSocket> {
        // Mehrere Empfaenger auf einem Host teilen sich den Port
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        let bind = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.config.port);
        socket.bind(&bind.into())?;
        socket.join_multicast_v4(&self.config.gruppe, &self.config.interface)?;
        socket.set_nonblocking(true)?;
        Ok(UdpSocket::from_std(socket.into())?)
    }
}

#[async_trait]
impl MulticastReceiver for UdpMulticastReceiver {
    async fn join_group(&mut self) -> TransportResult<()> {
        if self.socket.is_none() {
            self.socket = Some(self.socket_oeffnen()?);
            tracing::debug!(gruppe = %self.config.ziel(), "Multicast-Gruppe beigetreten");
        }
        Ok(())
    }

    async fn receive(&mut self) -> TransportResult<Vec<u8>> {
        let socket = self.socket.as_ref().ok_or(TransportError::NichtBeigetreten)?;
        let (n, von) = socket.recv_from(&mut self.puffer).await?;
        tracing::trace!(bytes = n, von = %von, "Multicast empfangen");
        Ok(self.puffer[..n].to_vec())
    }

    async fn leave_group(&mut self) -> TransportResult<()> {
        if let Some(socket) = self.socket.take() {
            socket.leave_multicast_v4(self.config.gruppe, self.config.interface)?;
            tracing::debug!(gruppe = %self.config.ziel(), "Multicast-Gruppe verlassen");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryMulticast
// ---------------------------------------------------------------------------

/// Prozessinterne Multicast-Gruppe
#[derive(Clone)]
pub struct MemoryMulticast {
    tx: broadcast::Sender<Bytes>,
}

impl MemoryMulticast {
    pub fn new(kapazitaet: usize) -> Self {
        let (tx, _) = broadcast::channel(kapazitaet);
        Self { tx }
    }

    pub fn sender(&self) -> MemorySender {
        MemorySender {
            tx: self.tx.clone(),
        }
    }

    pub fn receiver(&self) -> MemoryReceiver {
        MemoryReceiver {
            tx: self.tx.clone(),
            rx: None,
        }
    }
}

impl Default for MemoryMulticast {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[derive(Clone)]
pub struct MemorySender {
    tx: broadcast::Sender<Bytes>,
}

#[async_trait]
impl MulticastSender for MemorySender {
    async fn send(&self, data: &[u8]) -> TransportResult<()> {
        // Ohne Empfaenger geht das Paket verloren, wie bei UDP
        let _ = self.tx.send(Bytes::copy_from_slice(data));
        Ok(())
    }
}

pub struct MemoryReceiver {
    tx: broadcast::Sender<Bytes>,
    rx: Option<broadcast::Receiver<Bytes>>,
}

#[async_trait]
impl MulticastReceiver for MemoryReceiver {
    async fn join_group(&mut self) -> TransportResult<()> {
        if self.rx.is_none() {
            self.rx = Some(self.tx.subscribe());
        }
        Ok(())
    }

    async fn receive(&mut self) -> TransportResult<Vec<u8>> {
        let rx = self.rx.as_mut().ok_or(TransportError::NichtBeigetreten)?;
        loop {
            match rx.recv().await {
                Ok(daten) => return Ok(daten.to_vec()),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(verloren = n, "Multicast-Empfaenger zu langsam");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(TransportError::Geschlossen),
            }
        }
    }

    async fn leave_group(&mut self) -> TransportResult<()> {
        self.rx = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nur_nach_beitritt_empfangen() {
        let gruppe = MemoryMulticast::default();
        let sender = gruppe.sender();
        let mut empfaenger = gruppe.receiver();

        sender.send(b"vorher").await.unwrap();
        assert!(matches!(
            empfaenger.receive().await,
            Err(TransportError::NichtBeigetreten)
        ));

        empfaenger.join_group().await.unwrap();
        sender.send(b"nachher").await.unwrap();
        assert_eq!(empfaenger.receive().await.unwrap(), b"nachher");
    }

    #[tokio::test]
    async fn alle_empfaenger_erhalten_das_paket() {
        let gruppe = MemoryMulticast::default();
        let mut a = gruppe.receiver();
        let mut b = gruppe.receiver();
        a.join_group().await.unwrap();
        b.join_group().await.unwrap();

        gruppe.sender().send(&[1, 2, 3]).await.unwrap();
        assert_eq!(a.receive().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(b.receive().await.unwrap(), vec![1, 2, 3]);

        b.leave_group().await.unwrap();
        assert!(b.receive().await.is_err());
    }

    #[test]
    fn config_aus_toml() {
        let config: MulticastConfig = toml::from_str("gruppe = \"239.1.2.3\"\nport = 5000").unwrap();
        assert_eq!(config.ziel().to_string(), "239.1.2.3:5000");
        assert_eq!(config.ttl, 1);
    }

    #[tokio::test]
    async fn zu_grosses_datagramm() {
        let sender = UdpMulticastSender::binden(&MulticastConfig {
            interface: Ipv4Addr::LOCALHOST,
            ..Default::default()
        })
        .await
        .unwrap();
        let daten = vec![0u8; MAX_DATAGRAM + 1];
        assert!(matches!(
            sender.send(&daten).await,
            Err(TransportError::DatagrammZuGross { .. })
        ));
    }
}
