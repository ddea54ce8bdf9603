//! Unicast-Kanal fuer Join- und Leave-Handshakes
//!
//! Jede Nachricht ist ein Frame (`u32 BE Laenge || Payload`). Der
//! Session-Schluessel fuer die Uebergabe des Blatt-KEKs entsteht per
//! X25519 auf demselben Kanal, siehe [`UnicastChannel::gen_dh_session_key`].

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use lkhcast_crypto::{CipherSuite, KeyExchange, SymmetricKey};
use lkhcast_protocol::FrameCodec;

use crate::error::{TransportError, TransportResult};

/// Seite des Diffie-Hellman-Austauschs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRole {
    /// Sendet das erste Hello
    Server,
    Client,
}

/// Bidirektionaler, nachrichtenorientierter Kanal zwischen Server und Client
#[async_trait]
pub trait UnicastChannel: Send {
    async fn write(&mut self, data: &[u8]) -> TransportResult<()>;

    /// Naechste vollstaendige Nachricht, `Geschlossen` am Ende des Streams
    async fn read(&mut self) -> TransportResult<Vec<u8>>;

    async fn close(&mut self) -> TransportResult<()>;

    /// X25519-Austausch, beide Seiten erhalten denselben Schluessel
    async fn gen_dh_session_key(
        &mut self,
        role: HandshakeRole,
        suite: CipherSuite,
    ) -> TransportResult<SymmetricKey> {
        let mut kx = KeyExchange::new();
        let eigenes = kx.random();
        let key = match role {
            HandshakeRole::Server => {
                self.write(&kx.hello()).await?;
                let (peer, client_random) = KeyExchange::parse_hello(&self.read().await?)?;
                kx.session_key(&peer, &client_random, &eigenes, suite)?
            }
            HandshakeRole::Client => {
                let (peer, server_random) = KeyExchange::parse_hello(&self.read().await?)?;
                self.write(&kx.hello()).await?;
                kx.session_key(&peer, &eigenes, &server_random, suite)?
            }
        };
        tracing::trace!(rolle = ?role, "Session-Schluessel abgeleitet");
        Ok(key)
    }
}

// ---------------------------------------------------------------------------
// FramedUnicast
// ---------------------------------------------------------------------------

/// Unicast ueber einen beliebigen Byte-Stream mit [`FrameCodec`]
pub struct FramedUnicast<S> {
    framed: Framed<S, FrameCodec>,
    timeout: Option<Duration>,
}

/// Unicast ueber TCP
pub type TcpUnicast = FramedUnicast<TcpStream>;

impl<S> FramedUnicast<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            framed: Framed::new(stream, FrameCodec::new()),
            timeout: None,
        }
    }

    /// Begrenzt die Wartezeit jedes `read`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl TcpUnicast {
    /// Baut eine TCP-Verbindung zum Server auf
    pub async fn verbinden(addr: SocketAddr) -> TransportResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        tracing::debug!(server = %addr, "Unicast-Verbindung aufgebaut");
        Ok(Self::new(stream))
    }
}

#[async_trait]
impl<S> UnicastChannel for FramedUnicast<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, data: &[u8]) -> TransportResult<()> {
        self.framed.send(Bytes::copy_from_slice(data)).await?;
        Ok(())
    }

    async fn read(&mut self) -> TransportResult<Vec<u8>> {
        let naechster = match self.timeout {
            Some(dauer) => tokio::time::timeout(dauer, self.framed.next())
                .await
                .map_err(|_| TransportError::Zeitueberschreitung(dauer.as_millis() as u64))?,
            None => self.framed.next().await,
        };
        match naechster {
            Some(Ok(frame)) => Ok(frame.to_vec()),
            Some(Err(e)) => Err(e.into()),
            None => Err(TransportError::Geschlossen),
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        SinkExt::<Bytes>::close(&mut self.framed).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
