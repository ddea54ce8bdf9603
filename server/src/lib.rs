//! lkhcast-server – Bibliotheks-Root
//!
//! [`LkhServer`] nimmt Unicast-Verbindungen an und startet fuer jede einen
//! [`ComplyClient`]-Task. Der [`GroupController`] serialisiert alle
//! Baum-Aenderungen und verteilt die Rekey-Pakete per Multicast.

pub mod config;
pub mod controller;
pub mod ereignisse;
pub mod error;
pub mod handler;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;

use lkhcast_core::EventSink;
use lkhcast_transport::{FramedUnicast, MulticastSender};

pub use config::ServerConfig;
pub use controller::GroupController;
pub use ereignisse::LogSink;
pub use error::{ServerError, ServerResult};
pub use handler::ComplyClient;

/// Gruppen-Server: Acceptor plus Controller
pub struct LkhServer {
    listener: TcpListener,
    controller: Arc<GroupController>,
    handshake_timeout: Duration,
    batch_intervall: Duration,
}

impl LkhServer {
    /// Bindet den Unicast-Listener, der Multicast-Sender kommt vom Aufrufer
    pub async fn binden(
        config: &ServerConfig,
        multicast: Arc<dyn MulticastSender>,
        events: Arc<dyn EventSink>,
    ) -> ServerResult<Self> {
        let controller = GroupController::new(config.gruppe.algorithm_config(), multicast, events)?;
        let listener = TcpListener::bind(config.unicast_bind_adresse()).await?;
        tracing::info!(
            adresse = %listener.local_addr()?,
            algorithmus = %controller.version(),
            suite = ?controller.suite(),
            "Gruppen-Server gebunden"
        );
        Ok(Self {
            listener,
            controller: Arc::new(controller),
            handshake_timeout: config.handshake_timeout(),
            batch_intervall: config.gruppe.batch_intervall(),
        })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn controller(&self) -> Arc<GroupController> {
        Arc::clone(&self.controller)
    }

    /// Akzeptiert Verbindungen bis `shutdown_rx` ein `true` liefert
    ///
    /// Beim Beenden wird die Gruppe per `MULTICAST_LEAVING` aufgeloest.
    pub async fn starten(self, mut shutdown_rx: watch::Receiver<bool>) -> ServerResult<()> {
        let timer = self
            .controller
            .batch_timer_starten(self.batch_intervall, shutdown_rx.clone());

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
                            }
                            tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");
                            let unicast = FramedUnicast::new(stream).with_timeout(self.handshake_timeout);
                            let handler = ComplyClient::new(
                                unicast,
                                Arc::clone(&self.controller),
                                peer_addr.to_string(),
                            );
                            tokio::spawn(async move {
                                if let Err(e) = handler.bearbeiten().await {
                                    tracing::warn!(peer = %peer_addr, fehler = %e, "Anfrage fehlgeschlagen");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        if let Some(timer) = timer {
            if let Err(e) = timer.await {
                tracing::warn!(fehler = %e, "Batch-Timer abgebrochen");
            }
        }
        self.controller.dissolve().await?;
        tracing::info!("Gruppen-Server gestoppt");
        Ok(())
    }
}
