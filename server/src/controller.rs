//! GroupController: ein Sperrbereich pro Schluesselbaum
//!
//! Alle Aenderungen am Baum (Joins, Leaves, Timer-Runden) laufen unter einem
//! `tokio::sync::Mutex`. Die Pakete einer Runde werden noch unter der Sperre
//! gesendet, sie verlassen den Server also in Baum-Reihenfolge.
//!
//! Batch-Varianten erhalten einen Timer-Task, der pro Takt hoechstens eine
//! Runde ausfuehrt. Verpasste Takte werden uebersprungen.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use lkhcast_core::{AlgorithmVersion, EventSink, MemberId};
use lkhcast_crypto::{CipherSuite, Kek, SymmetricKey};
use lkhcast_keytree::{AlgorithmConfig, RekeyAlgorithm, TreeError};
use lkhcast_protocol::RekeyPacket;
use lkhcast_transport::MulticastSender;

use crate::error::ServerResult;

pub struct GroupController {
    algorithmus: Mutex<RekeyAlgorithm>,
    multicast: Arc<dyn MulticastSender>,
    version: AlgorithmVersion,
    suite: CipherSuite,
}

impl GroupController {
    pub fn new(
        config: AlgorithmConfig,
        multicast: Arc<dyn MulticastSender>,
        events: Arc<dyn EventSink>,
    ) -> ServerResult<Self> {
        let version = config.version;
        let suite = config.suite;
        Ok(Self {
            algorithmus: Mutex::new(RekeyAlgorithm::new(config, events)?),
            multicast,
            version,
            suite,
        })
    }

    pub fn version(&self) -> AlgorithmVersion {
        self.version
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    /// Vergibt Mitglieds-ID und Blatt-KEK, der Baum bleibt unveraendert
    pub async fn register_join(&self) -> ServerResult<(MemberId, Kek)> {
        Ok(self.algorithmus.lock().await.register_join()?)
    }

    /// Handshake abgeschlossen: Mitglied einfuegen und verteilen
    pub async fn member_joining(&self, member: MemberId, kek: Kek) -> ServerResult<()> {
        let mut alg = self.algorithmus.lock().await;
        let packets = alg.member_joining(member, kek)?;
        self.verteilen(&packets).await
    }

    /// `false` wenn das Mitglied unbekannt ist
    pub async fn member_leaving(&self, member: MemberId) -> ServerResult<bool> {
        let mut alg = self.algorithmus.lock().await;
        let packets = match alg.member_leaving(member) {
            Ok(p) => p,
            Err(TreeError::UnbekanntesMitglied(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        self.verteilen(&packets).await?;
        Ok(true)
    }

    /// Administrativer Ausschluss, rekeyt auch bei Batch-Varianten sofort
    pub async fn expel(&self, member: MemberId) -> ServerResult<()> {
        let mut alg = self.algorithmus.lock().await;
        let packets = alg.expel(member)?;
        self.verteilen(&packets).await
    }

    /// Eine Runde mit allen anstehenden Aenderungen, liefert die Paketanzahl
    pub async fn rekey(&self) -> ServerResult<usize> {
        let mut alg = self.algorithmus.lock().await;
        let packets = alg.rekey()?;
        self.verteilen(&packets).await?;
        Ok(packets.len())
    }

    /// Loest die Gruppe auf: alle Mitglieder verwerfen ihre Schluessel
    pub async fn dissolve(&self) -> ServerResult<()> {
        let alg = self.algorithmus.lock().await;
        info!(mitglieder = alg.tree().member_count(), "Gruppe wird aufgeloest");
        self.verteilen(&[alg.dissolve()]).await
    }

    pub async fn mitglieder(&self) -> Vec<MemberId> {
        self.algorithmus.lock().await.tree().members()
    }

    pub async fn root_key(&self) -> Option<SymmetricKey> {
        let alg = self.algorithmus.lock().await;
        if alg.tree().is_empty() {
            return None;
        }
        alg.tree().root_key().ok().map(|k| k.key.clone())
    }

    pub async fn current_sek(&self) -> Option<Kek> {
        self.algorithmus.lock().await.current_sek().cloned()
    }

    /// Lesender Zugriff auf den Algorithmus unter der Sperre
    pub async fn mit_algorithmus<T>(&self, f: impl FnOnce(&RekeyAlgorithm) -> T) -> T {
        f(&*self.algorithmus.lock().await)
    }

    /// Startet den Batch-Timer, nur fuer Batch-Varianten
    pub fn batch_timer_starten(
        self: &Arc<Self>,
        intervall: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Option<JoinHandle<()>> {
        if !self.version.is_batch() {
            return None;
        }
        let controller = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut takt = tokio::time::interval(intervall);
            takt.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(intervall_ms = intervall.as_millis() as u64, "Batch-Timer gestartet");
            loop {
                tokio::select! {
                    _ = takt.tick() => {
                        match controller.rekey().await {
                            Ok(0) => {}
                            Ok(pakete) => debug!(pakete, "Batch-Runde verteilt"),
                            Err(e) => warn!(fehler = %e, "Batch-Runde fehlgeschlagen"),
                        }
                    }
                    Ok(()) = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Batch-Timer gestoppt");
        }))
    }

    async fn verteilen(&self, packets: &[RekeyPacket]) -> ServerResult<()> {
        for packet in packets {
            let daten = packet.encode()?;
            if let Err(e) = self.multicast.send(&daten).await {
                error!(typ = %packet.packet_type, fehler = %e, "Multicast-Versand fehlgeschlagen");
                return Err(e.into());
            }
            debug!(
                typ = %packet.packet_type,
                ops = packet.ops.len(),
                eintraege = packet.entries.len(),
                bytes = daten.len(),
                "Rekey-Paket gesendet"
            );
        }
        Ok(())
    }
}
