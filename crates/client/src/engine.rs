//! Client-Engine: Join, Empfangs-Loop und Leave
//!
//! ```text
//! Bereit --join--> Beitritt --Handshake ok--> Lauschend --leave--> Verlassen
//!                     |                          |
//!                     +--Fehler--> Bereit        +--Ausschluss/Aufloesung--> Verlassen
//! ```
//!
//! Die Schluessel liegen hinter einem `parking_lot::Mutex`, den nur die
//! Empfangs-Loop schreibend haelt. Events werden nach dem Entsperren
//! gemeldet, ein langsamer Sink blockiert also nie einen Leser der Accessors.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lkhcast_core::{EventSink, GroupEvent, MemberId};
use lkhcast_crypto::{Kek, KeyKind, SymmetricKey};
use lkhcast_protocol::{HandshakeToken, JoinReply, LeaveRequest, RekeyPacket};
use lkhcast_transport::{
    HandshakeRole, MulticastReceiver, TcpUnicast, UdpMulticastReceiver, UnicastChannel,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::store::StoredKeys;

/// Lebenszyklus eines Mitglieds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientZustand {
    Bereit,
    Beitritt,
    Lauschend,
    Verlassen,
}

#[derive(Debug)]
struct EngineState {
    zustand: ClientZustand,
    member: Option<MemberId>,
    keys: Option<StoredKeys>,
}

impl EngineState {
    /// Verwirft die Schluessel, liefert die bisherige Mitglieds-ID
    fn beenden(&mut self) -> Option<MemberId> {
        self.keys = None;
        self.zustand = ClientZustand::Verlassen;
        self.member
    }
}

pub struct ClientEngine {
    config: ClientConfig,
    state: Arc<Mutex<EngineState>>,
    events: Arc<dyn EventSink>,
    empfang: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

impl ClientEngine {
    pub fn new(config: ClientConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(EngineState {
                zustand: ClientZustand::Bereit,
                member: None,
                keys: None,
            })),
            events,
            empfang: None,
            shutdown: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ClientZustand {
        self.state.lock().zustand
    }

    /// ID aus dem letzten erfolgreichen Join
    pub fn member_id(&self) -> Option<MemberId> {
        self.state.lock().member
    }

    pub fn current_sek(&self) -> Option<Kek> {
        self.state
            .lock()
            .keys
            .as_ref()
            .and_then(|k| k.current_sek().cloned())
    }

    pub fn root_key(&self) -> Option<SymmetricKey> {
        self.state
            .lock()
            .keys
            .as_ref()
            .and_then(|k| k.root_key().cloned())
    }

    pub fn leaf_id(&self) -> Option<u32> {
        self.state.lock().keys.as_ref().and_then(StoredKeys::leaf_id)
    }

    // -----------------------------------------------------------------------
    // Join
    // -----------------------------------------------------------------------

    /// Verbindet per TCP und tritt der konfigurierten UDP-Gruppe bei
    pub async fn join_tcp(&mut self) -> ClientResult<MemberId> {
        let mut unicast = TcpUnicast::verbinden(self.config.server)
            .await?
            .with_timeout(self.config.timeout());
        let multicast = UdpMulticastReceiver::new(self.config.multicast.clone());
        self.join(&mut unicast, multicast).await
    }

    /// Join-Handshake ueber `unicast`, danach Empfang ueber `multicast`
    ///
    /// Schlaegt der Handshake fehl, bleibt kein Mitgliedszustand zurueck.
    pub async fn join<U, R>(&mut self, unicast: &mut U, mut multicast: R) -> ClientResult<MemberId>
    where
        U: UnicastChannel + ?Sized,
        R: MulticastReceiver + 'static,
    {
        {
            let mut st = self.state.lock();
            match st.zustand {
                ClientZustand::Bereit | ClientZustand::Verlassen => {
                    st.zustand = ClientZustand::Beitritt;
                }
                _ => return Err(ClientError::BereitsVerbunden),
            }
        }

        let keys = match self.beitreten(unicast, &mut multicast).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(fehler = %e, "Join fehlgeschlagen");
                if let Err(e) = multicast.leave_group().await {
                    debug!(fehler = %e, "Multicast-Gruppe nicht verlassen");
                }
                let mut st = self.state.lock();
                st.zustand = ClientZustand::Bereit;
                st.member = None;
                st.keys = None;
                return Err(e);
            }
        };

        let member = keys.member();
        info!(
            member_id = %member,
            version = %keys.version(),
            suite = ?keys.suite(),
            "Gruppe beigetreten"
        );
        {
            let mut st = self.state.lock();
            st.zustand = ClientZustand::Lauschend;
            st.member = Some(member);
            st.keys = Some(keys);
        }

        let (tx, rx) = watch::channel(false);
        self.shutdown = Some(tx);
        self.empfang = Some(tokio::spawn(empfangs_loop(
            multicast,
            Arc::clone(&self.state),
            Arc::clone(&self.events),
            rx,
        )));
        self.events
            .senden(GroupEvent::DummyZustand { member_id: member });
        Ok(member)
    }

    async fn beitreten<U, R>(&self, unicast: &mut U, multicast: &mut R) -> ClientResult<StoredKeys>
    where
        U: UnicastChannel + ?Sized,
        R: MulticastReceiver,
    {
        unicast.write(HandshakeToken::Joining.as_bytes()).await?;
        let session = unicast
            .gen_dh_session_key(HandshakeRole::Client, self.config.suite.unwrap_or_default())
            .await
            .map_err(|e| ClientError::Handshake(format!("DH-Austausch: {}", e)))?;

        let antwort = unicast.read().await?;
        let reply =
            JoinReply::decode(&antwort).map_err(|e| ClientError::UngueltigeAntwort(e.to_string()))?;

        // Die Suite des Servers steht im Tag des Blatt-KEKs
        let (_, tag) =
            Kek::peek(&reply.kek).map_err(|e| ClientError::UngueltigeAntwort(e.to_string()))?;
        if let Some(erwartet) = self.config.suite {
            if erwartet != tag.suite {
                return Err(ClientError::Handshake(format!(
                    "Server nutzt {:?} statt {:?}",
                    tag.suite, erwartet
                )));
            }
        }
        let session = SymmetricKey::new(tag.suite, session.as_bytes().to_vec())?;
        let kek = Kek::from_bytes(&session, &reply.kek)
            .map_err(|e| ClientError::Handshake(format!("Blatt-KEK: {}", e)))?;
        if kek.kind != KeyKind::Kek {
            return Err(ClientError::UngueltigeAntwort(format!(
                "Schluesselart {:?} statt KEK",
                kek.kind
            )));
        }
        debug!(member_id = %reply.member, kek_id = kek.id, "Blatt-KEK erhalten");

        // Vor "end" beitreten, sonst geht das Paket mit dem eigenen Insert verloren
        multicast.join_group().await?;
        unicast.write(HandshakeToken::End.as_bytes()).await?;
        if let Err(e) = unicast.close().await {
            debug!(fehler = %e, "Unicast nicht sauber geschlossen");
        }
        Ok(StoredKeys::new(reply.member, reply.version, kek))
    }

    // -----------------------------------------------------------------------
    // Leave
    // -----------------------------------------------------------------------

    pub async fn leave_tcp(&mut self) -> ClientResult<()> {
        let Some(member) = self.abmeldbar()? else {
            self.empfang_beenden().await;
            return Ok(());
        };
        self.empfang_beenden().await;
        let ergebnis = match TcpUnicast::verbinden(self.config.server).await {
            Ok(unicast) => abmelden(&mut unicast.with_timeout(self.config.timeout()), member).await,
            Err(e) => Err(e.into()),
        };
        self.abbauen(member);
        ergebnis
    }

    /// Meldet das Mitglied ab
    ///
    /// Der lokale Zustand wird auch dann abgebaut, wenn der Handshake
    /// scheitert. Ein zweiter Aufruf ist ein No-op.
    pub async fn leave<U>(&mut self, unicast: &mut U) -> ClientResult<()>
    where
        U: UnicastChannel + ?Sized,
    {
        let Some(member) = self.abmeldbar()? else {
            self.empfang_beenden().await;
            return Ok(());
        };
        // Zuerst die Loop stoppen, das eigene Remove loest dann kein
        // zweites OFF_STATE aus
        self.empfang_beenden().await;
        let ergebnis = abmelden(unicast, member).await;
        self.abbauen(member);
        ergebnis
    }

    /// `None` wenn das Mitglied die Gruppe schon verlassen hat
    fn abmeldbar(&self) -> ClientResult<Option<MemberId>> {
        let st = self.state.lock();
        match st.zustand {
            ClientZustand::Bereit | ClientZustand::Beitritt => Err(ClientError::NichtVerbunden),
            ClientZustand::Verlassen => Ok(None),
            ClientZustand::Lauschend => st.member.map(Some).ok_or(ClientError::NichtVerbunden),
        }
    }

    fn abbauen(&self, member: MemberId) {
        let member_id = self.state.lock().beenden();
        info!(member_id = %member, "Gruppe verlassen");
        self.events.senden(GroupEvent::AusZustand { member_id });
    }

    async fn empfang_beenden(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.empfang.take() {
            if let Err(e) = task.await {
                warn!(fehler = %e, "Empfangs-Task abgebrochen");
            }
        }
    }
}

impl Drop for ClientEngine {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
    }
}

async fn abmelden<U>(unicast: &mut U, member: MemberId) -> ClientResult<()>
where
    U: UnicastChannel + ?Sized,
{
    unicast.write(HandshakeToken::Leaving.as_bytes()).await?;
    HandshakeToken::IdAnfrage
        .erwarten(&unicast.read().await?)
        .map_err(|e| ClientError::Handshake(e.to_string()))?;
    unicast.write(&LeaveRequest { member }.encode()).await?;

    let antwort = unicast.read().await?;
    match HandshakeToken::from_bytes(&antwort) {
        Some(HandshakeToken::Left) => {}
        Some(HandshakeToken::Unknown) => {
            warn!(member_id = %member, "Server kennt das Mitglied nicht");
        }
        _ => {
            return Err(ClientError::UngueltigeAntwort(format!(
                "Leave-Bestaetigung mit {} Bytes",
                antwort.len()
            )))
        }
    }
    if let Err(e) = unicast.close().await {
        debug!(fehler = %e, "Unicast nicht sauber geschlossen");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Empfangs-Loop
// ---------------------------------------------------------------------------

async fn empfangs_loop<R: MulticastReceiver>(
    mut multicast: R,
    state: Arc<Mutex<EngineState>>,
    events: Arc<dyn EventSink>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let empfangen = tokio::select! {
            _ = shutdown.changed() => break,
            r = multicast.receive() => r,
        };
        let daten = match empfangen {
            Ok(d) => d,
            Err(e) => {
                warn!(fehler = %e, "Multicast-Empfang fehlgeschlagen, Schluessel verworfen");
                let member_id = state.lock().beenden();
                events.senden(GroupEvent::AusZustand { member_id });
                break;
            }
        };
        let packet = match RekeyPacket::decode(&daten) {
            Ok(p) => p,
            Err(e) => {
                warn!(fehler = %e, bytes = daten.len(), "Rekey-Paket nicht dekodierbar");
                continue;
            }
        };

        let (ergebnis, beendet) = {
            let mut st = state.lock();
            let Some(keys) = st.keys.as_mut() else {
                break;
            };
            let ergebnis = keys.verarbeiten(&packet);
            let beendet = !keys.is_active();
            if beendet {
                st.beenden();
            }
            (ergebnis, beendet)
        };

        match ergebnis {
            Ok(liste) => {
                for event in liste {
                    events.senden(event);
                }
            }
            Err(e) => {
                warn!(typ = %packet.packet_type, fehler = %e, "Rekey-Paket verworfen");
            }
        }
        if beendet {
            debug!("Empfangs-Loop beendet, Mitglied nicht mehr aktiv");
            break;
        }
    }

    if let Err(e) = multicast.leave_group().await {
        debug!(fehler = %e, "Multicast-Gruppe nicht verlassen");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ChannelSink;
    use lkhcast_core::{AlgorithmVersion, NullSink};
    use lkhcast_keytree::{AlgorithmConfig, RekeyAlgorithm};
    use lkhcast_transport::{FramedUnicast, MemoryMulticast, MulticastSender};
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use tokio::sync::mpsc;

    fn kanal() -> (FramedUnicast<DuplexStream>, FramedUnicast<DuplexStream>) {
        let (a, b) = tokio::io::duplex(8192);
        (FramedUnicast::new(a), FramedUnicast::new(b))
    }

    /// Server-Seite des Join-Handshakes mit fester Antwort
    async fn join_gegenseite(
        mut server: FramedUnicast<DuplexStream>,
        member: MemberId,
        kek: Kek,
    ) -> FramedUnicast<DuplexStream> {
        HandshakeToken::Joining
            .erwarten(&server.read().await.unwrap())
            .unwrap();
        let session = server
            .gen_dh_session_key(HandshakeRole::Server, kek.suite())
            .await
            .unwrap();
        let reply = JoinReply {
            version: AlgorithmVersion::Simple,
            member,
            kek: kek.to_bytes(&session).unwrap(),
        };
        server.write(&reply.encode()).await.unwrap();
        HandshakeToken::End
            .erwarten(&server.read().await.unwrap())
            .unwrap();
        server
    }

    async fn naechstes(rx: &mut mpsc::UnboundedReceiver<GroupEvent>) -> GroupEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn join_empfaengt_schluessel_und_sek() {
        let mut alg = RekeyAlgorithm::new(AlgorithmConfig::default(), Arc::new(NullSink)).unwrap();
        let (member, kek) = alg.register_join().unwrap();
        let gruppe = MemoryMulticast::default();
        let (sink, mut rx) = ChannelSink::new();
        let mut engine = ClientEngine::new(ClientConfig::default(), Arc::new(sink));

        let (server, mut client) = kanal();
        let gegenseite = tokio::spawn(join_gegenseite(server, member, kek.clone()));
        let id = engine.join(&mut client, gruppe.receiver()).await.unwrap();
        gegenseite.await.unwrap();
        assert_eq!(id, member);
        assert_eq!(engine.state(), ClientZustand::Lauschend);
        assert_eq!(naechstes(&mut rx).await.name(), "DUMMY_STATE");

        let sender = gruppe.sender();
        for packet in alg.member_joining(member, kek).unwrap() {
            sender.send(&packet.encode().unwrap()).await.unwrap();
        }
        assert_eq!(naechstes(&mut rx).await.name(), "TREE_UPDATED");
        assert_eq!(naechstes(&mut rx).await.name(), "NEW_SEK");
        assert_eq!(engine.root_key(), Some(alg.tree().root_key().unwrap().key.clone()));
        assert_eq!(engine.current_sek().as_ref(), alg.current_sek());
    }

    #[tokio::test]
    async fn leave_baut_zustand_ab() {
        let kek = lkhcast_crypto::KeyGenerator::default().gen_kek(1).unwrap();
        let gruppe = MemoryMulticast::default();
        let (sink, mut rx) = ChannelSink::new();
        let mut engine = ClientEngine::new(ClientConfig::default(), Arc::new(sink));

        let (server, mut client) = kanal();
        let gegenseite = tokio::spawn(join_gegenseite(server, MemberId(100), kek));
        engine.join(&mut client, gruppe.receiver()).await.unwrap();
        gegenseite.await.unwrap();
        naechstes(&mut rx).await;

        let (mut server, mut client) = kanal();
        let gegenseite = tokio::spawn(async move {
            HandshakeToken::Leaving
                .erwarten(&server.read().await.unwrap())
                .unwrap();
            server.write(HandshakeToken::IdAnfrage.as_bytes()).await.unwrap();
            let anfrage = LeaveRequest::decode(&server.read().await.unwrap()).unwrap();
            server.write(HandshakeToken::Left.as_bytes()).await.unwrap();
            anfrage.member
        });
        engine.leave(&mut client).await.unwrap();
        assert_eq!(gegenseite.await.unwrap(), MemberId(100));
        assert_eq!(engine.state(), ClientZustand::Verlassen);
        assert!(engine.root_key().is_none());
        assert_eq!(
            naechstes(&mut rx).await,
            GroupEvent::AusZustand {
                member_id: Some(MemberId(100))
            }
        );

        // Zweiter Aufruf ohne Gegenseite
        let (_server, mut client) = kanal();
        engine.leave(&mut client).await.unwrap();
    }

    #[tokio::test]
    async fn kaputte_antwort_hinterlaesst_keinen_zustand() {
        let mut engine = ClientEngine::new(ClientConfig::default(), Arc::new(NullSink));
        let (mut server, mut client) = kanal();
        let gegenseite = tokio::spawn(async move {
            server.read().await.unwrap();
            server
                .gen_dh_session_key(HandshakeRole::Server, Default::default())
                .await
                .unwrap();
            server.write(&[0, 0]).await.unwrap();
        });
        let ergebnis = engine
            .join(&mut client, MemoryMulticast::default().receiver())
            .await;
        gegenseite.await.unwrap();
        assert!(matches!(ergebnis, Err(ClientError::UngueltigeAntwort(_))));
        assert_eq!(engine.state(), ClientZustand::Bereit);
        assert!(engine.member_id().is_none());
        assert!(matches!(
            engine.leave(&mut client).await,
            Err(ClientError::NichtVerbunden)
        ));
    }
}
