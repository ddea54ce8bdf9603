//! Ende-zu-Ende: echter Server ueber TCP-Loopback, Multicast prozessintern

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use lkhcast_client::{ClientConfig, ClientEngine, ClientZustand};
use lkhcast_core::{AlgorithmVersion, MemberId, NullSink};
use lkhcast_protocol::{HandshakeToken, LeaveRequest};
use lkhcast_server::{GroupController, LkhServer, ServerConfig, ServerResult};
use lkhcast_transport::{MemoryMulticast, TcpUnicast, UnicastChannel};

struct Lauf {
    addr: SocketAddr,
    gruppe: MemoryMulticast,
    controller: Arc<GroupController>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<ServerResult<()>>,
}

async fn server_starten(version: AlgorithmVersion) -> Lauf {
    let mut config = ServerConfig::default();
    config.gruppe.algorithmus = version;
    config.gruppe.batch_intervall_ms = 20;
    config.netzwerk.bind_adresse = "127.0.0.1".into();
    config.netzwerk.unicast_port = 0;

    let gruppe = MemoryMulticast::default();
    let server = LkhServer::binden(&config, Arc::new(gruppe.sender()), Arc::new(NullSink))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let controller = server.controller();
    let (shutdown, rx) = watch::channel(false);
    let task = tokio::spawn(server.starten(rx));
    Lauf {
        addr,
        gruppe,
        controller,
        shutdown,
        task,
    }
}

fn engine(lauf: &Lauf) -> ClientEngine {
    let config = ClientConfig {
        server: lauf.addr,
        ..Default::default()
    };
    ClientEngine::new(config, Arc::new(NullSink))
}

async fn beitreten(lauf: &Lauf, engine: &mut ClientEngine) -> MemberId {
    let mut unicast = TcpUnicast::verbinden(lauf.addr).await.unwrap();
    engine.join(&mut unicast, lauf.gruppe.receiver()).await.unwrap()
}

async fn verlassen(lauf: &Lauf, engine: &mut ClientEngine) {
    let mut unicast = TcpUnicast::verbinden(lauf.addr).await.unwrap();
    engine.leave(&mut unicast).await.unwrap();
}

/// Wartet bis `bedingung` gilt, hoechstens zwei Sekunden
async fn warten_bis<F, Fut>(mut bedingung: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let ende = tokio::time::Instant::now() + Duration::from_secs(2);
    while !bedingung().await {
        assert!(tokio::time::Instant::now() < ende, "Zeitueberschreitung");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn alle_synchron(lauf: &Lauf, engines: &[ClientEngine]) {
    warten_bis(|| async move {
        let wurzel = lauf.controller.root_key().await;
        let sek = lauf.controller.current_sek().await;
        wurzel.is_some()
            && engines
                .iter()
                .all(|e| e.root_key() == wurzel && e.current_sek() == sek)
    })
    .await;
}

#[tokio::test]
async fn simple_szenario_zwei_mitglieder() {
    let lauf = server_starten(AlgorithmVersion::Simple).await;

    let mut a = engine(&lauf);
    assert_eq!(beitreten(&lauf, &mut a).await, MemberId(100));
    let mut b = engine(&lauf);
    assert_eq!(beitreten(&lauf, &mut b).await, MemberId(101));

    let mut engines = vec![a, b];
    alle_synchron(&lauf, &engines).await;
    assert_eq!(engines[0].root_key(), engines[1].root_key());

    let mut a = engines.remove(0);
    let alt_wurzel = a.root_key().unwrap();
    let alt_sek = a.current_sek().unwrap();
    verlassen(&lauf, &mut a).await;
    assert_eq!(a.state(), ClientZustand::Verlassen);
    assert!(a.root_key().is_none());

    alle_synchron(&lauf, &engines).await;
    assert_eq!(lauf.controller.mitglieder().await, vec![MemberId(101)]);
    let b = &engines[0];
    assert_ne!(b.root_key().unwrap(), alt_wurzel);
    assert_ne!(b.current_sek().unwrap().key, alt_sek.key);

    lauf.shutdown.send(true).unwrap();
    lauf.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn gleichzeitige_joins() {
    const N: usize = 12;
    let lauf = Arc::new(server_starten(AlgorithmVersion::Simple).await);

    let mut tasks = Vec::new();
    for _ in 0..N {
        let lauf = Arc::clone(&lauf);
        tasks.push(tokio::spawn(async move {
            let mut e = engine(&lauf);
            beitreten(&lauf, &mut e).await;
            e
        }));
    }
    let mut engines = Vec::new();
    for t in tasks {
        engines.push(t.await.unwrap());
    }

    let mut ids: Vec<MemberId> = engines.iter().filter_map(ClientEngine::member_id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), N);

    alle_synchron(&lauf, &engines).await;
    let (blaetter, skew) = lauf
        .controller
        .mit_algorithmus(|alg| (alg.tree().leaves().len(), alg.tree().balance_skew()))
        .await;
    assert_eq!(blaetter, N);
    assert!(skew <= 1);
}

#[tokio::test]
async fn alle_varianten_ueber_die_leitung() {
    for version in [
        AlgorithmVersion::Batch,
        AlgorithmVersion::BalancedBatch,
        AlgorithmVersion::Oft,
        AlgorithmVersion::SingleMessage,
        AlgorithmVersion::BatchSingleMessage,
    ] {
        let lauf = server_starten(version).await;
        let mut engines = Vec::new();
        for _ in 0..5 {
            let mut e = engine(&lauf);
            beitreten(&lauf, &mut e).await;
            engines.push(e);
        }
        alle_synchron(&lauf, &engines).await;

        let mut weg = engines.remove(1);
        verlassen(&lauf, &mut weg).await;
        let l = &lauf;
        warten_bis(|| async move { l.controller.mitglieder().await.len() == 4 }).await;
        alle_synchron(&lauf, &engines).await;

        lauf.shutdown.send(true).unwrap();
        lauf.task.await.unwrap().unwrap();
        let engines = &engines;
        warten_bis(|| async move {
            engines
                .iter()
                .all(|e| e.state() == ClientZustand::Verlassen)
        })
        .await;
    }
}

#[tokio::test]
async fn leave_fuer_unbekannte_id() {
    let lauf = server_starten(AlgorithmVersion::Simple).await;
    let mut unicast = TcpUnicast::verbinden(lauf.addr).await.unwrap();
    unicast
        .write(HandshakeToken::Leaving.as_bytes())
        .await
        .unwrap();
    HandshakeToken::IdAnfrage
        .erwarten(&unicast.read().await.unwrap())
        .unwrap();
    unicast
        .write(&LeaveRequest { member: MemberId(4711) }.encode())
        .await
        .unwrap();
    HandshakeToken::Unknown
        .erwarten(&unicast.read().await.unwrap())
        .unwrap();
}

#[tokio::test]
async fn ausschluss_beendet_mitglied() {
    let lauf = server_starten(AlgorithmVersion::Batch).await;
    let mut a = engine(&lauf);
    let id_a = beitreten(&lauf, &mut a).await;
    let mut b = engine(&lauf);
    beitreten(&lauf, &mut b).await;
    let mut engines = vec![a, b];
    alle_synchron(&lauf, &engines).await;

    lauf.controller.expel(id_a).await.unwrap();
    let a = &engines.remove(0);
    warten_bis(|| async move { a.state() == ClientZustand::Verlassen }).await;
    alle_synchron(&lauf, &engines).await;
}
