//! Integration-Tests: Rekey-Runden aller Varianten unter Mitgliederwechsel

use std::collections::HashMap;
use std::sync::Arc;

use lkhcast_core::{AlgorithmVersion, MemberId, NullSink};
use lkhcast_crypto::{blind, xor};
use lkhcast_keytree::{AlgorithmConfig, KeyTree, RekeyAlgorithm};
use lkhcast_protocol::{RekeyPacket, TreeOp};

const ALLE: [AlgorithmVersion; 6] = [
    AlgorithmVersion::Simple,
    AlgorithmVersion::Batch,
    AlgorithmVersion::BalancedBatch,
    AlgorithmVersion::Oft,
    AlgorithmVersion::SingleMessage,
    AlgorithmVersion::BatchSingleMessage,
];

fn algorithmus(version: AlgorithmVersion) -> RekeyAlgorithm {
    let config = AlgorithmConfig {
        version,
        ..Default::default()
    };
    RekeyAlgorithm::new(config, Arc::new(NullSink)).unwrap()
}

/// Blatt-IDs wie ein Client sie aus den Operationen nachfuehrt
#[derive(Default)]
struct Nachfuehrung {
    blaetter: HashMap<MemberId, u32>,
}

impl Nachfuehrung {
    fn anwenden(&mut self, packets: &[RekeyPacket]) {
        for op in packets.iter().flat_map(|p| p.ops.iter()) {
            match op {
                TreeOp::Rebuild { assignments } => {
                    self.blaetter = assignments.iter().copied().collect();
                }
                TreeOp::Insert { at, member } => {
                    self.umbenennen(op);
                    self.blaetter
                        .insert(*member, TreeOp::placed_leaf(*at).unwrap());
                }
                TreeOp::Remove { .. } => self.umbenennen(op),
            }
        }
    }

    fn umbenennen(&mut self, op: &TreeOp) {
        self.blaetter = self
            .blaetter
            .iter()
            .filter_map(|(m, id)| op.rename(*id).map(|neu| (*m, neu)))
            .collect();
    }

    fn pruefen(&self, tree: &KeyTree) {
        assert_eq!(self.blaetter.len(), tree.member_count());
        for (m, id) in &self.blaetter {
            let h = tree.find_by_member(*m).unwrap();
            assert_eq!(tree.node(h).unwrap().id(), *id, "Mitglied {}", m);
        }
    }
}

fn runde(alg: &mut RekeyAlgorithm, spur: &mut Nachfuehrung, packets: Vec<RekeyPacket>) {
    spur.anwenden(&packets);
    let rest = alg.rekey().unwrap();
    spur.anwenden(&rest);
    alg.tree().validate().unwrap();
    spur.pruefen(alg.tree());
}

fn wechsel(version: AlgorithmVersion) -> (RekeyAlgorithm, Nachfuehrung) {
    let mut alg = algorithmus(version);
    let mut spur = Nachfuehrung::default();
    let mut aktiv: Vec<MemberId> = Vec::new();

    for schritt in 0..40u32 {
        let packets = if schritt % 3 == 2 && !aktiv.is_empty() {
            let m = aktiv.remove((schritt as usize * 7) % aktiv.len());
            alg.member_leaving(m).unwrap()
        } else {
            let (m, kek) = alg.register_join().unwrap();
            aktiv.push(m);
            alg.member_joining(m, kek).unwrap()
        };
        runde(&mut alg, &mut spur, packets);
    }
    (alg, spur)
}

#[test]
fn operationen_fuehren_blatt_ids_nach() {
    for version in ALLE {
        let (alg, _) = wechsel(version);
        assert!(alg.tree().member_count() > 0, "{}", version);
    }
}

#[test]
fn ausgeglichen_nach_jeder_runde() {
    let mut alg = algorithmus(AlgorithmVersion::BalancedBatch);
    let mut spur = Nachfuehrung::default();
    let mut ids = Vec::new();
    for _ in 0..16 {
        let (m, kek) = alg.register_join().unwrap();
        ids.push(m);
        alg.member_joining(m, kek).unwrap();
    }
    runde(&mut alg, &mut spur, Vec::new());

    // Eine Haelfte des Baums leeren
    for m in ids.iter().step_by(2).take(6) {
        alg.member_leaving(*m).unwrap();
        runde(&mut alg, &mut spur, Vec::new());
        assert!(alg.tree().balance_skew() <= 1);
    }
}

#[test]
fn nur_joins_bleiben_ausgeglichen() {
    for version in [AlgorithmVersion::Simple, AlgorithmVersion::Oft] {
        let mut alg = algorithmus(version);
        for _ in 0..23 {
            let (m, kek) = alg.register_join().unwrap();
            alg.member_joining(m, kek).unwrap();
            assert!(alg.tree().balance_skew() <= 1);
        }
        assert_eq!(alg.tree().depth(), 6);
    }
}

#[test]
fn oft_invariante_nach_wechsel() {
    let (alg, _) = wechsel(AlgorithmVersion::Oft);
    let tree = alg.tree();
    for h in tree.internal_nodes() {
        let (l, r) = tree.node(h).unwrap().children().unwrap();
        let erwartet = xor(
            &blind(&tree.node(l).unwrap().kek().key),
            &blind(&tree.node(r).unwrap().kek().key),
        )
        .unwrap();
        assert_eq!(tree.node(h).unwrap().kek().key, erwartet);
    }
}

#[test]
fn sek_generation_steigt() {
    let mut alg = algorithmus(AlgorithmVersion::SingleMessage);
    let mut letzte = 0;
    for _ in 0..5 {
        let (m, kek) = alg.register_join().unwrap();
        alg.member_joining(m, kek).unwrap();
        let sek = alg.current_sek().unwrap();
        assert!(sek.id > letzte);
        letzte = sek.id;
    }
}

#[test]
fn pakete_ueberstehen_die_leitung() {
    for version in ALLE {
        let mut alg = algorithmus(version);
        let mut alle = Vec::new();
        for _ in 0..5 {
            let (m, kek) = alg.register_join().unwrap();
            alle.extend(alg.member_joining(m, kek).unwrap());
        }
        alle.extend(alg.rekey().unwrap());
        let m = alg.tree().members()[1];
        alle.extend(alg.expel(m).unwrap());
        for p in alle {
            let bytes = p.encode().unwrap();
            assert_eq!(RekeyPacket::decode(&bytes).unwrap(), p);
        }
    }
}
