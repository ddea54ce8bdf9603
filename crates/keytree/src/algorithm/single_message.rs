//! Single-Message-LKH (sofort und Batch)
//!
//! Ein Zufallswert `R` rotiert alle verbliebenen Schluessel in einer Runde:
//! `k' = k XOR F(v) XOR R` mit `F(v) = node_mask(seed, id(v), k_v)`.
//! `R` wird unter den Schluesseln der Ueberdeckungsknoten verteilt, das sind
//! die maximalen alten Knoten, die kein entferntes Mitglied kannte.
//! Neue Knoten folgen im ADD-Paket nach LKH-Art unter ihren Kind-Schluesseln.

use std::collections::HashSet;

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::trace;

use lkhcast_core::AlgorithmVersion;
use lkhcast_crypto::{node_mask, xor, Kek, KeyKind, SymmetricKey};
use lkhcast_protocol::{PacketType, RekeyPacket};

use super::{deepest_first, entry_for, AppliedChanges, RekeyStrategy};
use crate::error::{TreeError, TreeResult};
use crate::node::NodeHandle;
use crate::tree::KeyTree;

/// Laenge des Gruppen-Seeds
pub const SEED_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct SingleMessageStrategy {
    version: AlgorithmVersion,
    seed: [u8; SEED_LEN],
}

impl SingleMessageStrategy {
    /// Erzeugt die Strategie mit einem festen Gruppen-Seed
    pub fn new(version: AlgorithmVersion) -> Self {
        let mut seed = [0u8; SEED_LEN];
        OsRng.fill_bytes(&mut seed);
        Self { version, seed }
    }
}

fn verknuepfen(a: &SymmetricKey, b: &SymmetricKey) -> TreeResult<SymmetricKey> {
    xor(a, b).ok_or_else(|| TreeError::Inkonsistent("Schluessel unterschiedlicher Suite".into()))
}

/// Maximale verbliebene Knoten, die kein entferntes Mitglied kannte
fn ueberdeckung(tree: &KeyTree, changes: &AppliedChanges) -> TreeResult<Vec<NodeHandle>> {
    let mut out = Vec::new();
    let mut stapel = vec![tree.root()];
    while let Some(h) = stapel.pop() {
        if changes.new_leaves.contains(&h) {
            continue;
        }
        if changes.is_retained(tree, h) && !changes.tainted.contains(&h) {
            out.push(h);
            continue;
        }
        if let Some((l, r)) = tree.node(h)?.children() {
            stapel.push(r);
            stapel.push(l);
        }
    }
    Ok(out)
}

impl RekeyStrategy for SingleMessageStrategy {
    fn rekey(
        &mut self,
        tree: &mut KeyTree,
        changes: &AppliedChanges,
    ) -> TreeResult<Vec<RekeyPacket>> {
        let mut packets = Vec::new();
        let mut sm = RekeyPacket::new(PacketType::KekSingleMessage, self.version)
            .with_seed(self.seed.to_vec());

        if changes.has_removals() {
            // Blacklist zuerst, das SM-Paket traegt dann keine Operationen
            packets.push(
                RekeyPacket::new(PacketType::SimpleMessageRemove, self.version)
                    .with_ops(changes.ops.clone()),
            );
            if tree.is_empty() {
                return Ok(packets);
            }
        } else {
            sm = sm.with_ops(changes.ops.clone());
        }

        let r = tree.generator().random_key()?;

        // R unter den alten Schluesseln der Ueberdeckung
        let mut entries = Vec::new();
        for c in ueberdeckung(tree, changes)? {
            let node = tree.node(c)?;
            let maske = node_mask(&self.seed, node.id(), &node.kek().key);
            let kek = Kek::new(node.id(), KeyKind::Random, verknuepfen(&r, &maske)?);
            entries.push(entry_for(tree, c, &kek)?);
        }

        // Rotation aller verbliebenen Knoten
        let verblieben: Vec<NodeHandle> = tree
            .handles()
            .into_iter()
            .filter(|h| changes.is_retained(tree, *h))
            .collect();
        for h in &verblieben {
            let node = tree.node(*h)?;
            let maske = node_mask(&self.seed, node.id(), &node.kek().key);
            let neu = verknuepfen(&verknuepfen(&node.kek().key, &maske)?, &r)?;
            tree.set_key(*h, neu)?;
        }
        trace!(
            ueberdeckung = entries.len(),
            rotiert = verblieben.len(),
            "Single-Message-Rotation"
        );
        packets.push(sm.with_entries(entries));

        // Neue Knoten und alte Vorfahren neuer Blaetter fuer die Neuen
        let mut ziele: HashSet<NodeHandle> = changes.interposed.iter().copied().collect();
        for blatt in &changes.new_leaves {
            ziele.extend(tree.path_to_root(*blatt)?.into_iter().skip(1));
        }
        let mut add = Vec::new();
        for h in deepest_first(tree, ziele.iter().copied()) {
            let node = tree.node(h)?;
            let kek = node.kek().clone();
            let Some((links, rechts)) = node.children() else {
                continue;
            };
            let neu = changes.interposed.contains(&h);
            for kind in [links, rechts] {
                if neu || ziele.contains(&kind) || changes.new_leaves.contains(&kind) {
                    add.push(entry_for(tree, kind, &kek)?);
                }
            }
        }
        if !add.is_empty() {
            packets.push(
                RekeyPacket::new(PacketType::KekSingleMessageAdd, self.version).with_entries(add),
            );
        }

        Ok(packets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{AlgorithmConfig, RekeyAlgorithm};
    use lkhcast_core::{MemberId, NullSink};
    use lkhcast_protocol::TreeOp;
    use std::sync::Arc;

    fn sm(n: usize) -> (RekeyAlgorithm, Vec<MemberId>) {
        let config = AlgorithmConfig {
            version: AlgorithmVersion::SingleMessage,
            ..Default::default()
        };
        let mut alg = RekeyAlgorithm::new(config, Arc::new(NullSink)).unwrap();
        let mut ids = Vec::new();
        for _ in 0..n {
            let (m, kek) = alg.register_join().unwrap();
            alg.member_joining(m, kek).unwrap();
            ids.push(m);
        }
        (alg, ids)
    }

    fn schluessel(alg: &RekeyAlgorithm, member: MemberId) -> SymmetricKey {
        let h = alg.tree().find_by_member(member).unwrap();
        alg.tree().node(h).unwrap().kek().key.clone()
    }

    #[test]
    fn join_rotiert_mit_r() {
        let (mut alg, ids) = sm(2);
        let wurzel_alt = alg.tree().root_key().unwrap().key.clone();
        let blatt_alt = schluessel(&alg, ids[0]);

        let (m, kek) = alg.register_join().unwrap();
        let packets = alg.member_joining(m, kek).unwrap();
        let typen: Vec<PacketType> = packets.iter().map(|p| p.packet_type).collect();
        assert_eq!(
            typen,
            vec![
                PacketType::KekSingleMessage,
                PacketType::KekSingleMessageAdd,
                PacketType::SekDistribution
            ]
        );
        let paket = &packets[0];
        assert_eq!(paket.ops, vec![TreeOp::Insert { at: 2, member: m }]);
        assert_eq!(paket.seed.len(), SEED_LEN);

        // Einziger Ueberdeckungsknoten ist die Wurzel
        assert_eq!(paket.entries.len(), 1);
        assert_eq!(paket.entries[0].enc_id, 1);
        let x = Kek::from_bytes(&wurzel_alt, &paket.entries[0].kek).unwrap();
        assert_eq!(x.kind, KeyKind::Random);
        let r = xor(&x.key, &node_mask(&paket.seed, 1, &wurzel_alt)).unwrap();

        let erwartet = xor(&xor(&wurzel_alt, &node_mask(&paket.seed, 1, &wurzel_alt)).unwrap(), &r).unwrap();
        assert_eq!(alg.tree().root_key().unwrap().key, erwartet);

        // Verdraengtes Blatt rotiert unter seiner neuen ID 4
        let erwartet = xor(&xor(&blatt_alt, &node_mask(&paket.seed, 4, &blatt_alt)).unwrap(), &r).unwrap();
        assert_eq!(schluessel(&alg, ids[0]), erwartet);

        // ADD: E(k4, k2), E(k5, k2), E(k2, k1')
        let add: Vec<(u32, u32)> = packets[1]
            .entries
            .iter()
            .map(|e| (e.enc_id, e.target_id().unwrap()))
            .collect();
        assert_eq!(add, vec![(4, 2), (5, 2), (2, 1)]);
    }

    #[test]
    fn leave_sendet_blacklist_zuerst() {
        let (mut alg, ids) = sm(4);
        // ids[0]@4, ids[2]@5, ids[1]@6, ids[3]@7
        let packets = alg.member_leaving(ids[0]).unwrap();
        assert_eq!(packets[0].packet_type, PacketType::SimpleMessageRemove);
        assert_eq!(packets[0].ops, vec![TreeOp::Remove { leaf: 4 }]);
        assert!(packets[0].entries.is_empty());

        assert_eq!(packets[1].packet_type, PacketType::KekSingleMessage);
        assert!(packets[1].ops.is_empty());
        // Wurzel kannte das entfernte Mitglied, also die beiden Kinder
        let huellen: Vec<u32> = packets[1].entries.iter().map(|e| e.enc_id).collect();
        assert_eq!(huellen, vec![2, 3]);
        assert!(packets
            .iter()
            .all(|p| p.packet_type != PacketType::KekSingleMessageAdd));
    }

    #[test]
    fn letztes_mitglied_nur_blacklist() {
        let (mut alg, ids) = sm(1);
        let packets = alg.member_leaving(ids[0]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].packet_type, PacketType::SimpleMessageRemove);
    }

    #[test]
    fn seed_bleibt_fest() {
        let (mut alg, _) = sm(2);
        let (m, kek) = alg.register_join().unwrap();
        let a = alg.member_joining(m, kek).unwrap();
        let (m, kek) = alg.register_join().unwrap();
        let b = alg.member_joining(m, kek).unwrap();
        assert_eq!(a[0].seed, b[0].seed);
    }
}
