//! One-way Function Tree
//!
//! Blaetter tragen Zufallsschluessel, jeder innere Knoten ergibt sich aus
//! seinen Kindern: `k = blind(k_links) XOR blind(k_rechts)`. Verteilt werden
//! nur geblendete Werte. Ein Mitglied berechnet seinen Pfad selbst aus dem
//! eigenen Blatt und den geblendeten Schluesseln der Geschwister.
//!
//! Pro Runde:
//! - aufgefrischte Blaetter: neue Blaetter, beim Join das verdraengte Blatt
//!   und beim Leave das linkeste Blatt des hochgerueckten Teilbaums
//!   (`E(k_alt, k_neu)`)
//! - fuer jeden geaenderten Knoten v ausser der Wurzel:
//!   `E(k_geschwister(v), blind(k_v))`
//! - fuer jedes neue Blatt n und jedes unveraenderte Geschwister s auf
//!   seinem Pfad: `E(k_n, blind(k_s))`

use std::collections::HashSet;

use lkhcast_core::AlgorithmVersion;
use lkhcast_crypto::{blind, xor, Kek, KeyKind};
use lkhcast_protocol::{KeyEntry, PacketType, RekeyPacket};

use super::{deepest_first, entry_for, AppliedChanges, RekeyStrategy};
use crate::error::{TreeError, TreeResult};
use crate::node::NodeHandle;
use crate::tree::KeyTree;

#[derive(Debug, Clone, Default)]
pub struct OftStrategy;

impl OftStrategy {
    pub fn new() -> Self {
        Self
    }
}

/// Geblendeter Schluessel eines Knotens als verteilbarer KEK
fn geblendet(tree: &KeyTree, h: NodeHandle) -> TreeResult<Kek> {
    let node = tree.node(h)?;
    Ok(Kek::new(node.id(), KeyKind::Blinded, blind(&node.kek().key)))
}

impl RekeyStrategy for OftStrategy {
    fn rekey(
        &mut self,
        tree: &mut KeyTree,
        changes: &AppliedChanges,
    ) -> TreeResult<Vec<RekeyPacket>> {
        let paket = RekeyPacket::new(PacketType::KekOft, AlgorithmVersion::Oft)
            .with_ops(changes.ops.clone());
        if tree.is_empty() {
            return Ok(vec![paket]);
        }

        let mut entries: Vec<KeyEntry> = Vec::new();

        // Linkestes Blatt jedes hochgerueckten Teilbaums und jedes verdraengte
        // alte Blatt auffrischen, sonst liefert sein Blind den alten Pfad
        let mut erneuern = Vec::new();
        for promoted in &changes.promoted {
            erneuern.push(tree.leftmost_leaf(*promoted)?);
        }
        erneuern.extend(
            changes
                .demoted
                .iter()
                .copied()
                .filter(|h| !changes.new_leaves.contains(h) && tree.get(*h).is_some()),
        );

        let mut aufgefrischt: Vec<NodeHandle> = changes.new_leaves.clone();
        for blatt in erneuern {
            if aufgefrischt.contains(&blatt) {
                continue;
            }
            let alt = tree.node(blatt)?.kek().key.clone();
            tree.renew_key(blatt)?;
            let neu = tree.node(blatt)?.kek().clone();
            entries.push(KeyEntry::new(neu.id, neu.to_bytes(&alt)?));
            aufgefrischt.push(blatt);
        }

        let mut geaendert: HashSet<NodeHandle> = HashSet::new();
        for blatt in &aufgefrischt {
            geaendert.extend(tree.path_to_root(*blatt)?);
        }
        let reihenfolge = deepest_first(tree, geaendert.iter().copied());

        // Innere Schluessel von unten nach oben neu berechnen
        for h in &reihenfolge {
            let Some((l, r)) = tree.node(*h)?.children() else {
                continue;
            };
            let links = blind(&tree.node(l)?.kek().key);
            let rechts = blind(&tree.node(r)?.kek().key);
            let key = xor(&links, &rechts)
                .ok_or_else(|| TreeError::Inkonsistent("Schluessel unterschiedlicher Suite".into()))?;
            tree.set_key(*h, key)?;
        }

        // Geblendete Werte an die Geschwister-Teilbaeume
        for h in &reihenfolge {
            let Some(geschwister) = tree.sibling(*h)? else {
                continue;
            };
            entries.push(entry_for(tree, geschwister, &geblendet(tree, *h)?)?);
        }

        // Neue Blaetter erhalten die unveraenderten Geschwister ihres Pfads
        for blatt in &changes.new_leaves {
            for h in tree.path_to_root(*blatt)? {
                let Some(geschwister) = tree.sibling(h)? else {
                    continue;
                };
                if geaendert.contains(&geschwister) {
                    continue;
                }
                entries.push(entry_for(tree, *blatt, &geblendet(tree, geschwister)?)?);
            }
        }

        Ok(vec![paket.with_entries(entries)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{AlgorithmConfig, RekeyAlgorithm};
    use lkhcast_core::{MemberId, NullSink};
    use lkhcast_crypto::SymmetricKey;
    use std::sync::Arc;

    fn oft(n: usize) -> (RekeyAlgorithm, Vec<MemberId>) {
        let config = AlgorithmConfig {
            version: AlgorithmVersion::Oft,
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

    fn pruefe_oft_invariante(tree: &KeyTree) {
        for h in tree.internal_nodes() {
            let node = tree.node(h).unwrap();
            let (l, r) = node.children().unwrap();
            let erwartet = xor(
                &blind(&tree.node(l).unwrap().kek().key),
                &blind(&tree.node(r).unwrap().kek().key),
            )
            .unwrap();
            assert_eq!(node.kek().key, erwartet, "Knoten {}", node.name());
        }
    }

    #[test]
    fn innere_schluessel_folgen_den_kindern() {
        let (mut alg, ids) = oft(6);
        pruefe_oft_invariante(alg.tree());
        alg.member_leaving(ids[1]).unwrap();
        pruefe_oft_invariante(alg.tree());
        alg.member_leaving(ids[0]).unwrap();
        pruefe_oft_invariante(alg.tree());
    }

    #[test]
    fn zweites_mitglied_erhaelt_geschwister_blind() {
        let (mut alg, _) = oft(1);
        let (m, kek) = alg.register_join().unwrap();
        let packets = alg.member_joining(m, kek).unwrap();
        let oft = &packets[0];
        // E(k_2alt, k_2), E(k_3, blind(k_2)) und E(k_2, blind(k_3))
        let paare: Vec<(u32, u32)> = oft
            .entries
            .iter()
            .map(|e| (e.enc_id, e.target_id().unwrap()))
            .collect();
        assert_eq!(paare, vec![(2, 2), (3, 2), (2, 3)]);
    }

    #[test]
    fn join_frischt_verdraengtes_blatt_auf() {
        let (mut alg, ids) = oft(3);
        // ids[1] sitzt bei 3 und wird durch den Join nach 6 verdraengt
        let blatt = alg.tree().find_by_member(ids[1]).unwrap();
        let vorher = alg.tree().node(blatt).unwrap().kek().key.clone();
        let wurzel_alt = alg.tree().root_key().unwrap().key.clone();

        let (m, kek) = alg.register_join().unwrap();
        let packets = alg.member_joining(m, kek).unwrap();
        let nachher = alg.tree().node(blatt).unwrap().kek().clone();
        assert_eq!(nachher.id, 6);
        assert_ne!(nachher.key, vorher);

        let auffrischung = &packets[0].entries[0];
        assert_eq!((auffrischung.enc_id, auffrischung.target_id()), (6, Some(6)));
        let kek = Kek::from_bytes(&vorher, &auffrischung.kek).unwrap();
        assert_eq!(kek.key, nachher.key);

        // Das neue Mitglied erhaelt nur noch das Blind des neuen Schluessels
        let neu = alg.tree().find_by_member(m).unwrap();
        let k_neu = alg.tree().node(neu).unwrap().kek().key.clone();
        let geblendete: Vec<SymmetricKey> = packets[0]
            .entries
            .iter()
            .filter(|e| e.enc_id == 7)
            .map(|e| Kek::from_bytes(&k_neu, &e.kek).unwrap().key)
            .collect();
        assert!(geblendete.contains(&blind(&nachher.key)));
        assert!(!geblendete.contains(&blind(&vorher)));
        for b in &geblendete {
            for c in &geblendete {
                assert_ne!(xor(b, c).as_ref(), Some(&wurzel_alt));
            }
        }
    }

    #[test]
    fn leave_frischt_linkestes_blatt_auf() {
        let (mut alg, ids) = oft(3);
        // ids[0]@4, ids[2]@5, ids[1]@3
        let blatt = alg.tree().find_by_member(ids[2]).unwrap();
        let vorher = alg.tree().node(blatt).unwrap().kek().key.clone();
        let packets = alg.member_leaving(ids[0]).unwrap();
        let nachher = alg.tree().node(blatt).unwrap().kek();
        assert_eq!(nachher.id, 2);
        assert_ne!(nachher.key, vorher);
        assert_eq!(packets[0].entries[0].enc_id, 2);
        assert_eq!(packets[0].entries[0].target_id(), Some(2));
    }
}
