//! Rekeying-Algorithmen
//!
//! [`RekeyAlgorithm`] besitzt den Schluesselbaum und die Warteschlange der
//! Batch-Varianten. Eine Runde wendet alle anstehenden Joins und Leaves an,
//! ueberlaesst der gewaehlten [`RekeyStrategy`] die Schluesselverteilung und
//! haengt zum Schluss das SEK-Paket an. Zu grosse Pakete werden auf mehrere
//! Datagramme aufgeteilt.
//!
//! | Version               | Strategie        | Ausloeser |
//! |-----------------------|------------------|-----------|
//! | `Simple`              | LKH              | sofort    |
//! | `Batch`               | LKH              | Timer     |
//! | `BalancedBatch`       | LKH + Neuaufbau  | Timer     |
//! | `Oft`                 | OFT              | sofort    |
//! | `SingleMessage`       | Single-Message   | sofort    |
//! | `BatchSingleMessage`  | Single-Message   | Timer     |

pub mod lkh;
pub mod oft;
pub mod single_message;

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use lkhcast_core::{AlgorithmVersion, EventSink, GroupEvent, MemberId};
use lkhcast_crypto::{CipherSuite, Kek, KeyGenerator};
use lkhcast_protocol::{KeyEntry, PacketType, RekeyPacket, TreeOp, MAX_PAKET_LAENGE};

use crate::error::{TreeError, TreeResult};
use crate::node::NodeHandle;
use crate::tree::KeyTree;

pub use lkh::LkhStrategy;
pub use oft::OftStrategy;
pub use single_message::SingleMessageStrategy;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Einstellungen eines Algorithmus, einmalig beim Server-Start festgelegt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgorithmConfig {
    pub version: AlgorithmVersion,
    pub suite: CipherSuite,
    /// Erste vergebene Mitglieds-ID
    pub erste_mitglieds_id: u32,
    /// Maximale Tiefendifferenz vor einem Neuaufbau (nur `BalancedBatch`)
    pub balance_schwelle: u32,
    /// Obergrenze fuer ein kodiertes Rekey-Paket
    pub max_paket_laenge: usize,
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            version: AlgorithmVersion::default(),
            suite: CipherSuite::default(),
            erste_mitglieds_id: 100,
            balance_schwelle: 1,
            max_paket_laenge: MAX_PAKET_LAENGE,
        }
    }
}

// ---------------------------------------------------------------------------
// Strategie-Schnittstelle
// ---------------------------------------------------------------------------

/// Angewendete strukturelle Aenderungen einer Runde
#[derive(Debug, Clone, Default)]
pub struct AppliedChanges {
    pub ops: Vec<TreeOp>,
    pub new_leaves: Vec<NodeHandle>,
    pub interposed: Vec<NodeHandle>,
    /// Beim Einfuegen verdraengte Blaetter
    pub demoted: Vec<NodeHandle>,
    /// Verbliebene Knoten, die ein entferntes Mitglied kannte
    pub tainted: HashSet<NodeHandle>,
    pub promoted: Vec<NodeHandle>,
    /// Entfernte Mitglieder mit ihrer letzten Blatt-ID
    pub removed: Vec<(MemberId, u32)>,
    /// Alle Knoten vor der Runde
    pub old: HashSet<NodeHandle>,
}

impl AppliedChanges {
    pub fn is_new(&self, handle: NodeHandle) -> bool {
        self.new_leaves.contains(&handle) || self.interposed.contains(&handle)
    }

    /// Knoten der die Runde ueberlebt hat und schon vorher existierte
    pub fn is_retained(&self, tree: &KeyTree, handle: NodeHandle) -> bool {
        self.old.contains(&handle) && !self.is_new(handle) && tree.get(handle).is_some()
    }

    pub fn has_removals(&self) -> bool {
        !self.removed.is_empty()
    }
}

/// Schluesselverteilung einer Algorithmus-Familie
pub trait RekeyStrategy: Send + Sync {
    /// Erneuert die betroffenen Schluessel und erzeugt die Pakete der Runde
    /// (ohne SEK-Paket)
    fn rekey(&mut self, tree: &mut KeyTree, changes: &AppliedChanges)
        -> TreeResult<Vec<RekeyPacket>>;
}

/// Verschluesselt `kek` mit dem Schluessel des Knotens `huelle`
pub(crate) fn entry_for(tree: &KeyTree, huelle: NodeHandle, kek: &Kek) -> TreeResult<KeyEntry> {
    let node = tree.node(huelle)?;
    Ok(KeyEntry::new(node.id(), kek.to_bytes(&node.kek().key)?))
}

/// Sortiert tiefste Knoten zuerst, innerhalb einer Ebene nach ID
pub(crate) fn deepest_first(
    tree: &KeyTree,
    handles: impl IntoIterator<Item = NodeHandle>,
) -> Vec<NodeHandle> {
    let mut liste: Vec<(u32, u32, NodeHandle)> = handles
        .into_iter()
        .filter_map(|h| tree.get(h).map(|n| (n.name().row, n.id(), h)))
        .collect();
    liste.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    liste.dedup_by_key(|e| e.2);
    liste.into_iter().map(|(_, _, h)| h).collect()
}

// ---------------------------------------------------------------------------
// Warteschlange
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PendingChanges {
    joins: Vec<(MemberId, Kek)>,
    leaves: Vec<MemberId>,
}

impl PendingChanges {
    fn is_empty(&self) -> bool {
        self.joins.is_empty() && self.leaves.is_empty()
    }
}

// ---------------------------------------------------------------------------
// RekeyAlgorithm
// ---------------------------------------------------------------------------

/// Server-seitiger Algorithmus: Baum, Warteschlange und SEK-Verteilung
pub struct RekeyAlgorithm {
    config: AlgorithmConfig,
    tree: KeyTree,
    strategie: Box<dyn RekeyStrategy>,
    pending: PendingChanges,
    naechste_id: u32,
    sek_generation: u32,
    sek: Option<Kek>,
    events: Arc<dyn EventSink>,
}

impl RekeyAlgorithm {
    pub fn new(config: AlgorithmConfig, events: Arc<dyn EventSink>) -> TreeResult<Self> {
        let generator = KeyGenerator::new(config.suite);
        let tree = KeyTree::new(generator)?;
        let version = config.version;
        let strategie: Box<dyn RekeyStrategy> = match version {
            AlgorithmVersion::Simple | AlgorithmVersion::Batch => {
                Box::new(LkhStrategy::new(version, None))
            }
            AlgorithmVersion::BalancedBatch => {
                Box::new(LkhStrategy::new(version, Some(config.balance_schwelle)))
            }
            AlgorithmVersion::Oft => Box::new(OftStrategy::new()),
            AlgorithmVersion::SingleMessage | AlgorithmVersion::BatchSingleMessage => {
                Box::new(SingleMessageStrategy::new(version))
            }
        };
        info!(
            version = %version,
            suite = ?config.suite,
            "Rekeying-Algorithmus initialisiert"
        );
        Ok(Self {
            naechste_id: config.erste_mitglieds_id,
            config,
            tree,
            strategie,
            pending: PendingChanges::default(),
            sek_generation: 0,
            sek: None,
            events,
        })
    }

    pub fn version(&self) -> AlgorithmVersion {
        self.config.version
    }

    pub fn config(&self) -> &AlgorithmConfig {
        &self.config
    }

    pub fn tree(&self) -> &KeyTree {
        &self.tree
    }

    /// Zuletzt verteilter Session-Schluessel
    pub fn current_sek(&self) -> Option<&Kek> {
        self.sek.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Mitglied im Baum oder mit ausstehendem Join
    pub fn is_member(&self, member: MemberId) -> bool {
        self.tree.contains(member) || self.pending.joins.iter().any(|(m, _)| *m == member)
    }

    /// Vergibt ID und Blatt-KEK fuer ein neues Mitglied
    ///
    /// Die KEK-ID ist nur eine Vorhersage; massgeblich ist die
    /// `Insert`-Operation der Runde, die das Mitglied einfuegt.
    pub fn register_join(&mut self) -> TreeResult<(MemberId, Kek)> {
        let member = MemberId(self.naechste_id);
        self.naechste_id = self
            .naechste_id
            .checked_add(1)
            .ok_or_else(|| TreeError::Inkonsistent("Mitglieds-IDs erschoepft".into()))?;
        let kek = self
            .tree
            .generator()
            .gen_kek(self.tree.predicted_leaf_id())?;
        debug!(member_id = %member, kek_id = kek.id, "Join registriert");
        Ok((member, kek))
    }

    /// Ein Mitglied hat den Handshake abgeschlossen
    pub fn member_joining(&mut self, member: MemberId, leaf_kek: Kek) -> TreeResult<Vec<RekeyPacket>> {
        if self.is_member(member) {
            return Err(TreeError::MitgliedExistiert(member));
        }
        self.pending.joins.push((member, leaf_kek));
        if self.config.version.is_batch() {
            debug!(member_id = %member, "Join vorgemerkt");
            return Ok(Vec::new());
        }
        self.rekey()
    }

    /// Ein Mitglied verlaesst die Gruppe
    pub fn member_leaving(&mut self, member: MemberId) -> TreeResult<Vec<RekeyPacket>> {
        if let Some(pos) = self.pending.joins.iter().position(|(m, _)| *m == member) {
            // Noch nicht eingefuegt: Join verwerfen
            self.pending.joins.remove(pos);
            debug!(member_id = %member, "Ausstehender Join verworfen");
            return Ok(Vec::new());
        }
        if !self.tree.contains(member) {
            return Err(TreeError::UnbekanntesMitglied(member));
        }
        if !self.pending.leaves.contains(&member) {
            self.pending.leaves.push(member);
        }
        if self.config.version.is_batch() {
            debug!(member_id = %member, "Leave vorgemerkt");
            return Ok(Vec::new());
        }
        self.rekey()
    }

    /// Schliesst ein Mitglied administrativ aus, auch Batch-Varianten
    /// rekeyen sofort
    pub fn expel(&mut self, member: MemberId) -> TreeResult<Vec<RekeyPacket>> {
        info!(member_id = %member, "Mitglied wird ausgeschlossen");
        let mut packets = self.member_leaving(member)?;
        if self.has_pending() {
            packets.extend(self.rekey()?);
        }
        Ok(packets)
    }

    /// Fuehrt eine Runde mit allen anstehenden Aenderungen aus
    ///
    /// Ohne anstehende Aenderungen wird nichts erzeugt.
    pub fn rekey(&mut self) -> TreeResult<Vec<RekeyPacket>> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        pending_pruefen(&self.tree, &self.pending)?;
        let pending = std::mem::take(&mut self.pending);
        let changes = apply_changes(&mut self.tree, pending)?;
        let mut roh = self.strategie.rekey(&mut self.tree, &changes)?;

        for (member, leaf_id) in &changes.removed {
            self.events.senden(GroupEvent::KnotenVerworfen {
                knoten_id: *leaf_id,
                member_id: Some(*member),
            });
        }

        if self.tree.is_empty() {
            self.sek = None;
        } else {
            roh.push(self.sek_verteilen()?);
        }

        let mut packets = Vec::with_capacity(roh.len());
        for packet in roh {
            let teile = packet.aufteilen(self.config.max_paket_laenge)?;
            if teile.len() > 1 {
                debug!(typ = %teile[0].packet_type, teile = teile.len(), "Paket aufgeteilt");
            }
            packets.extend(teile);
        }

        self.events.senden(GroupEvent::BaumAktualisiert {
            schluessel: self.tree.node_count(),
        });
        debug_assert!(self.tree.validate().is_ok());

        info!(
            version = %self.config.version,
            joins = changes.new_leaves.len(),
            leaves = changes.removed.len(),
            mitglieder = self.tree.member_count(),
            pakete = packets.len(),
            "Rekey-Runde abgeschlossen"
        );
        Ok(packets)
    }

    /// Paket zur Aufloesung der Gruppe (leere Zielliste)
    pub fn dissolve(&self) -> RekeyPacket {
        RekeyPacket::new(PacketType::MulticastLeaving, self.config.version)
    }

    fn sek_verteilen(&mut self) -> TreeResult<RekeyPacket> {
        self.sek_generation = self.sek_generation.wrapping_add(1);
        let sek = self.tree.generator().gen_sek(self.sek_generation)?;
        let entry = entry_for(&self.tree, self.tree.root(), &sek)?;

        self.events.senden(GroupEvent::NeuerSek {
            key_id: sek.id,
            tag: sek.tag().to_u32(),
            schluessel: sek.key.secret().clone(),
        });
        self.sek = Some(sek);

        Ok(RekeyPacket::new(PacketType::SekDistribution, self.config.version).with_entries(vec![entry]))
    }
}

impl std::fmt::Debug for RekeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RekeyAlgorithm")
            .field("config", &self.config)
            .field("mitglieder", &self.tree.member_count())
            .field("sek_generation", &self.sek_generation)
            .finish()
    }
}

/// Prueft alle Mitglieder der Warteschlange gegen den Baum
fn pending_pruefen(tree: &KeyTree, pending: &PendingChanges) -> TreeResult<()> {
    for member in &pending.leaves {
        if !tree.contains(*member) {
            return Err(TreeError::UnbekanntesMitglied(*member));
        }
    }
    for (member, _) in &pending.joins {
        if tree.contains(*member) {
            return Err(TreeError::MitgliedExistiert(*member));
        }
    }
    Ok(())
}

/// Wendet Leaves, dann Joins auf den Baum an
fn apply_changes(tree: &mut KeyTree, pending: PendingChanges) -> TreeResult<AppliedChanges> {
    let mut changes = AppliedChanges {
        old: tree.handles().into_iter().collect(),
        ..Default::default()
    };

    for member in pending.leaves {
        let outcome = tree.remove(member)?;
        changes.ops.push(TreeOp::Remove {
            leaf: outcome.leaf_id,
        });
        changes.tainted.extend(outcome.ancestors);
        changes.promoted.extend(outcome.promoted);
        changes.removed.push((member, outcome.leaf_id));
    }

    for (member, kek) in pending.joins {
        let outcome = tree.insert(member, kek)?;
        changes.ops.push(TreeOp::Insert {
            at: outcome.at,
            member,
        });
        changes.new_leaves.push(outcome.leaf);
        changes.interposed.extend(outcome.interposed);
        changes.demoted.extend(outcome.demoted);
    }

    changes.tainted.retain(|h| tree.get(*h).is_some());
    changes.promoted.retain(|h| tree.get(*h).is_some());
    Ok(changes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
