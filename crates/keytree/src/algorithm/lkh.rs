//! Standard-LKH (Simple, Batch, Balanced-Batch)
//!
//! Jeder geaenderte innere Knoten erhaelt einen frischen Schluessel, der
//! unter beiden Kind-Schluesseln verschluesselt verteilt wird. Verarbeitet
//! wird von unten nach oben, sodass ein Kind bereits seinen neuen Schluessel
//! traegt wenn der Elternknoten an der Reihe ist.

use std::collections::HashSet;

use tracing::debug;

use lkhcast_core::AlgorithmVersion;
use lkhcast_protocol::{PacketType, RekeyPacket, TreeOp};

use super::{deepest_first, entry_for, AppliedChanges, RekeyStrategy};
use crate::error::{TreeError, TreeResult};
use crate::node::NodeHandle;
use crate::tree::KeyTree;

/// LKH mit optionalem Neuaufbau bei Schieflage
#[derive(Debug, Clone)]
pub struct LkhStrategy {
    version: AlgorithmVersion,
    balance_schwelle: Option<u32>,
}

impl LkhStrategy {
    pub fn new(version: AlgorithmVersion, balance_schwelle: Option<u32>) -> Self {
        Self {
            version,
            balance_schwelle,
        }
    }

    fn braucht_neuaufbau(&self, tree: &KeyTree) -> bool {
        match self.balance_schwelle {
            Some(schwelle) => tree.balance_skew() > schwelle,
            None => false,
        }
    }
}

impl RekeyStrategy for LkhStrategy {
    fn rekey(
        &mut self,
        tree: &mut KeyTree,
        changes: &AppliedChanges,
    ) -> TreeResult<Vec<RekeyPacket>> {
        let mut ops = changes.ops.clone();

        let geaendert: HashSet<NodeHandle> = if self.braucht_neuaufbau(tree) {
            let skew = tree.balance_skew();
            let assignments = tree.rebuild()?;
            debug!(skew, mitglieder = assignments.len(), "Baum neu aufgebaut");
            ops.push(TreeOp::Rebuild { assignments });
            tree.internal_nodes().into_iter().collect()
        } else {
            let mut set: HashSet<NodeHandle> = changes.tainted.clone();
            for leaf in &changes.new_leaves {
                set.extend(tree.path_to_root(*leaf)?.into_iter().skip(1));
            }
            set
        };

        let mut entries = Vec::new();
        for h in deepest_first(tree, geaendert) {
            if tree.node(h)?.is_leaf() {
                continue;
            }
            tree.renew_key(h)?;
            let node = tree.node(h)?;
            let kek = node.kek().clone();
            let (links, rechts) = node
                .children()
                .ok_or_else(|| TreeError::Inkonsistent("Innerer Knoten ohne Kinder".into()))?;
            entries.push(entry_for(tree, links, &kek)?);
            entries.push(entry_for(tree, rechts, &kek)?);
        }

        Ok(vec![RekeyPacket::new(PacketType::KekAncestors, self.version)
            .with_ops(ops)
            .with_entries(entries)])
    }
}
