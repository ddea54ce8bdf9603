//! Knoten des Schluesselbaums

use lkhcast_core::{MemberId, NodeName};
use lkhcast_crypto::Kek;

/// Verweis auf einen Knoten in der Arena
///
/// Die Generation unterscheidet wiederverwendete Slots: ein Handle auf einen
/// entfernten Knoten wird nie mit seinem Nachfolger verwechselt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Ein Knoten: Blatt (Mitglied) oder innerer Knoten mit genau zwei Kindern
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) name: NodeName,
    pub(crate) kek: Kek,
    pub(crate) previous: Option<Kek>,
    pub(crate) parent: Option<NodeHandle>,
    pub(crate) left: Option<NodeHandle>,
    pub(crate) right: Option<NodeHandle>,
    pub(crate) member: Option<MemberId>,
}

impl Node {
    pub(crate) fn new(name: NodeName, mut kek: Kek, parent: Option<NodeHandle>) -> Self {
        kek.id = name.id();
        Self {
            name,
            kek,
            previous: None,
            parent,
            left: None,
            right: None,
            member: None,
        }
    }

    pub fn name(&self) -> NodeName {
        self.name
    }

    /// Numerische Identitaet (Heap-Index)
    pub fn id(&self) -> u32 {
        self.name.id()
    }

    pub fn kek(&self) -> &Kek {
        &self.kek
    }

    /// Schluessel vor der letzten Ersetzung
    pub fn previous(&self) -> Option<&Kek> {
        self.previous.as_ref()
    }

    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    /// Beide Kinder eines inneren Knotens
    pub fn children(&self) -> Option<(NodeHandle, NodeHandle)> {
        match (self.left, self.right) {
            (Some(l), Some(r)) => Some((l, r)),
            _ => None,
        }
    }

    pub fn member(&self) -> Option<MemberId> {
        self.member
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    /// Ersetzt den Schluessel, der bisherige wandert nach `previous`
    pub(crate) fn set_kek(&mut self, mut kek: Kek) {
        kek.id = self.name.id();
        self.previous = Some(std::mem::replace(&mut self.kek, kek));
    }

    /// Neuer struktureller Name, die KEK-ID folgt
    pub(crate) fn rename(&mut self, name: NodeName) {
        self.name = name;
        self.kek.id = name.id();
    }
}
