//! Binaerer Schluesselbaum (Arena)
//!
//! Knoten liegen in einem `Vec` von Slots und werden ueber [`NodeHandle`]
//! adressiert. Jeder innere Knoten hat genau zwei Kinder, Blaetter tragen ein
//! Mitglied. Ohne Mitglieder besteht der Baum aus einer leeren Wurzel.
//!
//! ## Einfuegen
//! Das neue Blatt haengt unter dem flachsten Blatt (bei Gleichstand dem mit
//! der kleinsten ID). An dessen Stelle tritt ein neuer innerer Knoten, das
//! alte Blatt wird linkes, das neue rechtes Kind.
//!
//! ## Entfernen
//! Blatt und Elternknoten verschwinden, der Geschwister-Teilbaum rueckt an
//! die Stelle des Elternknotens und wird umbenannt.

use std::collections::{HashMap, HashSet, VecDeque};

use lkhcast_core::{MemberId, NodeName};
use lkhcast_crypto::{Kek, KeyGenerator, KeyKind, SymmetricKey};
use tracing::trace;

use crate::error::{TreeError, TreeResult};
use crate::node::{Node, NodeHandle};

// ---------------------------------------------------------------------------
// Ergebnisse struktureller Operationen
// ---------------------------------------------------------------------------

/// Ergebnis von [`KeyTree::insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Neues Blatt des Mitglieds
    pub leaf: NodeHandle,
    /// Neu eingeschobener innerer Knoten (None beim ersten Mitglied)
    pub interposed: Option<NodeHandle>,
    /// Verdraengtes Blatt, jetzt linkes Kind von `interposed`
    pub demoted: Option<NodeHandle>,
    /// Bisherige ID des verdraengten Blatts, 0 bei leerem Baum
    pub at: u32,
}

/// Ergebnis von [`KeyTree::remove`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// ID des entfernten Blatts vor der Entfernung
    pub leaf_id: u32,
    /// Hochgerueckter Geschwisterknoten (None wenn der Baum leer wurde)
    pub promoted: Option<NodeHandle>,
    /// Verbliebene Vorfahren des entfernten Blatts (Blatt -> Wurzel)
    pub ancestors: Vec<NodeHandle>,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

// ---------------------------------------------------------------------------
// KeyTree
// ---------------------------------------------------------------------------

/// Schluesselbaum des Servers
#[derive(Debug, Clone)]
pub struct KeyTree {
    slots: Vec<Slot>,
    frei: Vec<u32>,
    root: NodeHandle,
    members: HashMap<MemberId, NodeHandle>,
    generator: KeyGenerator,
}

impl KeyTree {
    /// Erstellt einen leeren Baum (leere Wurzel mit frischem Schluessel)
    pub fn new(generator: KeyGenerator) -> TreeResult<Self> {
        let mut tree = Self {
            slots: Vec::new(),
            frei: Vec::new(),
            root: NodeHandle {
                index: 0,
                generation: 0,
            },
            members: HashMap::new(),
            generator,
        };
        let kek = generator.gen_kek(NodeName::ROOT.id())?;
        tree.root = tree.allocate(Node::new(NodeName::ROOT, kek, None));
        Ok(tree)
    }

    pub fn generator(&self) -> &KeyGenerator {
        &self.generator
    }

    pub fn root(&self) -> NodeHandle {
        self.root
    }

    /// Aktueller Wurzelschluessel
    pub fn root_key(&self) -> TreeResult<&Kek> {
        Ok(self.node(self.root)?.kek())
    }

    pub fn get(&self, handle: NodeHandle) -> Option<&Node> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.node.as_ref())
    }

    pub fn node(&self, handle: NodeHandle) -> TreeResult<&Node> {
        self.get(handle).ok_or(TreeError::UngueltigerHandle)
    }

    fn node_mut(&mut self, handle: NodeHandle) -> TreeResult<&mut Node> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.node.as_mut())
            .ok_or(TreeError::UngueltigerHandle)
    }

    fn allocate(&mut self, node: Node) -> NodeHandle {
        if let Some(index) = self.frei.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeHandle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeHandle {
                index,
                generation: 0,
            }
        }
    }

    fn free(&mut self, handle: NodeHandle) {
        if let Some(slot) = self.slots.get_mut(handle.index as usize) {
            if slot.generation == handle.generation && slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.frei.push(handle.index);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, member: MemberId) -> bool {
        self.members.contains_key(&member)
    }

    /// Anzahl lebender Knoten
    pub fn node_count(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    /// Alle lebenden Handles
    pub fn handles(&self) -> Vec<NodeHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.node.is_some())
            .map(|(i, s)| NodeHandle {
                index: i as u32,
                generation: s.generation,
            })
            .collect()
    }

    pub fn find_by_member(&self, member: MemberId) -> Option<NodeHandle> {
        self.members.get(&member).copied()
    }

    /// Sucht einen Knoten ueber seinen strukturellen Namen
    ///
    /// Die Bits der ID unterhalb der fuehrenden 1 beschreiben den Weg ab der
    /// Wurzel (0 = links, 1 = rechts).
    pub fn find_by_name(&self, name: NodeName) -> Option<NodeHandle> {
        let id = name.id();
        let mut aktuell = self.root;
        for bit in (0..name.row - 1).rev() {
            let (l, r) = self.get(aktuell)?.children()?;
            aktuell = if (id >> bit) & 1 == 0 { l } else { r };
        }
        Some(aktuell)
    }

    pub fn find_by_id(&self, id: u32) -> Option<NodeHandle> {
        NodeName::from_id(id).ok().and_then(|n| self.find_by_name(n))
    }

    pub fn sibling(&self, handle: NodeHandle) -> TreeResult<Option<NodeHandle>> {
        let Some(parent) = self.node(handle)?.parent else {
            return Ok(None);
        };
        let (l, r) = self
            .node(parent)?
            .children()
            .ok_or_else(|| TreeError::Inkonsistent("Elternknoten ohne Kinder".into()))?;
        Ok(Some(if l == handle { r } else { l }))
    }

    /// Pfad vom Knoten bis zur Wurzel (inklusive beider)
    pub fn path_to_root(&self, handle: NodeHandle) -> TreeResult<Vec<NodeHandle>> {
        let mut pfad = vec![handle];
        let mut aktuell = self.node(handle)?;
        while let Some(parent) = aktuell.parent {
            pfad.push(parent);
            aktuell = self.node(parent)?;
        }
        Ok(pfad)
    }

    /// Blaetter von links nach rechts
    pub fn leaves(&self) -> Vec<NodeHandle> {
        let mut out = Vec::new();
        let mut stapel = vec![self.root];
        while let Some(h) = stapel.pop() {
            let Some(node) = self.get(h) else { continue };
            match node.children() {
                Some((l, r)) => {
                    stapel.push(r);
                    stapel.push(l);
                }
                None => out.push(h),
            }
        }
        out
    }

    /// Mitglieder in Blatt-Reihenfolge
    pub fn members(&self) -> Vec<MemberId> {
        self.leaves()
            .into_iter()
            .filter_map(|h| self.get(h).and_then(Node::member))
            .collect()
    }

    /// Innere Knoten (beliebige Reihenfolge)
    pub fn internal_nodes(&self) -> Vec<NodeHandle> {
        self.handles()
            .into_iter()
            .filter(|h| self.get(*h).is_some_and(|n| !n.is_leaf()))
            .collect()
    }

    /// Linkestes Blatt im Teilbaum
    pub fn leftmost_leaf(&self, handle: NodeHandle) -> TreeResult<NodeHandle> {
        let mut aktuell = handle;
        while let Some((l, _)) = self.node(aktuell)?.children() {
            aktuell = l;
        }
        Ok(aktuell)
    }

    /// Tiefe des Baums (Wurzel allein = 1)
    pub fn depth(&self) -> u32 {
        self.leaf_rows().map(|(_, max)| max).unwrap_or(1)
    }

    /// Differenz zwischen tiefstem und flachstem Blatt
    pub fn balance_skew(&self) -> u32 {
        self.leaf_rows().map(|(min, max)| max - min).unwrap_or(0)
    }

    fn leaf_rows(&self) -> Option<(u32, u32)> {
        self.leaves()
            .into_iter()
            .filter_map(|h| self.get(h).map(|n| n.name.row))
            .fold(None, |acc, row| match acc {
                None => Some((row, row)),
                Some((min, max)) => Some((min.min(row), max.max(row))),
            })
    }

    /// Flachstes Blatt, bei Gleichstand das linkeste
    pub fn next_parent(&self) -> NodeHandle {
        let mut queue = VecDeque::from([self.root]);
        while let Some(h) = queue.pop_front() {
            match self.get(h).and_then(Node::children) {
                Some((l, r)) => {
                    queue.push_back(l);
                    queue.push_back(r);
                }
                None => return h,
            }
        }
        self.root
    }

    /// Voraussichtliche Blatt-ID des naechsten Mitglieds
    pub fn predicted_leaf_id(&self) -> u32 {
        if self.is_empty() {
            return NodeName::ROOT.id();
        }
        self.get(self.next_parent())
            .map(|n| n.id())
            .and_then(|at| at.checked_mul(2))
            .map(|id| id | 1)
            .unwrap_or(NodeName::ROOT.id())
    }

    // -----------------------------------------------------------------------
    // Schluessel
    // -----------------------------------------------------------------------

    /// Setzt neues Schluesselmaterial, der alte Schluessel wird `previous`
    pub fn set_key(&mut self, handle: NodeHandle, key: SymmetricKey) -> TreeResult<()> {
        let node = self.node_mut(handle)?;
        let kek = Kek::new(node.id(), KeyKind::Kek, key);
        node.set_kek(kek);
        Ok(())
    }

    /// Ersetzt den Schluessel durch einen frischen Zufallsschluessel
    pub fn renew_key(&mut self, handle: NodeHandle) -> TreeResult<()> {
        let key = self.generator.random_key()?;
        self.set_key(handle, key)
    }

    // -----------------------------------------------------------------------
    // Strukturelle Operationen
    // -----------------------------------------------------------------------

    /// Fuegt ein Mitglied mit seinem Blatt-KEK ein
    pub fn insert(&mut self, member: MemberId, leaf_kek: Kek) -> TreeResult<InsertOutcome> {
        if self.members.contains_key(&member) {
            return Err(TreeError::MitgliedExistiert(member));
        }

        if self.members.is_empty() {
            let root = self.root;
            let node = self.node_mut(root)?;
            node.member = Some(member);
            node.set_kek(leaf_kek);
            self.members.insert(member, root);
            trace!(member_id = %member, "Erstes Mitglied in der Wurzel");
            return Ok(InsertOutcome {
                leaf: root,
                interposed: None,
                demoted: None,
                at: 0,
            });
        }

        let alt = self.next_parent();
        let (alt_name, grosseltern) = {
            let n = self.node(alt)?;
            (n.name, n.parent)
        };
        let links = alt_name.left_child()?;
        let rechts = alt_name.right_child()?;

        let kek = self.generator.gen_kek(alt_name.id())?;
        let interposed = self.allocate(Node::new(alt_name, kek, grosseltern));

        let mut blatt = Node::new(rechts, leaf_kek, Some(interposed));
        blatt.member = Some(member);
        let leaf = self.allocate(blatt);

        {
            let n = self.node_mut(alt)?;
            n.rename(links);
            n.parent = Some(interposed);
        }
        {
            let i = self.node_mut(interposed)?;
            i.left = Some(alt);
            i.right = Some(leaf);
        }
        self.replace_child(grosseltern, alt, interposed)?;
        self.members.insert(member, leaf);

        trace!(member_id = %member, at = alt_name.id(), "Blatt eingefuegt");
        Ok(InsertOutcome {
            leaf,
            interposed: Some(interposed),
            demoted: Some(alt),
            at: alt_name.id(),
        })
    }

    /// Entfernt das Blatt eines Mitglieds
    pub fn remove(&mut self, member: MemberId) -> TreeResult<RemoveOutcome> {
        let leaf = self
            .find_by_member(member)
            .ok_or(TreeError::UnbekanntesMitglied(member))?;
        let (leaf_name, parent) = {
            let n = self.node(leaf)?;
            (n.name, n.parent)
        };

        let Some(parent) = parent else {
            // Letztes Mitglied: Wurzel wird leer
            let kek = self.generator.gen_kek(NodeName::ROOT.id())?;
            let node = self.node_mut(leaf)?;
            node.member = None;
            node.set_kek(kek);
            self.members.remove(&member);
            return Ok(RemoveOutcome {
                leaf_id: leaf_name.id(),
                promoted: None,
                ancestors: Vec::new(),
            });
        };

        let sibling = self
            .sibling(leaf)?
            .ok_or_else(|| TreeError::Inkonsistent("Blatt ohne Geschwister".into()))?;
        let (eltern_name, grosseltern) = {
            let n = self.node(parent)?;
            (n.name, n.parent)
        };
        let ancestors = match grosseltern {
            Some(g) => self.path_to_root(g)?,
            None => Vec::new(),
        };

        self.replace_child(grosseltern, parent, sibling)?;
        self.node_mut(sibling)?.parent = grosseltern;
        self.rename_subtree(sibling, eltern_name)?;

        self.free(leaf);
        self.free(parent);
        self.members.remove(&member);

        trace!(member_id = %member, leaf = leaf_name.id(), "Blatt entfernt");
        Ok(RemoveOutcome {
            leaf_id: leaf_name.id(),
            promoted: Some(sibling),
            ancestors,
        })
    }

    /// Baut den Baum aus den Mitgliedern in Blatt-Reihenfolge neu auf
    ///
    /// Blatt-Schluessel bleiben erhalten, innere Knoten erhalten frische
    /// Schluessel. Liefert die neue Blatt-ID jedes Mitglieds.
    pub fn rebuild(&mut self) -> TreeResult<Vec<(MemberId, u32)>> {
        let mut eintraege = Vec::with_capacity(self.members.len());
        for h in self.leaves() {
            let node = self.node(h)?;
            if let Some(member) = node.member {
                eintraege.push((member, node.kek.clone()));
            }
        }

        for h in self.handles() {
            self.free(h);
        }
        self.members.clear();
        let kek = self.generator.gen_kek(NodeName::ROOT.id())?;
        self.root = self.allocate(Node::new(NodeName::ROOT, kek, None));

        let mut blaetter = Vec::with_capacity(eintraege.len());
        for (member, kek) in eintraege {
            let outcome = self.insert(member, kek)?;
            blaetter.push((member, outcome.leaf));
        }
        // IDs erst am Ende lesen, spaetere Inserts benennen Blaetter um
        let mut zuordnung = Vec::with_capacity(blaetter.len());
        for (member, h) in blaetter {
            zuordnung.push((member, self.node(h)?.id()));
        }
        Ok(zuordnung)
    }

    fn replace_child(
        &mut self,
        parent: Option<NodeHandle>,
        alt: NodeHandle,
        neu: NodeHandle,
    ) -> TreeResult<()> {
        let Some(parent) = parent else {
            self.root = neu;
            return Ok(());
        };
        let p = self.node_mut(parent)?;
        if p.left == Some(alt) {
            p.left = Some(neu);
        } else if p.right == Some(alt) {
            p.right = Some(neu);
        } else {
            return Err(TreeError::Inkonsistent(
                "Kind nicht unter dem Elternknoten".into(),
            ));
        }
        Ok(())
    }

    fn rename_subtree(&mut self, handle: NodeHandle, name: NodeName) -> TreeResult<()> {
        let mut stapel = vec![(handle, name)];
        while let Some((h, name)) = stapel.pop() {
            let node = self.node_mut(h)?;
            node.rename(name);
            if let Some((l, r)) = node.children() {
                stapel.push((l, name.left_child()?));
                stapel.push((r, name.right_child()?));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Selbstpruefung
    // -----------------------------------------------------------------------

    /// Prueft die strukturellen Invarianten des Baums
    pub fn validate(&self) -> TreeResult<()> {
        let fehler = |s: String| Err(TreeError::Inkonsistent(s));

        let wurzel = self.node(self.root)?;
        if wurzel.parent.is_some() || wurzel.name != NodeName::ROOT {
            return fehler("Wurzel hat Elternknoten oder falschen Namen".into());
        }

        let mut gesehen = HashSet::new();
        let mut blatt_mitglieder = 0usize;
        let mut stapel = vec![self.root];
        while let Some(h) = stapel.pop() {
            if !gesehen.insert(h) {
                return fehler(format!("Knoten mehrfach erreichbar: {:?}", h));
            }
            let node = self.node(h)?;
            if node.kek.id != node.name.id() {
                return fehler(format!(
                    "KEK-ID {} passt nicht zu {}",
                    node.kek.id, node.name
                ));
            }
            match (node.left, node.right) {
                (Some(l), Some(r)) => {
                    if node.member.is_some() {
                        return fehler(format!("Innerer Knoten {} mit Mitglied", node.name));
                    }
                    for (kind, erwartet) in [(l, node.name.left_child()?), (r, node.name.right_child()?)] {
                        let k = self.node(kind)?;
                        if k.parent != Some(h) || k.name != erwartet {
                            return fehler(format!("Kind von {} falsch verknuepft", node.name));
                        }
                        stapel.push(kind);
                    }
                }
                (None, None) => match node.member {
                    Some(m) => {
                        if self.members.get(&m) != Some(&h) {
                            return fehler(format!("Mitglied {} nicht registriert", m));
                        }
                        blatt_mitglieder += 1;
                    }
                    None if h == self.root && self.members.is_empty() => {}
                    None => return fehler(format!("Leeres Blatt {}", node.name)),
                },
                _ => return fehler(format!("Knoten {} mit nur einem Kind", node.name)),
            }
        }

        if blatt_mitglieder != self.members.len() {
            return fehler("Mitgliederzahl stimmt nicht".into());
        }
        if gesehen.len() != self.node_count() {
            return fehler("Unerreichbare Knoten in der Arena".into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
