//! Schluesselspeicher eines Mitglieds
//!
//! [`StoredKeys`] haelt den Schluesselpfad vom eigenen Blatt bis zur Wurzel
//! und verarbeitet Rekey-Pakete. Ein Paket wird auf einer Kopie
//! angewendet und nur bei Erfolg uebernommen, die Anwendung sieht also nie
//! einen halb aktualisierten Pfad.
//!
//! Vor jedem Schluesselupdate werden die strukturellen Operationen des
//! Pakets abgespielt. So folgen die gespeicherten IDs dem Baum des Servers.
//! Taucht das eigene Blatt in einer Entfernung auf, ist das Mitglied
//! ausgeschlossen.
//!
//! Ein aufgeteiltes Paket kommt in mehreren Teilen gleichen Typs. Eintraege,
//! die noch nicht entschluesselbar sind, wandern in den naechsten Teil.

use std::collections::BTreeMap;

use tracing::{debug, trace, warn};

use lkhcast_core::{AlgorithmVersion, GroupEvent, MemberId};
use lkhcast_crypto::{blind, node_mask, xor, CipherSuite, Kek, KeyKind, SymmetricKey};
use lkhcast_protocol::{KeyEntry, PacketType, RekeyPacket, TreeOp};

use crate::error::{ClientError, ClientResult};

/// IDs vom Blatt bis zur Wurzel
fn pfad(leaf: u32) -> Vec<u32> {
    let mut out = Vec::new();
    let mut id = leaf;
    while id >= 1 {
        out.push(id);
        id >>= 1;
    }
    out
}

fn verknuepfen(a: &SymmetricKey, b: &SymmetricKey) -> ClientResult<SymmetricKey> {
    xor(a, b).ok_or_else(|| ClientError::Inkonsistent("XOR ungleicher Schluessel".into()))
}

/// Offener Zustand eines aufgeteilten Pakets
#[derive(Debug, Clone)]
struct Uebertrag {
    typ: PacketType,
    eintraege: Vec<KeyEntry>,
    /// Single-Message: in dieser Runde schon rotiert
    rotiert: bool,
}

impl Uebertrag {
    fn neu(typ: PacketType) -> Self {
        Self {
            typ,
            eintraege: Vec::new(),
            rotiert: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredKeys {
    member: MemberId,
    version: AlgorithmVersion,
    suite: CipherSuite,
    /// Eigene Blatt-ID, `None` bis das eigene `Insert` eintrifft
    leaf: Option<u32>,
    /// Blatt-Schluessel aus dem Handshake, noch ohne Platz im Baum
    pending: Option<SymmetricKey>,
    keys: BTreeMap<u32, SymmetricKey>,
    /// Geblendete Geschwister-Schluessel (OFT)
    blinded: BTreeMap<u32, SymmetricKey>,
    /// Blatt-Schluessel noch nicht rotiert (Single-Message)
    frisch: bool,
    sek: Option<Kek>,
    aktiv: bool,
    uebertrag: Option<Uebertrag>,
}

impl StoredKeys {
    /// Startzustand nach dem Join: nur der eigene Blatt-KEK
    pub fn new(member: MemberId, version: AlgorithmVersion, leaf_kek: Kek) -> Self {
        Self {
            member,
            version,
            suite: leaf_kek.suite(),
            leaf: None,
            pending: Some(leaf_kek.key),
            keys: BTreeMap::new(),
            blinded: BTreeMap::new(),
            frisch: true,
            sek: None,
            aktiv: true,
            uebertrag: None,
        }
    }

    pub fn member(&self) -> MemberId {
        self.member
    }

    pub fn version(&self) -> AlgorithmVersion {
        self.version
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    pub fn leaf_id(&self) -> Option<u32> {
        self.leaf
    }

    /// `false` nach Ausschluss, Aufloesung oder Leave
    pub fn is_active(&self) -> bool {
        self.aktiv
    }

    pub fn current_sek(&self) -> Option<&Kek> {
        self.sek.as_ref()
    }

    pub fn key(&self, id: u32) -> Option<&SymmetricKey> {
        self.keys.get(&id)
    }

    pub fn root_key(&self) -> Option<&SymmetricKey> {
        self.keys.get(&1)
    }

    /// Gehaltene Pfad-Schluessel, aufsteigend nach ID
    pub fn keys(&self) -> impl Iterator<Item = (u32, &SymmetricKey)> {
        self.keys.iter().map(|(id, k)| (*id, k))
    }

    pub fn blinded_keys(&self) -> impl Iterator<Item = (u32, &SymmetricKey)> {
        self.blinded.iter().map(|(id, k)| (*id, k))
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Jeder Knoten vom Blatt bis zur Wurzel hat einen Schluessel
    pub fn path_complete(&self) -> bool {
        self.leaf
            .is_some_and(|leaf| pfad(leaf).iter().all(|id| self.keys.contains_key(id)))
    }

    /// Verwirft alle Schluessel
    pub fn clear(&mut self) {
        self.keys.clear();
        self.blinded.clear();
        self.pending = None;
        self.leaf = None;
        self.sek = None;
        self.aktiv = false;
        self.uebertrag = None;
    }

    /// Verarbeitet ein Rekey-Paket und liefert die ausgeloesten Events
    ///
    /// Bei einem Fehler bleibt der Speicher unveraendert.
    pub fn verarbeiten(&mut self, packet: &RekeyPacket) -> ClientResult<Vec<GroupEvent>> {
        if !self.aktiv {
            return Ok(Vec::new());
        }
        if packet.version != self.version {
            return Err(ClientError::FalscheVersion {
                erwartet: self.version,
                erhalten: packet.version,
            });
        }
        let mut arbeit = self.clone();
        let events = arbeit.anwenden(packet)?;
        *self = arbeit;
        Ok(events)
    }

    fn anwenden(&mut self, packet: &RekeyPacket) -> ClientResult<Vec<GroupEvent>> {
        match packet.packet_type {
            PacketType::Unbekannt(typ) => {
                warn!(typ, member_id = %self.member, "Unbekannter Pakettyp verworfen");
                return Ok(Vec::new());
            }
            PacketType::MulticastLeaving => return Ok(self.aufloesen(&packet.members)),
            PacketType::SekDistribution => {
                self.uebertrag = None;
                return self.sek_uebernehmen(&packet.entries);
            }
            _ => {}
        }

        let mut uebertrag = match self.uebertrag.take() {
            Some(u) if packet.fortsetzung && u.typ == packet.packet_type => u,
            _ => Uebertrag::neu(packet.packet_type),
        };

        let vorher = (self.leaf, self.keys.clone());
        if let Some(verworfen) = self.ops_anwenden(&packet.ops)? {
            return Ok(self.ausschliessen(verworfen));
        }

        let mut entries = std::mem::take(&mut uebertrag.eintraege);
        entries.extend(packet.entries.iter().cloned());

        let rest = match packet.packet_type {
            PacketType::KekAncestors | PacketType::KekSingleMessageAdd => {
                self.vorfahren_entschluesseln(&entries)
            }
            PacketType::KekOft => self.oft_verarbeiten(&entries)?,
            PacketType::KekSingleMessage if uebertrag.rotiert => Vec::new(),
            PacketType::KekSingleMessage => {
                if self.rotieren(&packet.seed, &entries, packet.weitere)? {
                    uebertrag.rotiert = true;
                    Vec::new()
                } else {
                    entries
                        .into_iter()
                        .filter(|e| self.keys.contains_key(&e.enc_id))
                        .collect()
                }
            }
            _ => Vec::new(),
        };

        if packet.weitere {
            trace!(typ = %packet.packet_type, offen = rest.len(), "Weitere Teile erwartet");
            uebertrag.eintraege = rest;
            self.uebertrag = Some(uebertrag);
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        let geaendert = (self.leaf, &self.keys) != (vorher.0, &vorher.1) || packet.fortsetzung;
        if geaendert && self.path_complete() {
            events.push(GroupEvent::BaumAktualisiert {
                schluessel: self.keys.len(),
            });
        }
        trace!(
            typ = %packet.packet_type,
            leaf = ?self.leaf,
            schluessel = self.keys.len(),
            "Paket angewendet"
        );
        Ok(events)
    }

    // -----------------------------------------------------------------------
    // Struktur
    // -----------------------------------------------------------------------

    /// Spielt die Operationen ab, `Some(blatt)` wenn das eigene Blatt entfiel
    fn ops_anwenden(&mut self, ops: &[TreeOp]) -> ClientResult<Option<u32>> {
        for op in ops {
            if let Some(leaf) = self.leaf {
                match op {
                    TreeOp::Remove { leaf: entfernt } if *entfernt == leaf => {
                        return Ok(Some(leaf));
                    }
                    TreeOp::Rebuild { assignments } => {
                        let Some(&(_, neu)) = assignments.iter().find(|(m, _)| *m == self.member)
                        else {
                            return Ok(Some(leaf));
                        };
                        let blatt = self
                            .keys
                            .remove(&leaf)
                            .ok_or(ClientError::SchluesselFehlt(leaf))?;
                        self.keys.clear();
                        self.blinded.clear();
                        self.keys.insert(neu, blatt);
                        self.leaf = Some(neu);
                        continue;
                    }
                    _ => {}
                }
                self.umbenennen(op, leaf)?;
            }

            if let TreeOp::Insert { at, member } = op {
                if *member == self.member {
                    if self.leaf.is_some() {
                        return Err(ClientError::Inkonsistent("eigenes Insert doppelt".into()));
                    }
                    let id = TreeOp::placed_leaf(*at)
                        .ok_or_else(|| ClientError::UngueltigesPaket(format!("Insert bei {}", at)))?;
                    let key = self
                        .pending
                        .take()
                        .ok_or_else(|| ClientError::Inkonsistent("kein Blatt-Schluessel".into()))?;
                    self.keys.insert(id, key);
                    self.leaf = Some(id);
                    debug!(member_id = %self.member, leaf = id, "Eigenes Blatt platziert");
                }
            }
        }
        self.beschneiden();
        Ok(None)
    }

    fn umbenennen(&mut self, op: &TreeOp, leaf: u32) -> ClientResult<()> {
        let neu = op
            .rename(leaf)
            .ok_or_else(|| ClientError::Inkonsistent(format!("Blatt {} verschwunden", leaf)))?;
        self.leaf = Some(neu);
        self.keys = std::mem::take(&mut self.keys)
            .into_iter()
            .filter_map(|(id, k)| op.rename(id).map(|n| (n, k)))
            .collect();
        self.blinded = std::mem::take(&mut self.blinded)
            .into_iter()
            .filter_map(|(id, k)| op.rename(id).map(|n| (n, k)))
            .collect();
        Ok(())
    }

    /// Behaelt nur Pfad-Schluessel und geblendete Geschwister des Pfads
    fn beschneiden(&mut self) {
        let Some(leaf) = self.leaf else { return };
        let pfad = pfad(leaf);
        self.keys.retain(|id, _| pfad.contains(id));
        self.blinded
            .retain(|id, _| *id > 1 && pfad.contains(&(id ^ 1)));
    }

    fn ausschliessen(&mut self, leaf: u32) -> Vec<GroupEvent> {
        warn!(member_id = %self.member, leaf, "Eigenes Blatt entfernt, Mitglied ausgeschlossen");
        self.clear();
        vec![
            GroupEvent::KnotenVerworfen {
                knoten_id: leaf,
                member_id: Some(self.member),
            },
            GroupEvent::AusZustand {
                member_id: Some(self.member),
            },
        ]
    }

    fn aufloesen(&mut self, members: &[MemberId]) -> Vec<GroupEvent> {
        if !members.is_empty() && !members.contains(&self.member) {
            return Vec::new();
        }
        debug!(member_id = %self.member, "Gruppe aufgeloest");
        self.clear();
        vec![GroupEvent::AusZustand {
            member_id: Some(self.member),
        }]
    }

    // -----------------------------------------------------------------------
    // Schluessel
    // -----------------------------------------------------------------------

    /// LKH: Vorfahren-Schluessel unter gehaltenen Kind-Schluesseln
    ///
    /// Liefert die Eintraege des eigenen Pfads, die offen geblieben sind.
    fn vorfahren_entschluesseln(&mut self, entries: &[KeyEntry]) -> Vec<KeyEntry> {
        let Some(leaf) = self.leaf else {
            return Vec::new();
        };
        let pfad = pfad(leaf);
        let mut offen: Vec<&KeyEntry> = entries
            .iter()
            .filter(|e| {
                pfad.contains(&e.enc_id)
                    && e.target_id()
                        .is_some_and(|t| t < e.enc_id && pfad.contains(&t))
            })
            .collect();

        // Reihenfolge im Paket ist tiefste zuerst, Fehlschlaege werden nach
        // jedem Fortschritt erneut versucht
        loop {
            let mut fortschritt = false;
            offen.retain(|e| {
                let Some(huelle) = self.keys.get(&e.enc_id) else {
                    return true;
                };
                match Kek::from_bytes(huelle, &e.kek) {
                    Ok(kek) if kek.kind == KeyKind::Kek => {
                        self.keys.insert(kek.id, kek.key);
                        fortschritt = true;
                        false
                    }
                    Ok(kek) => {
                        debug!(art = ?kek.kind, "Unerwartete Schluesselart verworfen");
                        false
                    }
                    Err(_) => true,
                }
            });
            if !fortschritt {
                break;
            }
        }
        offen.into_iter().cloned().collect()
    }

    /// OFT: Blatt-Auffrischung, geblendete Geschwister, Pfad neu berechnen
    fn oft_verarbeiten(&mut self, entries: &[KeyEntry]) -> ClientResult<Vec<KeyEntry>> {
        let Some(leaf) = self.leaf else {
            return Ok(Vec::new());
        };
        let pfad = pfad(leaf);
        let mut offen: Vec<&KeyEntry> = entries.iter().filter(|e| pfad.contains(&e.enc_id)).collect();

        loop {
            let mut fortschritt = false;
            offen.retain(|e| {
                let Some(ziel) = e.target_id() else {
                    return false;
                };
                let Some(huelle) = self.keys.get(&e.enc_id) else {
                    return true;
                };
                let Ok(kek) = Kek::from_bytes(huelle, &e.kek) else {
                    return true;
                };
                match kek.kind {
                    KeyKind::Kek if ziel == leaf && e.enc_id == leaf => {
                        self.keys.insert(leaf, kek.key);
                    }
                    KeyKind::Blinded if ziel > 1 && pfad.contains(&(ziel ^ 1)) => {
                        self.blinded.insert(ziel, kek.key);
                    }
                    andere => {
                        debug!(art = ?andere, ziel, "OFT-Eintrag ignoriert");
                    }
                }
                fortschritt = true;
                false
            });
            if self.oft_pfad_berechnen()? {
                fortschritt = true;
            }
            if !fortschritt {
                break;
            }
        }
        Ok(offen.into_iter().cloned().collect())
    }

    /// Berechnet die inneren Pfad-Schluessel aus Blatt und Geschwister-Blinds
    ///
    /// Fehlt ein Blind, werden alle Schluessel oberhalb verworfen.
    fn oft_pfad_berechnen(&mut self) -> ClientResult<bool> {
        let Some(leaf) = self.leaf else {
            return Ok(false);
        };
        let Some(mut k) = self.keys.get(&leaf).cloned() else {
            return Ok(false);
        };
        let mut id = leaf;
        let mut geaendert = false;
        while id > 1 {
            let Some(geschwister) = self.blinded.get(&(id ^ 1)) else {
                let luecke = id;
                let vorher = self.keys.len();
                self.keys.retain(|k, _| *k >= luecke);
                return Ok(geaendert || self.keys.len() != vorher);
            };
            let eltern = verknuepfen(&blind(&k), geschwister)?;
            id >>= 1;
            if self.keys.get(&id) != Some(&eltern) {
                self.keys.insert(id, eltern.clone());
                geaendert = true;
            }
            k = eltern;
        }
        Ok(geaendert)
    }

    /// Single-Message: R aus einem Ueberdeckungs-Eintrag, dann Rotation
    ///
    /// `false` wenn R fehlt, aber noch weitere Teile folgen.
    fn rotieren(&mut self, seed: &[u8], entries: &[KeyEntry], weitere: bool) -> ClientResult<bool> {
        let Some(leaf) = self.leaf else {
            return Ok(true);
        };
        let rotierbar: Vec<u32> = self
            .keys
            .keys()
            .copied()
            .filter(|id| !(self.frisch && *id == leaf))
            .collect();
        if rotierbar.is_empty() {
            self.frisch = false;
            return Ok(true);
        }

        let mut r = None;
        for e in entries.iter().filter(|e| rotierbar.contains(&e.enc_id)) {
            let Some(huelle) = self.keys.get(&e.enc_id) else {
                continue;
            };
            match Kek::from_bytes(huelle, &e.kek) {
                Ok(x) if x.kind == KeyKind::Random => {
                    r = Some(verknuepfen(&x.key, &node_mask(seed, e.enc_id, huelle))?);
                    break;
                }
                _ => continue,
            }
        }
        let r = match r {
            Some(r) => r,
            None if weitere => return Ok(false),
            None => return Err(ClientError::KeinZufallswert),
        };

        for id in rotierbar {
            let Some(k) = self.keys.get(&id) else { continue };
            let neu = verknuepfen(&verknuepfen(k, &node_mask(seed, id, k))?, &r)?;
            self.keys.insert(id, neu);
        }
        self.frisch = false;
        Ok(true)
    }

    fn sek_uebernehmen(&mut self, entries: &[KeyEntry]) -> ClientResult<Vec<GroupEvent>> {
        let entry = entries
            .first()
            .ok_or_else(|| ClientError::UngueltigesPaket("SEK-Paket ohne Eintrag".into()))?;
        if entry.enc_id != 1 {
            return Err(ClientError::UngueltigesPaket(format!(
                "SEK unter Knoten {}",
                entry.enc_id
            )));
        }
        let Some(wurzel) = self.keys.get(&1) else {
            // Noch nicht im Baum
            return Ok(Vec::new());
        };
        let sek = Kek::from_bytes(wurzel, &entry.kek)?;
        if sek.kind != KeyKind::Sek {
            return Err(ClientError::UngueltigesPaket(format!(
                "Schluesselart {:?} statt SEK",
                sek.kind
            )));
        }
        debug!(member_id = %self.member, sek_id = sek.id, "Neuer SEK");
        let event = GroupEvent::NeuerSek {
            key_id: sek.id,
            tag: sek.tag().to_u32(),
            schluessel: sek.key.secret().clone(),
        };
        self.sek = Some(sek);
        Ok(vec![event])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lkhcast_crypto::KeyGenerator;

    fn generator() -> KeyGenerator {
        KeyGenerator::new(CipherSuite::Aes256Gcm)
    }

    fn speicher(member: u32) -> (StoredKeys, Kek) {
        let kek = generator().gen_kek(1).unwrap();
        let store = StoredKeys::new(MemberId(member), AlgorithmVersion::Simple, kek.clone());
        (store, kek)
    }

    fn paket(typ: PacketType) -> RekeyPacket {
        RekeyPacket::new(typ, AlgorithmVersion::Simple)
    }

    #[test]
    fn pfad_bis_zur_wurzel() {
        assert_eq!(pfad(1), vec![1]);
        assert_eq!(pfad(11), vec![11, 5, 2, 1]);
    }

    #[test]
    fn eigenes_insert_platziert_blatt() {
        let (mut store, kek) = speicher(100);
        let p = paket(PacketType::KekAncestors).with_ops(vec![TreeOp::Insert {
            at: 0,
            member: MemberId(100),
        }]);
        let events = store.verarbeiten(&p).unwrap();
        assert_eq!(store.leaf_id(), Some(1));
        assert_eq!(store.root_key(), Some(&kek.key));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "TREE_UPDATED");
    }

    #[test]
    fn fremde_operationen_vor_dem_eigenen_insert() {
        let (mut store, _) = speicher(101);
        let p = paket(PacketType::KekAncestors).with_ops(vec![TreeOp::Insert {
            at: 0,
            member: MemberId(100),
        }]);
        assert!(store.verarbeiten(&p).unwrap().is_empty());
        assert_eq!(store.leaf_id(), None);

        let p = paket(PacketType::KekAncestors).with_ops(vec![TreeOp::Insert {
            at: 1,
            member: MemberId(101),
        }]);
        store.verarbeiten(&p).unwrap();
        assert_eq!(store.leaf_id(), Some(3));
    }

    #[test]
    fn falsche_version_laesst_speicher_unveraendert() {
        let (mut store, _) = speicher(100);
        let p = RekeyPacket::new(PacketType::KekAncestors, AlgorithmVersion::Oft).with_ops(vec![
            TreeOp::Insert {
                at: 0,
                member: MemberId(100),
            },
        ]);
        assert!(matches!(
            store.verarbeiten(&p),
            Err(ClientError::FalscheVersion { .. })
        ));
        assert_eq!(store.leaf_id(), None);
    }

    #[test]
    fn vorfahren_werden_entschluesselt() {
        let (mut store, kek) = speicher(100);
        store
            .verarbeiten(&paket(PacketType::KekAncestors).with_ops(vec![TreeOp::Insert {
                at: 0,
                member: MemberId(100),
            }]))
            .unwrap();

        // Zweites Mitglied: Blatt 1 -> 2, neue Wurzel unter k_2
        let wurzel = generator().gen_kek(1).unwrap();
        let eintrag = KeyEntry::new(2, wurzel.to_bytes(&kek.key).unwrap());
        let p = paket(PacketType::KekAncestors)
            .with_ops(vec![TreeOp::Insert {
                at: 1,
                member: MemberId(101),
            }])
            .with_entries(vec![eintrag]);
        store.verarbeiten(&p).unwrap();
        assert_eq!(store.leaf_id(), Some(2));
        assert_eq!(store.root_key(), Some(&wurzel.key));
        assert!(store.path_complete());
    }

    #[test]
    fn offene_eintraege_wandern_in_den_naechsten_teil() {
        let (mut store, kek) = speicher(100);
        store
            .verarbeiten(&paket(PacketType::KekAncestors).with_ops(vec![TreeOp::Insert {
                at: 0,
                member: MemberId(100),
            }]))
            .unwrap();

        // Eigenes Blatt 1 -> 2 -> 4, neue Schluessel fuer 2 und 1
        let k2 = generator().gen_kek(2).unwrap();
        let k1 = generator().gen_kek(1).unwrap();
        let mut teil1 = paket(PacketType::KekAncestors)
            .with_ops(vec![
                TreeOp::Insert {
                    at: 1,
                    member: MemberId(101),
                },
                TreeOp::Insert {
                    at: 2,
                    member: MemberId(102),
                },
            ])
            .with_entries(vec![KeyEntry::new(2, k1.to_bytes(&k2.key).unwrap())]);
        teil1.weitere = true;
        let mut teil2 = paket(PacketType::KekAncestors)
            .with_entries(vec![KeyEntry::new(4, k2.to_bytes(&kek.key).unwrap())]);
        teil2.fortsetzung = true;

        assert!(store.verarbeiten(&teil1).unwrap().is_empty());
        assert_eq!(store.leaf_id(), Some(4));
        assert!(store.root_key().is_none());

        let events = store.verarbeiten(&teil2).unwrap();
        assert_eq!(store.key(2), Some(&k2.key));
        assert_eq!(store.root_key(), Some(&k1.key));
        assert!(store.path_complete());
        assert_eq!(events[0].name(), "TREE_UPDATED");
    }

    #[test]
    fn entfernung_des_eigenen_blatts_schliesst_aus() {
        let (mut store, _) = speicher(100);
        store
            .verarbeiten(&paket(PacketType::KekAncestors).with_ops(vec![
                TreeOp::Insert {
                    at: 0,
                    member: MemberId(100),
                },
                TreeOp::Insert {
                    at: 1,
                    member: MemberId(101),
                },
            ]))
            .unwrap();
        assert_eq!(store.leaf_id(), Some(2));

        let p = paket(PacketType::KekAncestors).with_ops(vec![TreeOp::Remove { leaf: 2 }]);
        let events = store.verarbeiten(&p).unwrap();
        let namen: Vec<_> = events.iter().map(GroupEvent::name).collect();
        assert_eq!(namen, vec!["DISCARD_NODE", "OFF_STATE"]);
        assert!(!store.is_active());
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn aufloesung_nur_fuer_betroffene() {
        let (mut store, _) = speicher(100);
        let p = paket(PacketType::MulticastLeaving).with_members(vec![MemberId(7)]);
        assert!(store.verarbeiten(&p).unwrap().is_empty());
        assert!(store.is_active());

        let p = paket(PacketType::MulticastLeaving);
        let events = store.verarbeiten(&p).unwrap();
        assert_eq!(events[0].name(), "OFF_STATE");
        assert!(!store.is_active());
    }

    #[test]
    fn unbekannter_typ_wird_ignoriert() {
        let (mut store, _) = speicher(100);
        let p = paket(PacketType::Unbekannt(42));
        assert!(store.verarbeiten(&p).unwrap().is_empty());
        assert!(store.is_active());
    }

    #[test]
    fn sek_unter_wurzel() {
        let (mut store, kek) = speicher(100);
        store
            .verarbeiten(&paket(PacketType::KekAncestors).with_ops(vec![TreeOp::Insert {
                at: 0,
                member: MemberId(100),
            }]))
            .unwrap();
        let sek = generator().gen_sek(3).unwrap();
        let p = paket(PacketType::SekDistribution)
            .with_entries(vec![KeyEntry::new(1, sek.to_bytes(&kek.key).unwrap())]);
        let events = store.verarbeiten(&p).unwrap();
        assert_eq!(events[0].name(), "NEW_SEK");
        assert_eq!(store.current_sek(), Some(&sek));
    }

    #[test]
    fn sek_mit_falschem_schluessel_wird_verworfen() {
        let (mut store, _) = speicher(100);
        store
            .verarbeiten(&paket(PacketType::KekAncestors).with_ops(vec![TreeOp::Insert {
                at: 0,
                member: MemberId(100),
            }]))
            .unwrap();
        let fremd = generator().random_key().unwrap();
        let sek = generator().gen_sek(3).unwrap();
        let p = paket(PacketType::SekDistribution)
            .with_entries(vec![KeyEntry::new(1, sek.to_bytes(&fremd).unwrap())]);
        assert!(store.verarbeiten(&p).is_err());
        assert!(store.current_sek().is_none());
        assert!(store.is_active());
    }
}
