//! Rekey-Pakete (Multicast)
//!
//! ## Paketformat
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       1   PacketType
//!  1       1   Algorithmus-Version
//!  2       1   Flags: 0x01 weitere Teile folgen, 0x02 Fortsetzung
//!  3       2   Anzahl Operationen
//!  ...         Operationen: [tag u8] + Nutzdaten
//!                1 Insert   [at u32][member u32]
//!                2 Remove   [leaf u32]
//!                3 Rebuild  [n u16] n * ([member u32][leaf u32])
//!  ...     2   Anzahl Eintraege
//!  ...         Eintraege: [enc_id u32][kek_len u16][KEK-Segment]
//!  ...     2   Seed-Laenge, danach Seed (nur Single-Message)
//!  ...     2   Anzahl Mitglieder, danach [member u32]* (nur MULTICAST_LEAVING)
//! ```
//!
//! `enc_id` ist die Knoten-ID des Schluessels mit dem das Segment
//! verschluesselt wurde. Das Segment selbst traegt die Ziel-ID im Klartext.
//!
//! ## Aufteilung
//! Passt ein Paket nicht in ein Datagramm, verteilt [`RekeyPacket::aufteilen`]
//! die Eintraege auf mehrere Pakete desselben Typs. Nur das erste traegt
//! Operationen und Mitglieder, der Seed steht in jedem Teil.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};
use lkhcast_core::{AlgorithmVersion, MemberId};

/// Minimale Paketgroesse: Header + leere Listen
pub const MIN_PAKET_LAENGE: usize = 5 + 2 + 2 + 2;

/// Groesste Paketlaenge, passt in ein IPv4-UDP-Datagramm
pub const MAX_PAKET_LAENGE: usize = 65_507;

const FLAG_WEITERE: u8 = 0x01;
const FLAG_FORTSETZUNG: u8 = 0x02;

// ---------------------------------------------------------------------------
// PacketType
// ---------------------------------------------------------------------------

/// Art eines Rekey-Pakets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Neuer SEK, verschluesselt unter dem Wurzelschluessel
    SekDistribution,
    /// Gruppe aufgeloest bzw. Mitglieder ausgeschlossen
    MulticastLeaving,
    /// Blacklist der Single-Message-Varianten (nur Operationen)
    SimpleMessageRemove,
    KekOft,
    KekSingleMessage,
    KekSingleMessageAdd,
    /// Standard-LKH: neue Vorfahren-Schluessel
    KekAncestors,
    /// Unbekannter Diskriminator, wird verworfen
    Unbekannt(u8),
}

impl PacketType {
    pub fn from_u8(byte: u8) -> Self {
        match byte {
            1 => Self::SekDistribution,
            2 => Self::MulticastLeaving,
            3 => Self::SimpleMessageRemove,
            4 => Self::KekOft,
            5 => Self::KekSingleMessage,
            6 => Self::KekSingleMessageAdd,
            7 => Self::KekAncestors,
            andere => Self::Unbekannt(andere),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::SekDistribution => 1,
            Self::MulticastLeaving => 2,
            Self::SimpleMessageRemove => 3,
            Self::KekOft => 4,
            Self::KekSingleMessage => 5,
            Self::KekSingleMessageAdd => 6,
            Self::KekAncestors => 7,
            Self::Unbekannt(b) => b,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SekDistribution => "SEK_DISTRIBUTION",
            Self::MulticastLeaving => "MULTICAST_LEAVING",
            Self::SimpleMessageRemove => "SIMPLE_MESSAGE_REMOVE",
            Self::KekOft => "KEK_OFT",
            Self::KekSingleMessage => "KEK_SINGLEMESSAGE",
            Self::KekSingleMessageAdd => "KEK_SINGLEMESSAGE_ADD",
            Self::KekAncestors => "KEK_ANCESTORS",
            Self::Unbekannt(_) => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// TreeOp
// ---------------------------------------------------------------------------

const OP_INSERT: u8 = 1;
const OP_REMOVE: u8 = 2;
const OP_REBUILD: u8 = 3;

/// Strukturelle Aenderung am Schluesselbaum
///
/// Clients spielen die Operationen in Reihenfolge ab, um die IDs der
/// eigenen Pfad-Schluessel nachzufuehren.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeOp {
    /// Blatt `at` wandert nach `2*at`, `member` erhaelt `2*at+1`.
    /// `at == 0` bedeutet: der Baum war leer, `member` sitzt in der Wurzel.
    Insert { at: u32, member: MemberId },
    /// Blatt und Elternknoten entfallen, der Geschwister-Teilbaum ruckt
    /// eine Ebene nach oben
    Remove { leaf: u32 },
    /// Neuaufbau: jedes Mitglied erhaelt ein neues Blatt
    Rebuild { assignments: Vec<(MemberId, u32)> },
}

impl TreeOp {
    /// Blatt-ID des Mitglieds das durch `Insert` platziert wird
    pub fn placed_leaf(at: u32) -> Option<u32> {
        if at == 0 {
            Some(1)
        } else {
            at.checked_mul(2)?.checked_add(1)
        }
    }

    /// Neue ID eines Knotens nach dieser Operation
    ///
    /// `None` heisst: der Knoten existiert nicht mehr. `Rebuild` verwirft
    /// alle bisherigen IDs.
    pub fn rename(&self, id: u32) -> Option<u32> {
        match self {
            Self::Insert { at, .. } => {
                if *at != 0 && id == *at {
                    at.checked_mul(2)
                } else {
                    Some(id)
                }
            }
            Self::Remove { leaf } => {
                if *leaf <= 1 {
                    return if id == 1 { None } else { Some(id) };
                }
                let eltern = leaf >> 1;
                let geschwister = leaf ^ 1;
                if id == *leaf || id == eltern {
                    return None;
                }
                match teilbaum_tiefe(geschwister, id) {
                    Some(d) => {
                        let rest = id - (geschwister << d);
                        Some((eltern << d) | rest)
                    }
                    None => Some(id),
                }
            }
            Self::Rebuild { .. } => None,
        }
    }

    fn kodierte_laenge(&self) -> usize {
        match self {
            Self::Insert { .. } => 9,
            Self::Remove { .. } => 5,
            Self::Rebuild { assignments } => 3 + assignments.len() * 8,
        }
    }

    fn encode(&self, buf: &mut BytesMut) -> ProtocolResult<()> {
        match self {
            Self::Insert { at, member } => {
                buf.put_u8(OP_INSERT);
                buf.put_u32(*at);
                buf.put_u32(member.inner());
            }
            Self::Remove { leaf } => {
                buf.put_u8(OP_REMOVE);
                buf.put_u32(*leaf);
            }
            Self::Rebuild { assignments } => {
                buf.put_u8(OP_REBUILD);
                buf.put_u16(laenge_u16("rebuild", assignments.len())?);
                for (member, leaf) in assignments {
                    buf.put_u32(member.inner());
                    buf.put_u32(*leaf);
                }
            }
        }
        Ok(())
    }

    fn decode(buf: &mut &[u8]) -> ProtocolResult<Self> {
        benoetigt(buf, "op_tag", 1)?;
        match buf.get_u8() {
            OP_INSERT => {
                benoetigt(buf, "insert", 8)?;
                let at = buf.get_u32();
                let member = MemberId(buf.get_u32());
                Ok(Self::Insert { at, member })
            }
            OP_REMOVE => {
                benoetigt(buf, "remove", 4)?;
                Ok(Self::Remove {
                    leaf: buf.get_u32(),
                })
            }
            OP_REBUILD => {
                benoetigt(buf, "rebuild_anzahl", 2)?;
                let n = buf.get_u16() as usize;
                benoetigt(buf, "rebuild", n * 8)?;
                let assignments = (0..n)
                    .map(|_| (MemberId(buf.get_u32()), buf.get_u32()))
                    .collect();
                Ok(Self::Rebuild { assignments })
            }
            andere => Err(ProtocolError::UnbekannteOperation(andere)),
        }
    }
}

/// Abstand von `wurzel` zu `id`, falls `id` im Teilbaum von `wurzel` liegt
fn teilbaum_tiefe(wurzel: u32, id: u32) -> Option<u32> {
    if wurzel == 0 || id < wurzel {
        return None;
    }
    let d = wurzel.leading_zeros() - id.leading_zeros();
    if id >> d == wurzel {
        Some(d)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// KeyEntry
// ---------------------------------------------------------------------------

/// Ein verschluesseltes KEK-Segment samt ID des Huellschluessels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub enc_id: u32,
    pub kek: Vec<u8>,
}

impl KeyEntry {
    pub fn new(enc_id: u32, kek: Vec<u8>) -> Self {
        Self { enc_id, kek }
    }

    /// Ziel-ID aus dem Klartext-Header des Segments
    pub fn target_id(&self) -> Option<u32> {
        let kopf = self.kek.get(..4)?;
        Some(u32::from_be_bytes([kopf[0], kopf[1], kopf[2], kopf[3]]))
    }
}

// ---------------------------------------------------------------------------
// RekeyPacket
// ---------------------------------------------------------------------------

/// Vollstaendiges Rekey-Paket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RekeyPacket {
    pub packet_type: PacketType,
    pub version: AlgorithmVersion,
    pub ops: Vec<TreeOp>,
    pub entries: Vec<KeyEntry>,
    /// Gruppen-Seed der Single-Message-Varianten (im Klartext)
    pub seed: Vec<u8>,
    /// Zielmitglieder von MULTICAST_LEAVING, leer = ganze Gruppe
    pub members: Vec<MemberId>,
    /// Weitere Teile derselben Runde folgen
    pub weitere: bool,
    /// Setzt den vorherigen Teil gleichen Typs fort
    pub fortsetzung: bool,
}

impl RekeyPacket {
    pub fn new(packet_type: PacketType, version: AlgorithmVersion) -> Self {
        Self {
            packet_type,
            version,
            ops: Vec::new(),
            entries: Vec::new(),
            seed: Vec::new(),
            members: Vec::new(),
            weitere: false,
            fortsetzung: false,
        }
    }

    pub fn with_ops(mut self, ops: Vec<TreeOp>) -> Self {
        self.ops = ops;
        self
    }

    pub fn with_entries(mut self, entries: Vec<KeyEntry>) -> Self {
        self.entries = entries;
        self
    }

    pub fn with_seed(mut self, seed: Vec<u8>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_members(mut self, members: Vec<MemberId>) -> Self {
        self.members = members;
        self
    }

    /// Serialisiert das Paket
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(self.kodierte_laenge());
        buf.put_u8(self.packet_type.as_u8());
        buf.put_u8(self.version.as_u8());
        let mut flags = 0;
        if self.weitere {
            flags |= FLAG_WEITERE;
        }
        if self.fortsetzung {
            flags |= FLAG_FORTSETZUNG;
        }
        buf.put_u8(flags);

        buf.put_u16(laenge_u16("ops", self.ops.len())?);
        for op in &self.ops {
            op.encode(&mut buf)?;
        }

        buf.put_u16(laenge_u16("entries", self.entries.len())?);
        for entry in &self.entries {
            buf.put_u32(entry.enc_id);
            buf.put_u16(laenge_u16("kek", entry.kek.len())?);
            buf.put_slice(&entry.kek);
        }

        buf.put_u16(laenge_u16("seed", self.seed.len())?);
        buf.put_slice(&self.seed);

        buf.put_u16(laenge_u16("members", self.members.len())?);
        for member in &self.members {
            buf.put_u32(member.inner());
        }

        Ok(buf.to_vec())
    }

    /// Deserialisiert ein Paket
    ///
    /// Unbekannte Pakettypen werden als `PacketType::Unbekannt` geliefert,
    /// eine unbekannte Version ist ein Fehler.
    pub fn decode(data: &[u8]) -> ProtocolResult<Self> {
        let mut buf = data;
        benoetigt(&buf, "header", 5)?;
        let packet_type = PacketType::from_u8(buf.get_u8());
        let version_byte = buf.get_u8();
        let version = AlgorithmVersion::from_u8(version_byte)
            .ok_or(ProtocolError::UnbekannteVersion(version_byte))?;
        let flags = buf.get_u8();

        let op_anzahl = buf.get_u16() as usize;
        let mut ops = Vec::with_capacity(op_anzahl.min(1024));
        for _ in 0..op_anzahl {
            ops.push(TreeOp::decode(&mut buf)?);
        }

        benoetigt(&buf, "entry_anzahl", 2)?;
        let entry_anzahl = buf.get_u16() as usize;
        let mut entries = Vec::with_capacity(entry_anzahl.min(1024));
        for _ in 0..entry_anzahl {
            benoetigt(&buf, "entry", 6)?;
            let enc_id = buf.get_u32();
            let len = buf.get_u16() as usize;
            benoetigt(&buf, "kek", len)?;
            let kek = buf[..len].to_vec();
            buf.advance(len);
            entries.push(KeyEntry { enc_id, kek });
        }

        benoetigt(&buf, "seed_laenge", 2)?;
        let seed_len = buf.get_u16() as usize;
        benoetigt(&buf, "seed", seed_len)?;
        let seed = buf[..seed_len].to_vec();
        buf.advance(seed_len);

        benoetigt(&buf, "member_anzahl", 2)?;
        let member_anzahl = buf.get_u16() as usize;
        benoetigt(&buf, "members", member_anzahl * 4)?;
        let members = (0..member_anzahl).map(|_| MemberId(buf.get_u32())).collect();

        if buf.has_remaining() {
            return Err(ProtocolError::UeberzaehligeBytes(buf.remaining()));
        }

        Ok(Self {
            packet_type,
            version,
            ops,
            entries,
            seed,
            members,
            weitere: flags & FLAG_WEITERE != 0,
            fortsetzung: flags & FLAG_FORTSETZUNG != 0,
        })
    }

    /// Laenge der Kodierung in Bytes
    pub fn kodierte_laenge(&self) -> usize {
        MIN_PAKET_LAENGE
            + self.ops.iter().map(TreeOp::kodierte_laenge).sum::<usize>()
            + self
                .entries
                .iter()
                .map(|e| 6 + e.kek.len())
                .sum::<usize>()
            + self.seed.len()
            + self.members.len() * 4
    }

    /// Teilt das Paket in Teile von hoechstens `max` Bytes
    ///
    /// Die Reihenfolge der Eintraege bleibt erhalten. Passen schon Header,
    /// Operationen oder ein einzelner Eintrag nicht, ist das ein Fehler.
    pub fn aufteilen(self, max: usize) -> ProtocolResult<Vec<RekeyPacket>> {
        if self.kodierte_laenge() <= max {
            return Ok(vec![self]);
        }

        let Self {
            packet_type,
            version,
            ops,
            entries,
            seed,
            members,
            ..
        } = self;
        let folgeteil = || RekeyPacket {
            fortsetzung: true,
            ..RekeyPacket::new(packet_type, version).with_seed(seed.clone())
        };

        let mut teile = Vec::new();
        let mut aktuell = RekeyPacket::new(packet_type, version)
            .with_ops(ops)
            .with_seed(seed.clone())
            .with_members(members);
        let mut laenge = aktuell.kodierte_laenge();
        if laenge > max {
            return Err(ProtocolError::PaketZuGross { laenge, max });
        }

        for entry in entries {
            let zusatz = 6 + entry.kek.len();
            if laenge + zusatz > max {
                if aktuell.fortsetzung && aktuell.entries.is_empty() {
                    return Err(ProtocolError::PaketZuGross {
                        laenge: laenge + zusatz,
                        max,
                    });
                }
                aktuell.weitere = true;
                teile.push(std::mem::replace(&mut aktuell, folgeteil()));
                laenge = aktuell.kodierte_laenge();
                if laenge + zusatz > max {
                    return Err(ProtocolError::PaketZuGross {
                        laenge: laenge + zusatz,
                        max,
                    });
                }
            }
            laenge += zusatz;
            aktuell.entries.push(entry);
        }
        teile.push(aktuell);
        Ok(teile)
    }
}

fn benoetigt(buf: &&[u8], feld: &'static str, erwartet: usize) -> ProtocolResult<()> {
    if buf.remaining() < erwartet {
        return Err(ProtocolError::Unvollstaendig {
            feld,
            erwartet,
            vorhanden: buf.remaining(),
        });
    }
    Ok(())
}

fn laenge_u16(feld: &'static str, anzahl: usize) -> ProtocolResult<u16> {
    u16::try_from(anzahl).map_err(|_| ProtocolError::ZuViele { feld, anzahl })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
