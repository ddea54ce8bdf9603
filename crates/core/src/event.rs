//! Event-Schnittstelle zur Anwendung
//!
//! Algorithmus (Server) und Client-Engine melden Zustandsaenderungen ueber
//! einen `EventSink`. Der Sink wird synchron im Kontext des Aufrufers
//! ausgefuehrt, auf dem Client also in der Empfangs-Loop. Ein Handler darf
//! dort nicht dauerhaft blockieren, sonst stockt die Paketverarbeitung.
//! Langsame Konsumenten reichen Events an einen eigenen Task weiter
//! (z.B. ueber einen Kanal-Sink).
//!
//! Ein Event wird nur erzeugt wenn sich tatsaechlich etwas geaendert hat.
//! Fehler laufen nie ueber den Event-Kanal, sondern ueber `Result`.

use serde::{Deserialize, Serialize};

use crate::types::{MemberId, SecretBytes};

/// Alle Ereignisse die an die Anwendung gemeldet werden
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupEvent {
    /// Neuer Session-Schluessel (SEK) verfuegbar
    NeuerSek {
        /// Generation des SEK (monoton steigend pro Server)
        key_id: u32,
        /// Typ-Tag (Cipher-Suite + Schluesselart)
        tag: u32,
        /// Schluesselmaterial, wird nie serialisiert
        #[serde(skip)]
        schluessel: SecretBytes,
    },
    /// Der Schluesselbaum wurde aktualisiert (Pfad vollstaendig)
    BaumAktualisiert {
        /// Anzahl der Schluessel auf dem eigenen Pfad (Client) bzw. im Baum (Server)
        schluessel: usize,
    },
    /// Beigetreten, aber noch ohne Session-Schluessel
    DummyZustand { member_id: MemberId },
    /// Gruppe verlassen oder Verbindung verloren, alle Schluessel geloescht
    AusZustand { member_id: Option<MemberId> },
    /// Ein Knoten wurde verworfen (Mitglied entfernt oder ausgeschlossen)
    KnotenVerworfen { knoten_id: u32, member_id: Option<MemberId> },
}

impl GroupEvent {
    /// Kurzname fuer Logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::NeuerSek { .. } => "NEW_SEK",
            Self::BaumAktualisiert { .. } => "TREE_UPDATED",
            Self::DummyZustand { .. } => "DUMMY_STATE",
            Self::AusZustand { .. } => "OFF_STATE",
            Self::KnotenVerworfen { .. } => "DISCARD_NODE",
        }
    }
}

/// Empfaenger fuer `GroupEvent`s
///
/// Wird synchron aufgerufen. Implementierungen muessen `Send + Sync` sein,
/// da Server-Handler und Client-Loop auf verschiedenen Tasks laufen.
pub trait EventSink: Send + Sync + 'static {
    /// Meldet ein Ereignis
    fn senden(&self, event: GroupEvent);
}

/// Closures koennen direkt als Sink verwendet werden
impl<F> EventSink for F
where
    F: Fn(GroupEvent) + Send + Sync + 'static,
{
    fn senden(&self, event: GroupEvent) {
        self(event)
    }
}

/// Sink der alle Ereignisse verwirft
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn senden(&self, _event: GroupEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn event_ist_serde_kompatibel_ohne_schluessel() {
        let event = GroupEvent::NeuerSek {
            key_id: 7,
            tag: 0x0001_0002,
            schluessel: SecretBytes::from_slice(&[0xAB; 32]),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("171"));
        let zurueck: GroupEvent = serde_json::from_str(&json).unwrap();
        match zurueck {
            GroupEvent::NeuerSek {
                key_id, schluessel, ..
            } => {
                assert_eq!(key_id, 7);
                assert!(schluessel.is_empty());
            }
            anders => panic!("Unerwartetes Event: {:?}", anders),
        }
    }

    #[test]
    fn closure_als_sink() {
        let gesammelt = Arc::new(Mutex::new(Vec::new()));
        let ziel = Arc::clone(&gesammelt);
        let sink = move |e: GroupEvent| ziel.lock().unwrap().push(e.name());

        sink.senden(GroupEvent::AusZustand { member_id: None });
        sink.senden(GroupEvent::DummyZustand {
            member_id: MemberId(100),
        });

        assert_eq!(*gesammelt.lock().unwrap(), vec!["OFF_STATE", "DUMMY_STATE"]);
    }
}
