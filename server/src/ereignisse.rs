//! Protokolliert Gruppen-Events des Servers

use lkhcast_core::{EventSink, GroupEvent};

/// Schreibt jedes Event als JSON ins Log (Schluesselmaterial wird nie
/// serialisiert)
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn senden(&self, event: GroupEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::debug!(event = event.name(), daten = %json, "Gruppen-Event"),
            Err(e) => tracing::warn!(event = event.name(), fehler = %e, "Event nicht serialisierbar"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lkhcast_core::SecretBytes;

    #[test]
    fn sek_ohne_schluesselmaterial() {
        let event = GroupEvent::NeuerSek {
            key_id: 3,
            tag: 0x0001_0002,
            schluessel: SecretBytes::new(vec![0xAB; 32]),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"key_id\":3"));
        assert!(!json.contains("171"));
        LogSink.senden(event);
    }
}
