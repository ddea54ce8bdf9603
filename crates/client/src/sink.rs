//! Kanal-Sink: reicht Events an einen eigenen Task weiter

use tokio::sync::mpsc;

use lkhcast_core::{EventSink, GroupEvent};

/// Leitet Events in einen unbegrenzten tokio-Kanal um
///
/// Die Empfangs-Loop blockiert dadurch nie auf einem langsamen Konsumenten.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<GroupEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GroupEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn senden(&self, event: GroupEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Event-Empfaenger geschlossen");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lkhcast_core::MemberId;

    #[tokio::test]
    async fn events_kommen_in_reihenfolge_an() {
        let (sink, mut rx) = ChannelSink::new();
        sink.senden(GroupEvent::DummyZustand {
            member_id: MemberId(100),
        });
        sink.senden(GroupEvent::AusZustand { member_id: None });
        assert_eq!(rx.recv().await.unwrap().name(), "DUMMY_STATE");
        assert_eq!(rx.recv().await.unwrap().name(), "OFF_STATE");
    }
}
