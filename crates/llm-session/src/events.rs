use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use llm_session_core::ProgressSink;
use llm_session_metrics::{GenerationMetrics, ImageMetrics};

/// Events emitted while a submission runs in the background.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Token { content: String },
    Progress { percent: u32 },
    EndOfTurn,
    Complete { metrics: GenerationMetrics },
    ImageComplete { metrics: ImageMetrics },
    Error { message: String },
}

/// Progress sink that forwards units into a channel.
///
/// Must run on a blocking thread. A dropped receiver is logged once and
/// generation continues without reporting.
pub struct ChannelSink {
    tx: mpsc::Sender<SessionEvent>,
    session_id: String,
    closed: bool,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<SessionEvent>, session_id: impl Into<String>) -> Self {
        Self {
            tx,
            session_id: session_id.into(),
            closed: false,
        }
    }

    pub fn send(&mut self, event: SessionEvent) {
        if self.closed {
            return;
        }
        if self.tx.blocking_send(event).is_err() {
            log::warn!(
                "[{}] Event receiver dropped, continuing without progress reporting",
                self.session_id
            );
            self.closed = true;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl ProgressSink for ChannelSink {
    fn on_unit(&mut self, text: &str) -> bool {
        self.send(SessionEvent::Token {
            content: text.to_string(),
        });
        false
    }

    fn on_complete(&mut self) {
        self.send(SessionEvent::EndOfTurn);
    }

    fn on_percent(&mut self, percent: u32) {
        self.send(SessionEvent::Progress { percent });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(SessionEvent::Token {
            content: "Hi".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "token");
        assert_eq!(json["content"], "Hi");

        let json = serde_json::to_value(SessionEvent::EndOfTurn).unwrap();
        assert_eq!(json["type"], "end_of_turn");
    }

    #[test]
    fn sink_forwards_units_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut sink = ChannelSink::new(tx, "s1");
        assert!(!sink.on_unit("Hello"));
        sink.on_complete();
        sink.on_percent(50);
        drop(sink);

        assert_eq!(
            rx.blocking_recv(),
            Some(SessionEvent::Token {
                content: "Hello".to_string()
            })
        );
        assert_eq!(rx.blocking_recv(), Some(SessionEvent::EndOfTurn));
        assert_eq!(rx.blocking_recv(), Some(SessionEvent::Progress { percent: 50 }));
        assert_eq!(rx.blocking_recv(), None);
    }

    #[test]
    fn dropped_receiver_does_not_stop_generation() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut sink = ChannelSink::new(tx, "s1");
        assert!(!sink.on_unit("ignored"));
        assert!(sink.is_closed());
        assert!(!sink.on_unit("still ignored"));
    }
}
