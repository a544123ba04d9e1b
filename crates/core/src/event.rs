//! Domain events: what happened while handling messages, for anyone who
//! wants to watch without being wired into the call path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A user sent a message
    MessageReceived {
        user_id: String,
        content_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The model answered one agent iteration
    ResponseGenerated {
        conversation_id: String,
        model: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool call finished, successfully or not
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The agent stopped working on a message
    TurnFinished {
        conversation_id: String,
        iterations: u32,
        completed: bool,
        timestamp: DateTime<Utc>,
    },

    /// A note was written to the piece store and indexed
    NoteSaved {
        user_id: String,
        cid: String,
        timestamp: DateTime<Utc>,
    },

    /// Handling a message failed
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Short machine-friendly name, matching the serialized `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageReceived { .. } => "message_received",
            Self::ResponseGenerated { .. } => "response_generated",
            Self::ToolExecuted { .. } => "tool_executed",
            Self::TurnFinished { .. } => "turn_finished",
            Self::NoteSaved { .. } => "note_saved",
            Self::ErrorOccurred { .. } => "error_occurred",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::MessageReceived { timestamp, .. }
            | Self::ResponseGenerated { timestamp, .. }
            | Self::ToolExecuted { timestamp, .. }
            | Self::TurnFinished { timestamp, .. }
            | Self::NoteSaved { timestamp, .. }
            | Self::ErrorOccurred { timestamp, .. } => *timestamp,
        }
    }
}

/// Fan-out of [`DomainEvent`]s over `tokio::sync::broadcast`.
///
/// Slow subscribers lose the oldest events rather than blocking publishers.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to all current subscribers. Publishing with none is not an error.
    pub fn publish(&self, event: DomainEvent) {
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(DomainEvent::NoteSaved {
            user_id: "42".into(),
            cid: "baga6ea4seaq".into(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "note_saved");
        match event.as_ref() {
            DomainEvent::NoteSaved { cid, .. } => assert_eq!(cid, "baga6ea4seaq"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::ErrorOccurred {
            context: "test".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn serialized_kind_matches_kind() {
        let event = DomainEvent::TurnFinished {
            conversation_id: "c1".into(),
            iterations: 2,
            completed: true,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], event.kind());
        assert_eq!(json["iterations"], 2);
    }
}
