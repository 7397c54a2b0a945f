//! Store Lifecycle Events
//!
//! A closed event enum broadcast over a `tokio` channel that subscribers
//! drain at their own pace. Stores emit after the mutation has committed;
//! a slow or absent subscriber never blocks a store operation.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Lifecycle event emitted by a store after a committed mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    PacketStored { packet_id: Uuid },
    PacketUpdated { packet_id: Uuid },
    PacketDeleted { packet_id: Uuid },
    BlockCreated { block_id: Uuid },
    BlockUpdated { block_id: Uuid },
    BlockDeleted { block_id: Uuid },
    ReferenceAdded {
        reference_id: Uuid,
        source_block_id: Uuid,
        target_block_id: Uuid,
    },
    ReferenceRemoved {
        reference_id: Uuid,
        source_block_id: Uuid,
        target_block_id: Uuid,
    },
    RelationCreated { relation_id: Uuid },
    RelationUpdated { relation_id: Uuid },
    RelationDeleted { relation_id: Uuid },
    TagCreated { tag_id: Uuid, name: String },
    TagUsed { tag_id: Uuid, item_id: String },
    TagDeleted { tag_id: Uuid },
    MaintenanceSweepCompleted {
        relations_removed: usize,
        tags_removed: usize,
    },
}

/// Broadcast bus shared by the stores.
///
/// Cloning is cheap; all clones feed the same channel. With no active
/// subscriber, `emit` drops the event silently.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events emitted after this call. A receiver that falls
    /// behind the channel capacity observes a `Lagged` error and skips
    /// ahead, which is acceptable for lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: StoreEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("store event dropped: no subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        bus.emit(StoreEvent::PacketStored { packet_id: id });

        let event = rx.recv().await.unwrap();
        assert_eq!(event, StoreEvent::PacketStored { packet_id: id });
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::default();
        // must not panic or block
        bus.emit(StoreEvent::RelationDeleted {
            relation_id: Uuid::new_v4(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_wire_format_is_tagged() {
        let event = StoreEvent::TagCreated {
            tag_id: Uuid::nil(),
            name: "project".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tag_created""#));
    }
}
