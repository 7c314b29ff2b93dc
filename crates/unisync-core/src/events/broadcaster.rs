//! Event broadcaster for `SyncState` change notifications.
//!
//! Uses tokio's broadcast channel for multi-producer, multi-consumer
//! delivery. Slow receivers lag and must resynchronize from storage.

use std::sync::Arc;
use tokio::sync::broadcast;

use super::types::SyncStateEvent;
use crate::identity::SyncStateKey;

/// Events a receiver may fall behind before it observes `Lagged`.
const DEFAULT_CAPACITY: usize = 1024;

/// Broadcaster for `SyncState` events.
///
/// Cheap to clone; all clones share the same channel.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SyncStateEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Publishes `event`; returns how many receivers got it.
    pub fn send(&self, event: SyncStateEvent) -> usize {
        self.sender.send(event).unwrap_or_default()
    }

    pub fn send_created(&self, key: SyncStateKey, version: Option<String>) -> usize {
        self.send(SyncStateEvent::created(key, version))
    }

    pub fn send_updated(&self, key: SyncStateKey, version: Option<String>) -> usize {
        self.send(SyncStateEvent::updated(key, version))
    }

    pub fn send_deleted(&self, key: SyncStateKey) -> usize {
        self.send(SyncStateEvent::deleted(key))
    }

    /// Receiver for events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncStateEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SyncStateEventType;
    use crate::resource_type::ResourceType;

    #[test]
    fn test_broadcaster_no_subscribers() {
        let broadcaster = EventBroadcaster::new();
        let count = broadcaster.send_deleted(SyncStateKey::new(ResourceType::Rule, "cf-1"));
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_broadcaster_send_receive() {
        let broadcaster = EventBroadcaster::new();
        let mut receiver = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);

        let key = SyncStateKey::new(ResourceType::List, "pending-a");
        broadcaster.send_updated(key.clone(), Some("7".into()));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type, SyncStateEventType::Updated);
        assert_eq!(event.key, key);
        assert_eq!(event.version.as_deref(), Some("7"));
    }

    #[test]
    fn test_broadcaster_shared() {
        let broadcaster = EventBroadcaster::new_shared();
        let broadcaster2 = broadcaster.clone();

        let _receiver = broadcaster.subscribe();
        assert_eq!(broadcaster2.subscriber_count(), 1);
    }
}
