//! EventedStorage - A storage wrapper that emits events after mutations.
//!
//! This wrapper delegates all operations to an inner storage implementation
//! while emitting events to a broadcaster after successful operations.
//!
//! # Example
//!
//! ```ignore
//! use unisync_storage::EventedStorage;
//! use unisync_core::EventBroadcaster;
//!
//! let broadcaster = EventBroadcaster::new_shared();
//! let storage = EventedStorage::new(InMemorySyncStateStorage::new(), broadcaster);
//!
//! // After this, an Updated event reaches every subscriber
//! storage.update(&state, state.version()).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use unisync_core::{EventBroadcaster, ResourceType, SyncState, SyncStateKey};

use crate::error::StorageError;
use crate::traits::{DeleteOutcome, SyncStateStorage};

/// A storage wrapper that emits events after successful mutations.
///
/// Events are emitted **after** the operation succeeds, so an event always
/// corresponds to a change that is visible to a subsequent read.
pub struct EventedStorage<S: SyncStateStorage> {
    /// The inner storage implementation.
    inner: S,
    /// The event broadcaster.
    broadcaster: Arc<EventBroadcaster>,
}

impl<S: SyncStateStorage> EventedStorage<S> {
    /// Create a new evented storage wrapper.
    pub fn new(inner: S, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self { inner, broadcaster }
    }

    /// Get a reference to the inner storage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a reference to the broadcaster.
    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    fn emit_created(&self, state: &SyncState) {
        if self.broadcaster.subscriber_count() == 0 {
            return;
        }
        let count = self
            .broadcaster
            .send_created(state.key(), state.meta.version.clone());
        debug!(key = %state.key(), subscribers = count, "Emitted SyncState created event");
    }

    fn emit_updated(&self, state: &SyncState) {
        if self.broadcaster.subscriber_count() == 0 {
            return;
        }
        let count = self
            .broadcaster
            .send_updated(state.key(), state.meta.version.clone());
        debug!(key = %state.key(), subscribers = count, "Emitted SyncState updated event");
    }

    fn emit_deleted(&self, key: &SyncStateKey) {
        if self.broadcaster.subscriber_count() == 0 {
            return;
        }
        let count = self.broadcaster.send_deleted(key.clone());
        debug!(key = %key, subscribers = count, "Emitted SyncState deleted event");
    }
}

#[async_trait]
impl<S: SyncStateStorage> SyncStateStorage for EventedStorage<S> {
    async fn create(&self, state: &SyncState) -> Result<SyncState, StorageError> {
        let created = self.inner.create(state).await?;
        self.emit_created(&created);
        Ok(created)
    }

    async fn read(&self, key: &SyncStateKey) -> Result<Option<SyncState>, StorageError> {
        // Read operations don't emit events
        self.inner.read(key).await
    }

    async fn find_by_external_id(
        &self,
        resource_type: ResourceType,
        external_id: &str,
    ) -> Result<Option<SyncState>, StorageError> {
        self.inner
            .find_by_external_id(resource_type, external_id)
            .await
    }

    async fn update(
        &self,
        state: &SyncState,
        if_match: Option<&str>,
    ) -> Result<SyncState, StorageError> {
        let updated = self.inner.update(state, if_match).await?;
        // Clearing the last finalizer of a tombstoned record removes it.
        if updated.is_deletion_requested() && updated.meta.finalizers.is_empty() {
            self.emit_deleted(&updated.key());
        } else {
            self.emit_updated(&updated);
        }
        Ok(updated)
    }

    async fn delete(
        &self,
        key: &SyncStateKey,
        if_match: Option<&str>,
    ) -> Result<DeleteOutcome, StorageError> {
        let outcome = self.inner.delete(key, if_match).await?;
        match outcome {
            DeleteOutcome::Removed => self.emit_deleted(key),
            // A tombstone is an update from the reconciler's point of view.
            DeleteOutcome::Tombstoned => {
                if self.broadcaster.subscriber_count() > 0 {
                    self.broadcaster.send_updated(key.clone(), None);
                }
            }
        }
        Ok(outcome)
    }

    async fn list(
        &self,
        resource_type: Option<ResourceType>,
    ) -> Result<Vec<SyncState>, StorageError> {
        self.inner.list(resource_type).await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

impl<S: SyncStateStorage> std::fmt::Debug for EventedStorage<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventedStorage")
            .field("backend", &self.inner.backend_name())
            .field("subscriber_count", &self.broadcaster.subscriber_count())
            .finish()
    }
}
