use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;
use tracing::debug;
use unisync_core::{ResourceType, SyncState, SyncStateKey};
use unisync_storage::{DeleteOutcome, StorageError, SyncStateStorage};

/// In-memory `SyncState` storage.
///
/// This storage implementation provides:
/// - Sharded concurrent access via `DashMap`
/// - Version checks performed under the entry lock, so a check and the write
///   it guards are atomic
/// - Tombstones for records deleted while finalizers are present
#[derive(Debug)]
pub struct InMemorySyncStateStorage {
    data: DashMap<SyncStateKey, SyncState>,
    /// Atomic counter for generating versions
    version_counter: AtomicU64,
}

impl InMemorySyncStateStorage {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            version_counter: AtomicU64::new(1),
        }
    }

    /// Number of stored records, tombstones included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn next_version(&self) -> String {
        self.version_counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
    }
}

impl Default for InMemorySyncStateStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn check_version(
    key: &SyncStateKey,
    stored: &SyncState,
    if_match: Option<&str>,
) -> Result<(), StorageError> {
    if let Some(expected) = if_match {
        let actual = stored.version().unwrap_or_default();
        if actual != expected {
            return Err(StorageError::version_conflict(key, expected, actual));
        }
    }
    Ok(())
}

#[async_trait]
impl SyncStateStorage for InMemorySyncStateStorage {
    async fn create(&self, state: &SyncState) -> Result<SyncState, StorageError> {
        let key = state.key();
        if key.name.is_empty() {
            return Err(StorageError::invalid_record("SyncState name must not be empty"));
        }

        match self.data.entry(key) {
            Entry::Occupied(occ) => Err(StorageError::already_exists(occ.key())),
            Entry::Vacant(vacant) => {
                let now = OffsetDateTime::now_utc();
                let mut stored = state.clone();
                stored.meta.version = Some(self.next_version());
                stored.meta.deletion_requested_at = None;
                stored.meta.created_at = now;
                stored.meta.updated_at = now;
                vacant.insert(stored.clone());
                Ok(stored)
            }
        }
    }

    async fn read(&self, key: &SyncStateKey) -> Result<Option<SyncState>, StorageError> {
        Ok(self.data.get(key).map(|entry| entry.value().clone()))
    }

    async fn find_by_external_id(
        &self,
        resource_type: ResourceType,
        external_id: &str,
    ) -> Result<Option<SyncState>, StorageError> {
        Ok(self
            .data
            .iter()
            .find(|entry| {
                let state = entry.value();
                state.resource_type == resource_type && state.external_id.as_str() == external_id
            })
            .map(|entry| entry.value().clone()))
    }

    async fn update(
        &self,
        state: &SyncState,
        if_match: Option<&str>,
    ) -> Result<SyncState, StorageError> {
        let key = state.key();
        match self.data.entry(key.clone()) {
            Entry::Vacant(_) => Err(StorageError::not_found(&key)),
            Entry::Occupied(mut occ) => {
                check_version(&key, occ.get(), if_match)?;

                let mut next = state.clone();
                next.meta.version = Some(self.next_version());
                next.meta.created_at = occ.get().meta.created_at;
                // The tombstone is owned by storage; writers cannot clear it.
                next.meta.deletion_requested_at = occ.get().meta.deletion_requested_at;
                next.meta.updated_at = OffsetDateTime::now_utc();

                if next.is_deletion_requested() && next.meta.finalizers.is_empty() {
                    occ.remove();
                    debug!(key = %key, "Last finalizer removed, SyncState deleted");
                } else {
                    occ.insert(next.clone());
                }
                Ok(next)
            }
        }
    }

    async fn delete(
        &self,
        key: &SyncStateKey,
        if_match: Option<&str>,
    ) -> Result<DeleteOutcome, StorageError> {
        match self.data.entry(key.clone()) {
            Entry::Vacant(_) => Err(StorageError::not_found(key)),
            Entry::Occupied(mut occ) => {
                check_version(key, occ.get(), if_match)?;

                if occ.get().meta.finalizers.is_empty() {
                    occ.remove();
                    return Ok(DeleteOutcome::Removed);
                }

                if !occ.get().is_deletion_requested() {
                    let now = OffsetDateTime::now_utc();
                    let version = self.next_version();
                    let stored = occ.get_mut();
                    stored.meta.deletion_requested_at = Some(now);
                    stored.meta.updated_at = now;
                    stored.meta.version = Some(version);
                }
                Ok(DeleteOutcome::Tombstoned)
            }
        }
    }

    async fn list(
        &self,
        resource_type: Option<ResourceType>,
    ) -> Result<Vec<SyncState>, StorageError> {
        let mut states: Vec<SyncState> = self
            .data
            .iter()
            .filter(|entry| resource_type.is_none_or(|rt| entry.key().resource_type == rt))
            .map(|entry| entry.value().clone())
            .collect();
        states.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(states)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
