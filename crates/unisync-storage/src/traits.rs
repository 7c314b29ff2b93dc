//! Storage traits for the SyncState storage abstraction layer.

use async_trait::async_trait;
use unisync_core::{ResourceType, SyncState, SyncStateKey};

use crate::error::StorageError;

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The record is gone.
    Removed,
    /// Finalizers are present; the record was marked for deletion instead.
    Tombstoned,
}

/// The storage contract for `SyncState` records.
///
/// Every mutation is version-checked when `if_match` is given: the call fails
/// with `StorageError::VersionConflict` if the stored version differs. The
/// backend assigns a new version on every successful write and returns the
/// record as stored.
///
/// Deletion follows finalizer semantics: deleting a record that still carries
/// finalizers only sets `meta.deletion_requested_at`; the record is removed
/// once an update clears the last finalizer.
///
/// Implementations must be thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use unisync_storage::{SyncStateStorage, StorageError};
///
/// async fn must_read(storage: &dyn SyncStateStorage, key: &SyncStateKey) -> Result<SyncState, StorageError> {
///     storage
///         .read(key)
///         .await?
///         .ok_or_else(|| StorageError::not_found(key))
/// }
/// ```
#[async_trait]
pub trait SyncStateStorage: Send + Sync {
    /// Creates a new record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the key is taken.
    async fn create(&self, state: &SyncState) -> Result<SyncState, StorageError>;

    /// Reads a record by key. Returns `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing records.
    async fn read(&self, key: &SyncStateKey) -> Result<Option<SyncState>, StorageError>;

    /// Finds the record of `resource_type` whose `external_id` equals `external_id`.
    async fn find_by_external_id(
        &self,
        resource_type: ResourceType,
        external_id: &str,
    ) -> Result<Option<SyncState>, StorageError>;

    /// Replaces an existing record.
    ///
    /// If the stored record is tombstoned and `state` carries no finalizers,
    /// the record is removed and the returned state is the final snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record does not exist.
    /// Returns `StorageError::VersionConflict` if `if_match` doesn't match.
    async fn update(
        &self,
        state: &SyncState,
        if_match: Option<&str>,
    ) -> Result<SyncState, StorageError>;

    /// Requests deletion of a record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record does not exist.
    /// Returns `StorageError::VersionConflict` if `if_match` doesn't match.
    async fn delete(
        &self,
        key: &SyncStateKey,
        if_match: Option<&str>,
    ) -> Result<DeleteOutcome, StorageError>;

    /// Lists records, optionally restricted to one resource type, ordered by key.
    async fn list(
        &self,
        resource_type: Option<ResourceType>,
    ) -> Result<Vec<SyncState>, StorageError>;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
