//! In-memory `SyncState` storage backend for unisync.
//!
//! This crate provides an in-memory implementation of the `SyncStateStorage`
//! trait from `unisync-storage`, backed by a sharded `DashMap`.
//!
//! # Example
//!
//! ```ignore
//! use unisync_db_memory::InMemorySyncStateStorage;
//! use unisync_storage::SyncStateStorage;
//!
//! let storage = InMemorySyncStateStorage::new();
//! let created = storage.create(&state).await?;
//! assert_eq!(created.version(), Some("1"));
//! ```

pub mod storage;

pub use storage::InMemorySyncStateStorage;
pub use unisync_storage::{DeleteOutcome, DynStorage, StorageError, SyncStateStorage};

/// Creates a new shareable in-memory storage instance.
pub fn create_storage() -> DynStorage {
    std::sync::Arc::new(InMemorySyncStateStorage::new())
}
