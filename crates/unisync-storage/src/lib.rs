//! # unisync-storage
//!
//! Storage abstraction for `SyncState` records.
//!
//! This crate defines the contract every backend implements; it does not
//! contain a backend itself (see `unisync-db-memory`).
//!
//! ## Overview
//!
//! The main trait is [`SyncStateStorage`], which defines:
//! - versioned reads and writes with optimistic concurrency (`if_match`)
//! - deletion with tombstone-plus-finalizer semantics
//! - listing and lookup by external identifier
//!
//! [`EventedStorage`] wraps any backend and publishes change events after
//! successful mutations, which is what drives reconciliation.
//!
//! ## Example
//!
//! ```ignore
//! use unisync_storage::{SyncStateStorage, StorageError};
//!
//! async fn phase_of(
//!     storage: &dyn SyncStateStorage,
//!     key: &SyncStateKey,
//! ) -> Result<Option<SyncPhase>, StorageError> {
//!     Ok(storage.read(key).await?.map(|s| s.status.phase))
//! }
//! ```

mod error;
pub mod evented;
mod traits;

pub use error::{ErrorCategory, StorageError};
pub use evented::EventedStorage;
pub use traits::{DeleteOutcome, SyncStateStorage};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shareable storage trait object.
pub type DynStorage = std::sync::Arc<dyn SyncStateStorage>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::evented::EventedStorage;
    pub use crate::traits::{DeleteOutcome, SyncStateStorage};
    pub use crate::{DynStorage, StorageResult};
}
