//! Change events for `SyncState` records.
//!
//! Storage wrappers publish a [`SyncStateEvent`] after every successful
//! mutation; the controller subscribes and enqueues the affected key. The
//! feed is a trigger only: consumers always refetch the record.

pub mod broadcaster;
pub mod types;

pub use broadcaster::EventBroadcaster;
pub use types::{SyncStateEvent, SyncStateEventType};
