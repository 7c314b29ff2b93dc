use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::identity::SyncStateKey;

/// Type of change to a `SyncState` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStateEventType {
    Created,
    Updated,
    Deleted,
}

impl SyncStateEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStateEventType::Created => "created",
            SyncStateEventType::Updated => "updated",
            SyncStateEventType::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for SyncStateEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Notification that a `SyncState` record changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStateEvent {
    pub event_type: SyncStateEventType,
    pub key: SyncStateKey,
    /// Storage version after the change (None for deletions)
    pub version: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl SyncStateEvent {
    pub fn new(event_type: SyncStateEventType, key: SyncStateKey, version: Option<String>) -> Self {
        Self {
            event_type,
            key,
            version,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn created(key: SyncStateKey, version: Option<String>) -> Self {
        Self::new(SyncStateEventType::Created, key, version)
    }

    pub fn updated(key: SyncStateKey, version: Option<String>) -> Self {
        Self::new(SyncStateEventType::Updated, key, version)
    }

    pub fn deleted(key: SyncStateKey) -> Self {
        Self::new(SyncStateEventType::Deleted, key, None)
    }
}
