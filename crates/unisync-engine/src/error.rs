//! Error types for the sync engine.

use thiserror::Error;
use unisync_core::{ApiError, CoreError, ResourceType};
use unisync_storage::StorageError;

/// Failures of store operations and reconciliation.
///
/// External-API and extraction failures are normally absorbed into the
/// `SyncState` status and only surface here from helpers that do not
/// persist them.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("SyncState {key} is being deleted")]
    DeletionInProgress { key: String },

    #[error("SyncState {key} is keyed by {existing}, which shares a name with {owner}")]
    IdentityCollision {
        key: String,
        owner: String,
        existing: String,
    },
}

impl SyncError {
    pub fn deletion_in_progress(key: impl ToString) -> Self {
        Self::DeletionInProgress {
            key: key.to_string(),
        }
    }

    pub fn identity_collision(
        key: impl ToString,
        owner: impl ToString,
        existing: impl ToString,
    ) -> Self {
        Self::IdentityCollision {
            key: key.to_string(),
            owner: owner.to_string(),
            existing: existing.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_not_found(),
            Self::Api(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Label used for metrics and API error bodies.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Storage(e) if e.is_not_found() => "not_found",
            Self::Storage(e) if e.is_version_conflict() || e.is_already_exists() => "conflict",
            Self::Storage(_) => "storage",
            Self::Api(_) => "external_api",
            Self::Core(_) => "validation",
            Self::DeletionInProgress { .. } | Self::IdentityCollision { .. } => "conflict",
        }
    }
}

/// Failures resolving a single reference to an external identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("reference has none of id, name or displayName")]
    EmptyReference,

    #[error("referenced object {name} not found")]
    ObjectNotFound { name: String },

    #[error("{count} local objects named {name}; set a namespace to disambiguate")]
    AmbiguousObject { name: String, count: usize },

    #[error("referenced object {name} is not ready: external identifier not yet populated")]
    NotReady { name: String },

    #[error("no external {resource_type} named {name:?}")]
    NoMatch {
        resource_type: ResourceType,
        name: String,
    },

    #[error("{count} external {resource_type} resources named {name:?}")]
    Ambiguous {
        resource_type: ResourceType,
        name: String,
        count: usize,
    },

    #[error("lookup failed: {0}")]
    Lookup(String),
}

impl ResolveError {
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unisync_core::SyncStateKey;

    #[test]
    fn test_sync_error_category() {
        let key = SyncStateKey::new(ResourceType::Rule, "cf-1");
        assert_eq!(SyncError::from(StorageError::not_found(&key)).category(), "not_found");
        assert_eq!(
            SyncError::from(StorageError::version_conflict(&key, "1", "2")).category(),
            "conflict"
        );
        assert_eq!(SyncError::deletion_in_progress(&key).category(), "conflict");
        assert_eq!(
            SyncError::identity_collision(&key, "IpList/a", "FirewallRule/a").category(),
            "conflict"
        );
        assert!(SyncError::from(ApiError::not_found("Rule", "cf-1")).is_not_found());
    }

    #[test]
    fn test_resolve_error_messages() {
        let err = ResolveError::NotReady {
            name: "team-a".into(),
        };
        assert!(err.is_not_ready());
        assert_eq!(
            err.to_string(),
            "referenced object team-a is not ready: external identifier not yet populated"
        );

        let err = ResolveError::Ambiguous {
            resource_type: ResourceType::List,
            name: "blocked".into(),
            count: 2,
        };
        assert_eq!(err.to_string(), "2 external List resources named \"blocked\"");
    }
}
