//! Storage error types for the SyncState storage abstraction layer.

use std::fmt;

use unisync_core::SyncStateKey;

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// The requested record was not found.
    #[error("SyncState not found: {key}")]
    NotFound {
        /// Display form of the missing key.
        key: String,
    },

    /// A version conflict occurred during an update or delete.
    #[error("Version conflict on {key}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Display form of the contended key.
        key: String,
        /// The expected version.
        expected: String,
        /// The actual version found.
        actual: String,
    },

    /// Attempted to create a record that already exists.
    #[error("SyncState already exists: {key}")]
    AlreadyExists {
        /// Display form of the existing key.
        key: String,
    },

    /// The record data is invalid.
    #[error("Invalid SyncState: {message}")]
    InvalidRecord {
        /// Description of why the record is invalid.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(key: &SyncStateKey) -> Self {
        Self::NotFound {
            key: key.to_string(),
        }
    }

    /// Creates a new `VersionConflict` error.
    #[must_use]
    pub fn version_conflict(
        key: &SyncStateKey,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::VersionConflict {
            key: key.to_string(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(key: &SyncStateKey) -> Self {
        Self::AlreadyExists {
            key: key.to_string(),
        }
    }

    /// Creates a new `InvalidRecord` error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a version conflict error.
    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Returns `true` if this is an already exists error.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::VersionConflict { .. } => ErrorCategory::Conflict,
            Self::AlreadyExists { .. } => ErrorCategory::Conflict,
            Self::InvalidRecord { .. } => ErrorCategory::Validation,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Record not found.
    NotFound,
    /// Conflict (version or existence).
    Conflict,
    /// Validation error.
    Validation,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unisync_core::ResourceType;

    fn key() -> SyncStateKey {
        SyncStateKey::new(ResourceType::Rule, "cf-42")
    }

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found(&key());
        assert_eq!(err.to_string(), "SyncState not found: Rule/cf-42");

        let err = StorageError::version_conflict(&key(), "1", "2");
        assert_eq!(
            err.to_string(),
            "Version conflict on Rule/cf-42: expected 1, found 2"
        );

        let err = StorageError::already_exists(&key());
        assert_eq!(err.to_string(), "SyncState already exists: Rule/cf-42");
    }

    #[test]
    fn test_error_predicates() {
        let err = StorageError::not_found(&key());
        assert!(err.is_not_found());
        assert!(!err.is_version_conflict());
        assert!(!err.is_already_exists());

        let err = StorageError::version_conflict(&key(), "1", "2");
        assert!(!err.is_not_found());
        assert!(err.is_version_conflict());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::not_found(&key()).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            StorageError::version_conflict(&key(), "1", "2").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::already_exists(&key()).category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::invalid_record("bad data").category(),
            ErrorCategory::Validation
        );
    }
}
