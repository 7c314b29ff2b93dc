use thiserror::Error;

/// Core error types for unisync domain operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid resource type: {0}")]
    InvalidResourceType(String),

    #[error("Invalid external identifier: {0}")]
    InvalidExternalId(String),

    #[error("Invalid config from {owner}: {message}")]
    InvalidConfig { owner: String, message: String },

    #[error("No config sources registered for {0}")]
    NoSources(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new InvalidResourceType error
    pub fn invalid_resource_type(resource_type: impl Into<String>) -> Self {
        Self::InvalidResourceType(resource_type.into())
    }

    /// Create a new InvalidExternalId error
    pub fn invalid_external_id(id: impl Into<String>) -> Self {
        Self::InvalidExternalId(id.into())
    }

    /// Create a new InvalidConfig error attributed to a contributing owner
    pub fn invalid_config(owner: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            owner: owner.into(),
            message: message.into(),
        }
    }

    /// Extraction errors stay terminal until a contributor fixes its config.
    pub fn is_extraction_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. } | Self::NoSources(_))
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidResourceType(_) | Self::InvalidExternalId(_) => ErrorCategory::Validation,
            Self::InvalidConfig { .. } | Self::NoSources(_) => ErrorCategory::Extraction,
            Self::JsonError(_) => ErrorCategory::Serialization,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Extraction,
    Serialization,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Extraction => write!(f, "extraction"),
            Self::Serialization => write!(f, "serialization"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_error() {
        let err = CoreError::invalid_config("Rule/default/a", "missing field `action`");
        assert_eq!(
            err.to_string(),
            "Invalid config from Rule/default/a: missing field `action`"
        );
        assert!(err.is_extraction_error());
        assert_eq!(err.category(), ErrorCategory::Extraction);
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err: serde_json::Error =
            serde_json::from_str::<serde_json::Value>("{ invalid json }").unwrap_err();
        let core_err: CoreError = json_err.into();

        assert!(matches!(core_err, CoreError::JsonError(_)));
        assert!(!core_err.is_extraction_error());
        assert_eq!(core_err.category(), ErrorCategory::Serialization);
    }

    #[test]
    fn test_error_categories_display() {
        assert_eq!(ErrorCategory::Validation.to_string(), "validation");
        assert_eq!(ErrorCategory::Extraction.to_string(), "extraction");
        assert_eq!(ErrorCategory::Serialization.to_string(), "serialization");
    }
}
