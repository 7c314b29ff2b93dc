//! Capability contract for the external service.
//!
//! The engine only needs Create/Update/Delete/Get/ListByName per resource
//! kind, with not-found distinguishable from every other failure. The HTTP
//! implementation lives in `unisync-client`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::resource_type::ResourceType;
use crate::sync_state::SyncState;

/// Addressing and auth context for one external call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiContext {
    pub account_scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_scope: Option<String>,
    pub credentials_ref: String,
}

impl ApiContext {
    pub fn new(
        account_scope: impl Into<String>,
        zone_scope: Option<String>,
        credentials_ref: impl Into<String>,
    ) -> Self {
        Self {
            account_scope: account_scope.into(),
            zone_scope,
            credentials_ref: credentials_ref.into(),
        }
    }
}

impl From<&SyncState> for ApiContext {
    fn from(state: &SyncState) -> Self {
        Self {
            account_scope: state.account_scope.clone(),
            zone_scope: state.zone_scope.clone(),
            credentials_ref: state.credentials_ref.clone(),
        }
    }
}

/// A resource as reported by the external service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalResource {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Value,
}

impl ExternalResource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            body: Value::Null,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}

/// Failures from the external service.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("External resource not found: {resource_type}/{id}")]
    NotFound { resource_type: String, id: String },

    #[error("Rate limited by external API")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("External API unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("External API rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("External API call timed out after {0}ms")]
    Timeout(u64),

    #[error("Invalid response from external API: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl ApiError {
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::RateLimited { .. } => "rate_limited",
            Self::Unavailable { .. } => "unavailable",
            Self::Rejected { .. } => "rejected",
            Self::Timeout(_) => "timeout",
            Self::InvalidResponse(_) => "invalid_response",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Transport(_) => "transport",
        }
    }
}

/// Per-resource-kind CRUD capability of the external service.
#[async_trait]
pub trait ExternalApi: Send + Sync {
    /// Creates a resource and returns it with its assigned identifier.
    async fn create(
        &self,
        ctx: &ApiContext,
        resource_type: ResourceType,
        params: &Value,
    ) -> Result<ExternalResource, ApiError>;

    /// Replaces the configuration of an existing resource.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if `id` no longer exists.
    async fn update(
        &self,
        ctx: &ApiContext,
        resource_type: ResourceType,
        id: &str,
        params: &Value,
    ) -> Result<ExternalResource, ApiError>;

    /// Deletes a resource. `ApiError::NotFound` if it is already gone.
    async fn delete(
        &self,
        ctx: &ApiContext,
        resource_type: ResourceType,
        id: &str,
    ) -> Result<(), ApiError>;

    async fn get(
        &self,
        ctx: &ApiContext,
        resource_type: ResourceType,
        id: &str,
    ) -> Result<ExternalResource, ApiError>;

    /// All resources whose display name equals `name` exactly.
    async fn list_by_name(
        &self,
        ctx: &ApiContext,
        resource_type: ResourceType,
        name: &str,
    ) -> Result<Vec<ExternalResource>, ApiError>;
}

/// Type alias for a shareable external API client.
pub type DynExternalApi = Arc<dyn ExternalApi>;
