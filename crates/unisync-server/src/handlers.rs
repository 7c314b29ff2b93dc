use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use unisync_core::{ApiContext, ConfigSource, ExternalId, OwnerRef, ResourceType, SyncState};
use unisync_engine::{ResourceRef, Scope, SyncError, UnregisterOutcome};
use unisync_storage::DeleteOutcome;

use crate::metrics::render_metrics;
use crate::server::AppState;

/// Error rendered as `{error, category}` JSON.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Sync(SyncError),
}

impl From<SyncError> for AppError {
    fn from(e: SyncError) -> Self {
        Self::Sync(e)
    }
}

impl AppError {
    fn status_and_category(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "validation"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Sync(e) => {
                let category = e.category();
                let status = match category {
                    "not_found" => StatusCode::NOT_FOUND,
                    "conflict" => StatusCode::CONFLICT,
                    "validation" => StatusCode::BAD_REQUEST,
                    "external_api" => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, category)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, category) = self.status_and_category();
        let message = match &self {
            Self::BadRequest(msg) | Self::NotFound(msg) => msg.clone(),
            Self::Sync(e) => e.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(error = %message, category, "Admin API request failed");
        }
        (status, Json(json!({ "error": message, "category": category }))).into_response()
    }
}

fn parse_type(value: &str) -> Result<ResourceType, AppError> {
    value
        .parse()
        .map_err(|e: unisync_core::CoreError| AppError::BadRequest(e.to_string()))
}

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn metrics() -> Response {
    match render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    resource_type: Option<String>,
}

pub async fn list_sync_states(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SyncState>>, AppError> {
    let resource_type = query.resource_type.as_deref().map(parse_type).transpose()?;
    Ok(Json(state.store.list(resource_type).await?))
}

/// `name` may be the storage name or the real external identifier.
pub async fn get_sync_state(
    State(state): State<AppState>,
    Path((resource_type, name)): Path<(String, String)>,
) -> Result<Json<SyncState>, AppError> {
    let resource_type = parse_type(&resource_type)?;
    state
        .store
        .lookup(resource_type, &name)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no SyncState {resource_type}/{name}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub resource_type: String,
    /// Known external identifier; a placeholder is derived from the owner otherwise.
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub natural_key: Option<String>,
    pub owner: OwnerRef,
    #[serde(default)]
    pub priority: i32,
    pub config: Value,
    pub account_scope: String,
    #[serde(default)]
    pub zone_scope: Option<String>,
    pub credentials_ref: String,
}

pub async fn register_source(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<SyncState>, AppError> {
    let resource_type = parse_type(&req.resource_type)?;
    if req.account_scope.is_empty() || req.credentials_ref.is_empty() {
        return Err(AppError::BadRequest(
            "accountScope and credentialsRef are required".into(),
        ));
    }
    if req.owner.name.is_empty() {
        return Err(AppError::BadRequest("owner.name is required".into()));
    }
    let zone_scope = req.zone_scope.filter(|zone| !zone.is_empty());
    if resource_type.requires_zone() && zone_scope.is_none() {
        return Err(AppError::BadRequest(format!(
            "zoneScope is required for {resource_type}"
        )));
    }

    let external_id = match req.external_id.filter(|id| !id.is_empty()) {
        Some(id) => ExternalId::parse(id),
        None => ExternalId::placeholder_for(&req.owner, req.natural_key.as_deref()),
    };
    let scope = Scope::new(req.account_scope, zone_scope, req.credentials_ref);

    let record = state
        .store
        .get_or_create(resource_type, external_id, &scope)
        .await?;
    let stored = state
        .store
        .register(&record.key(), ConfigSource::new(req.owner, req.priority, req.config))
        .await?;
    Ok(Json(stored))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterRequest {
    pub resource_type: String,
    /// Storage name or real external identifier.
    pub name: String,
    pub owner: OwnerRef,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnregisterResponse {
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<usize>,
}

pub async fn unregister_source(
    State(state): State<AppState>,
    Json(req): Json<UnregisterRequest>,
) -> Result<Json<UnregisterResponse>, AppError> {
    let resource_type = parse_type(&req.resource_type)?;
    let Some(record) = state.store.lookup(resource_type, &req.name).await? else {
        return Ok(Json(UnregisterResponse {
            outcome: "not_registered".into(),
            remaining: None,
        }));
    };

    let (outcome, remaining) = match state.store.unregister(&record.key(), &req.owner).await? {
        UnregisterOutcome::NotRegistered => ("not_registered", None),
        UnregisterOutcome::SourceRemoved { remaining } => ("source_removed", Some(remaining)),
        UnregisterOutcome::Deleted(DeleteOutcome::Removed) => ("removed", None),
        UnregisterOutcome::Deleted(DeleteOutcome::Tombstoned) => ("deletion_pending", None),
    };
    Ok(Json(UnregisterResponse {
        outcome: outcome.into(),
        remaining,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub resource_type: String,
    pub account_scope: String,
    #[serde(default)]
    pub zone_scope: Option<String>,
    pub credentials_ref: String,
    pub references: Vec<ResourceRef>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveFailure {
    pub index: usize,
    pub error: String,
    /// The referenced object exists but has not been synced yet.
    pub not_ready: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub ids: Vec<String>,
    pub errors: Vec<ResolveFailure>,
}

pub async fn resolve_references(
    State(state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, AppError> {
    let resource_type = parse_type(&req.resource_type)?;
    let ctx = ApiContext::new(req.account_scope, req.zone_scope, req.credentials_ref);

    let resolved = state
        .resolver
        .resolve_all(&ctx, resource_type, &req.references)
        .await;
    let errors = resolved
        .errors
        .into_iter()
        .map(|(index, e)| ResolveFailure {
            index,
            not_ready: e.is_not_ready(),
            error: e.to_string(),
        })
        .collect();
    Ok(Json(ResolveResponse {
        ids: resolved.ids,
        errors,
    }))
}
