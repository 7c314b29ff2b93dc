//! The reconciliation loop driving one `SyncState` to convergence.
//!
//! `reconcile` is level-triggered: it always starts from a fresh read and
//! persists status before every external action, so an abandoned attempt is
//! retried from the last durable state rather than resumed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use unisync_core::{
    ApiContext, ApiError, ContentHash, DynExternalApi, ExternalId, ResourceType, SyncPhase,
    SyncState, SyncStateKey, content_hash, extract_config,
};
use unisync_storage::{DynStorage, StorageError};

use crate::debounce::Debouncer;
use crate::error::SyncError;
use crate::metrics;
use crate::report::{DynStatusReporter, SyncReport, TracingReporter};
use crate::retry::{ConflictRetryer, DEFAULT_CONFLICT_ATTEMPTS};
use crate::store::SyncStateStore;

/// Timing knobs of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Confirmatory requeue after a successful sync.
    pub resync_interval: Duration,
    pub error_backoff_base: Duration,
    pub error_backoff_max: Duration,
    /// Upper bound for every external call.
    pub api_timeout: Duration,
    pub conflict_attempts: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(600),
            error_backoff_base: Duration::from_secs(5),
            error_backoff_max: Duration::from_secs(300),
            api_timeout: Duration::from_secs(30),
            conflict_attempts: DEFAULT_CONFLICT_ATTEMPTS,
        }
    }
}

impl EngineSettings {
    /// `base * 2^(failures-1)`, capped at `error_backoff_max`.
    pub fn error_backoff(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(31);
        self.error_backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.error_backoff_max)
    }
}

/// What the caller should do after a reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Done,
    RequeueAfter(Duration),
}

impl ReconcileOutcome {
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Self::Done => None,
            Self::RequeueAfter(delay) => Some(*delay),
        }
    }
}

pub struct SyncEngine {
    pub(crate) storage: DynStorage,
    pub(crate) store: Arc<SyncStateStore>,
    pub(crate) api: DynExternalApi,
    pub(crate) debouncer: Arc<Debouncer>,
    pub(crate) retryer: ConflictRetryer,
    pub(crate) reporter: DynStatusReporter,
    pub(crate) settings: EngineSettings,
}

impl SyncEngine {
    pub fn new(store: Arc<SyncStateStore>, api: DynExternalApi, settings: EngineSettings) -> Self {
        Self {
            storage: store.storage().clone(),
            debouncer: store.debouncer().clone(),
            retryer: store.retryer(),
            store,
            api,
            reporter: Arc::new(TracingReporter),
            settings,
        }
    }

    pub fn with_reporter(mut self, reporter: DynStatusReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<SyncStateStore> {
        &self.store
    }

    /// Drives the record under `key` one step towards convergence.
    ///
    /// External and extraction failures are recorded in the record's status
    /// and answered with an error-backoff requeue; only storage failures are
    /// returned as `Err`.
    pub async fn reconcile(&self, key: &SyncStateKey) -> Result<ReconcileOutcome, SyncError> {
        let Some(state) = self.storage.read(key).await? else {
            self.debouncer.forget(key);
            return Ok(self.finish(key, "gone", ReconcileOutcome::Done));
        };

        if state.is_deletion_requested() || state.sources.is_empty() {
            return self.run_deletion(state).await;
        }

        if let Some(wait) = self.debouncer.remaining(key) {
            debug!(key = %key, wait_ms = wait.as_millis() as u64, "Update pending, deferring sync");
            metrics::record_debounced(key.resource_type);
            return Ok(self.finish(key, "debounced", ReconcileOutcome::RequeueAfter(wait)));
        }

        if !state.has_finalizer() {
            self.update_state(key, |s| !s.is_deletion_requested() && s.add_finalizer())
                .await?;
            debug!(key = %key, "Added sync finalizer");
            return Ok(self.finish(
                key,
                "finalizer_added",
                ReconcileOutcome::RequeueAfter(Duration::ZERO),
            ));
        }

        let inputs = inputs_fingerprint(&state);
        if let Some(wait) = self.backoff_remaining(&state, &inputs) {
            return Ok(self.finish(key, "backoff", ReconcileOutcome::RequeueAfter(wait)));
        }

        let merged = extract_config(state.resource_type, &state.sources)
            .and_then(|config| Ok((content_hash(&config)?, config.to_params()?)));
        let (hash, params) = match merged {
            Ok(merged) => merged,
            Err(e) => {
                warn!(key = %key, error = %e, "Invalid contributor configuration");
                return self.record_failure(key, inputs, e.to_string()).await;
            }
        };

        if state.status.phase == SyncPhase::Synced
            && hash.matches(state.status.last_applied_hash.as_deref())
        {
            debug!(key = %key, "Configuration unchanged, nothing to apply");
            return Ok(self.finish(
                key,
                "unchanged",
                ReconcileOutcome::RequeueAfter(self.settings.resync_interval),
            ));
        }

        let syncing = self
            .update_state(key, |s| {
                if s.is_deletion_requested() || s.status.phase == SyncPhase::Syncing {
                    return false;
                }
                s.status.phase = SyncPhase::Syncing;
                true
            })
            .await?;
        let Some(syncing) = syncing else {
            return Ok(self.finish(key, "gone", ReconcileOutcome::Done));
        };
        if syncing.is_deletion_requested() {
            return Ok(self.finish(key, "deleting", ReconcileOutcome::RequeueAfter(Duration::ZERO)));
        }

        match self.apply_external(&syncing, &params).await {
            Ok(new_id) => self.record_success(&syncing, hash, inputs, new_id).await,
            Err(e) => {
                warn!(key = %key, external_id = %syncing.external_id, error = %e,
                    "External apply failed");
                self.record_failure(key, inputs, e.to_string()).await
            }
        }
    }

    /// Creates or updates the external resource. Returns the new identifier
    /// when one was assigned.
    async fn apply_external(
        &self,
        state: &SyncState,
        params: &Value,
    ) -> Result<Option<ExternalId>, ApiError> {
        let ctx = ApiContext::from(state);
        let resource_type = state.resource_type;

        let Some(id) = state.external_id.real_id() else {
            return self.create_external(&ctx, resource_type, params).await.map(Some);
        };

        let updated = self
            .call(resource_type, "update", self.api.update(&ctx, resource_type, id, params))
            .await;
        match updated {
            Ok(_) => Ok(None),
            Err(e) if e.is_not_found() => {
                warn!(key = %state.key(), external_id = %id,
                    "External resource no longer exists, recreating");
                self.create_external(&ctx, resource_type, params).await.map(Some)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_external(
        &self,
        ctx: &ApiContext,
        resource_type: ResourceType,
        params: &Value,
    ) -> Result<ExternalId, ApiError> {
        let created = self
            .call(resource_type, "create", self.api.create(ctx, resource_type, params))
            .await?;
        ExternalId::real(created.id.as_str()).map_err(|_| {
            ApiError::InvalidResponse(format!("create returned unusable id {:?}", created.id))
        })
    }

    /// Runs one external call under the configured timeout.
    pub(crate) async fn call<T>(
        &self,
        resource_type: ResourceType,
        operation: &'static str,
        fut: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        let timeout = self.settings.api_timeout;
        let result = match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        };
        metrics::record_external_call(resource_type, operation, &result);
        result
    }

    async fn record_success(
        &self,
        applied: &SyncState,
        hash: ContentHash,
        inputs: String,
        new_id: Option<ExternalId>,
    ) -> Result<ReconcileOutcome, SyncError> {
        let key = applied.key();
        let previous = &applied.external_id;
        let now = OffsetDateTime::now_utc();

        let stored = self
            .update_state(&key, |s| {
                if let Some(id) = &new_id {
                    migrate_identity(s, previous, id);
                }
                s.status.phase = SyncPhase::Synced;
                s.status.last_applied_hash = Some(hash.as_str().to_string());
                s.status.last_error = None;
                s.status.consecutive_failures = 0;
                s.status.last_synced_at = Some(now);
                s.status.last_attempt_hash = Some(inputs.clone());
                s.status.last_attempt_at = Some(now);
                true
            })
            .await?;

        if let Some(stored) = &stored {
            info!(key = %key, external_id = %stored.external_id, hash = %hash, "Synced");
            self.reporter.report(&SyncReport::from_state(stored));
        }
        Ok(self.finish(
            &key,
            "synced",
            ReconcileOutcome::RequeueAfter(self.settings.resync_interval),
        ))
    }

    pub(crate) async fn record_failure(
        &self,
        key: &SyncStateKey,
        inputs: String,
        message: String,
    ) -> Result<ReconcileOutcome, SyncError> {
        let now = OffsetDateTime::now_utc();
        let stored = self
            .update_state(key, |s| {
                s.status.phase = SyncPhase::Error;
                s.status.last_error = Some(message.clone());
                s.status.consecutive_failures = s.status.consecutive_failures.saturating_add(1);
                s.status.last_attempt_hash = Some(inputs.clone());
                s.status.last_attempt_at = Some(now);
                true
            })
            .await?;

        let failures = stored
            .as_ref()
            .map_or(1, |s| s.status.consecutive_failures);
        if let Some(stored) = &stored {
            self.reporter.report(&SyncReport::from_state(stored));
        }
        Ok(self.finish(
            key,
            "failed",
            ReconcileOutcome::RequeueAfter(self.settings.error_backoff(failures)),
        ))
    }

    /// Time left before a failed attempt with the same inputs may be retried.
    pub(crate) fn backoff_remaining(&self, state: &SyncState, inputs: &str) -> Option<Duration> {
        let status = &state.status;
        if status.phase != SyncPhase::Error || status.last_attempt_hash.as_deref() != Some(inputs) {
            return None;
        }
        let attempted_at = status.last_attempt_at?;
        let elapsed = Duration::try_from(OffsetDateTime::now_utc() - attempted_at)
            .unwrap_or(Duration::ZERO);
        self.settings
            .error_backoff(status.consecutive_failures)
            .checked_sub(elapsed)
            .filter(|wait| !wait.is_zero())
    }

    /// Conflict-safe read-modify-write of the record under `key`.
    pub(crate) async fn update_state<F>(
        &self,
        key: &SyncStateKey,
        mutate: F,
    ) -> Result<Option<SyncState>, StorageError>
    where
        F: FnMut(&mut SyncState) -> bool,
    {
        let storage = &self.storage;
        self.retryer
            .run(
                move || storage.read(key),
                mutate,
                move |state: SyncState| async move {
                    storage.update(&state, state.version()).await
                },
            )
            .await
    }

    pub(crate) fn finish(
        &self,
        key: &SyncStateKey,
        label: &'static str,
        outcome: ReconcileOutcome,
    ) -> ReconcileOutcome {
        metrics::record_reconcile(key.resource_type, label);
        outcome
    }
}

/// Writes `new` into `state.external_id` if the record still carries the
/// identifier the apply started from, or a placeholder.
///
/// `new` is always a real identifier, so a record never reverts to a
/// placeholder. Returns `true` when the identifier changed.
pub fn migrate_identity(state: &mut SyncState, previous: &ExternalId, new: &ExternalId) -> bool {
    if new.is_placeholder() || state.external_id == *new {
        return false;
    }
    if state.external_id.is_placeholder() || state.external_id == *previous {
        info!(key = %state.key(), from = %state.external_id, to = %new,
            "Migrated external identifier");
        state.external_id = new.clone();
        return true;
    }
    warn!(key = %state.key(), current = %state.external_id, applied = %new,
        "External identifier changed concurrently, not migrating");
    false
}

/// Order-independent fingerprint of a record's sources.
fn inputs_fingerprint(state: &SyncState) -> String {
    let sources = serde_json::to_value(state.sorted_sources()).unwrap_or_default();
    ContentHash::of_value(&sources).into_string()
}
