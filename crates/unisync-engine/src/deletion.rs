//! Deletion protocol: release the external resource, then the finalizer.
//!
//! The finalizer stays in place until the external delete has succeeded (or
//! found nothing to delete), so removal of the record blocks on cleanup.

use tracing::{debug, info, warn};
use unisync_core::{ApiContext, SyncState};

use crate::engine::{ReconcileOutcome, SyncEngine};
use crate::error::SyncError;
use crate::report::SyncReport;

impl SyncEngine {
    /// Runs for records that are tombstoned or have lost their last source.
    pub(crate) async fn run_deletion(
        &self,
        state: SyncState,
    ) -> Result<ReconcileOutcome, SyncError> {
        let key = state.key();
        let tombstoned = state.is_deletion_requested();

        // A freshly created record may not have received its first source yet.
        if !tombstoned
            && !state.has_finalizer()
            && let Some(wait) = self.debouncer.remaining(&key)
        {
            return Ok(self.finish(&key, "debounced", ReconcileOutcome::RequeueAfter(wait)));
        }
        self.debouncer.forget(&key);

        if state.has_finalizer() {
            let fingerprint = format!("delete:{}", state.external_id);
            if let Some(wait) = self.backoff_remaining(&state, &fingerprint) {
                return Ok(self.finish(&key, "backoff", ReconcileOutcome::RequeueAfter(wait)));
            }

            if let Some(id) = state.external_id.real_id() {
                let ctx = ApiContext::from(&state);
                let rt = state.resource_type;
                match self.call(rt, "delete", self.api.delete(&ctx, rt, id)).await {
                    Ok(()) => info!(key = %key, external_id = %id, "Deleted external resource"),
                    Err(e) if e.is_not_found() => {
                        debug!(key = %key, external_id = %id, "External resource already gone")
                    }
                    Err(e) => {
                        warn!(key = %key, external_id = %id, error = %e,
                            "External delete failed, keeping finalizer");
                        return self
                            .record_failure(&key, fingerprint, format!("delete failed: {e}"))
                            .await;
                    }
                }
            } else {
                debug!(key = %key, "Placeholder identity, nothing to delete externally");
            }

            self.update_state(&key, |s| s.remove_finalizer()).await?;
            self.reporter.report(&SyncReport::from_state(&state).deleted());
        }

        if !tombstoned {
            // Orphaned: no sources and no explicit deletion request.
            if let Some(outcome) = self.store.delete_if_orphaned(&key).await? {
                debug!(key = %key, outcome = ?outcome, "Removed orphaned SyncState");
            }
        }

        Ok(self.finish(&key, "deleted", ReconcileOutcome::Done))
    }
}
