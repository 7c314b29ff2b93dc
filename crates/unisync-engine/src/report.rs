//! Mirroring sync outcomes onto contributing objects.

use std::sync::Arc;

use tracing::{info, warn};
use unisync_core::{OwnerRef, SyncPhase, SyncState, SyncStateKey};

/// Outcome of one sync attempt or deletion, addressed to every contributor.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub key: SyncStateKey,
    pub external_id: String,
    pub phase: SyncPhase,
    /// Failure message for `Error`, absent otherwise.
    pub message: Option<String>,
    pub owners: Vec<OwnerRef>,
    /// Set when the external resource has been removed.
    pub deleted: bool,
}

impl SyncReport {
    pub fn from_state(state: &SyncState) -> Self {
        Self {
            key: state.key(),
            external_id: state.external_id.to_string(),
            phase: state.status.phase,
            message: state.status.last_error.clone(),
            owners: state.sources.iter().map(|s| s.owner_ref.clone()).collect(),
            deleted: false,
        }
    }

    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }
}

/// Receives a report after every sync attempt and completed deletion.
pub trait StatusReporter: Send + Sync {
    fn report(&self, report: &SyncReport);
}

pub type DynStatusReporter = Arc<dyn StatusReporter>;

/// Emits one human-readable tracing event per contributing owner.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl StatusReporter for TracingReporter {
    fn report(&self, report: &SyncReport) {
        for owner in &report.owners {
            if report.deleted {
                info!(owner = %owner, key = %report.key, external_id = %report.external_id,
                    "External resource deleted");
                continue;
            }
            match (&report.phase, &report.message) {
                (SyncPhase::Error, Some(message)) => {
                    warn!(owner = %owner, key = %report.key, error = %message, "Sync failed")
                }
                (phase, _) => info!(
                    owner = %owner,
                    key = %report.key,
                    external_id = %report.external_id,
                    phase = %phase,
                    "Sync status changed"
                ),
            }
        }
    }
}
