//! Engine metrics, recorded through the `metrics` facade.
//!
//! Nothing is exported unless the host process installs a recorder.

use metrics::counter;
use unisync_core::{ApiError, ResourceType};

/// Metric names as constants for consistency.
pub mod names {
    pub const RECONCILE_TOTAL: &str = "unisync_reconcile_total";
    pub const EXTERNAL_CALLS_TOTAL: &str = "unisync_external_calls_total";
    pub const CONFLICT_RETRIES_TOTAL: &str = "unisync_conflict_retries_total";
    pub const DEBOUNCED_TOTAL: &str = "unisync_debounced_total";
}

/// Record the outcome of one reconcile invocation.
pub fn record_reconcile(resource_type: ResourceType, outcome: &'static str) {
    counter!(
        names::RECONCILE_TOTAL,
        "resource_type" => resource_type.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record one call to the external API.
pub fn record_external_call<T>(
    resource_type: ResourceType,
    operation: &'static str,
    result: &Result<T, ApiError>,
) {
    let result = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    counter!(
        names::EXTERNAL_CALLS_TOTAL,
        "resource_type" => resource_type.as_str(),
        "operation" => operation,
        "result" => result
    )
    .increment(1);
}

pub fn record_conflict_retry() {
    counter!(names::CONFLICT_RETRIES_TOTAL).increment(1);
}

pub fn record_debounced(resource_type: ResourceType) {
    counter!(names::DEBOUNCED_TOTAL, "resource_type" => resource_type.as_str()).increment(1);
}
