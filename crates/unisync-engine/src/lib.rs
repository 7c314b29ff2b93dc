//! # unisync-engine
//!
//! Aggregation and reconciliation of `SyncState` records.
//!
//! ## Components
//!
//! - [`ConflictRetryer`]: fetch/mutate/persist with retry on version conflicts
//! - [`Debouncer`]: per-identity cooldown during bursts of registrations
//! - [`SyncStateStore`]: get-or-create, register, unregister, lookup
//! - [`SyncEngine`]: reconcile one record against the external API, including
//!   the deletion protocol and placeholder → real identity migration
//! - [`ReferenceResolver`]: id / local name / display name resolution
//! - [`Controller`]: work queue and worker pool driven by storage events
//!
//! ## Example
//!
//! ```ignore
//! let debouncer = Arc::new(Debouncer::new(Duration::from_secs(2)));
//! let store = Arc::new(SyncStateStore::new(storage, ConflictRetryer::default(), debouncer));
//! let engine = Arc::new(SyncEngine::new(store.clone(), api, EngineSettings::default()));
//!
//! let state = store.get_or_create(ResourceType::Rule, placeholder, &scope).await?;
//! store.register(&state.key(), source).await?;
//! engine.reconcile(&state.key()).await?;
//! ```

pub mod controller;
pub mod debounce;
mod deletion;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod report;
pub mod resolver;
pub mod retry;
pub mod store;

pub use controller::{Controller, ControllerSettings, WorkQueue};
pub use debounce::Debouncer;
pub use engine::{EngineSettings, ReconcileOutcome, SyncEngine, migrate_identity};
pub use error::{ResolveError, SyncError};
pub use report::{DynStatusReporter, StatusReporter, SyncReport, TracingReporter};
pub use resolver::{
    LocalObject, ObjectLookup, ReferenceResolver, ResourceRef, Resolved, SyncStateObjectLookup,
};
pub use retry::{ConflictRetryer, DEFAULT_CONFLICT_ATTEMPTS};
pub use store::{Scope, SyncStateStore, UnregisterOutcome};
