//! # unisync-core
//!
//! Domain model shared by every unisync crate: the resource-type catalog,
//! the `SyncState` aggregate and its identities, typed contributor configs
//! with their merge policies, content hashing, the external API capability
//! and the change-event broadcaster.

pub mod config;
pub mod error;
pub mod events;
pub mod external;
pub mod hash;
pub mod identity;
pub mod resource_type;
pub mod sync_state;

pub use config::{
    extract_config, DnsRecordConfig, ListConfig, ListItem, MergedConfig, RuleConfig,
    RulesetConfig, RulesetRule,
};
pub use error::{CoreError, ErrorCategory, Result};
pub use events::{EventBroadcaster, SyncStateEvent, SyncStateEventType};
pub use external::{ApiContext, ApiError, DynExternalApi, ExternalApi, ExternalResource};
pub use hash::{content_hash, ContentHash};
pub use identity::{ExternalId, OwnerRef, SyncStateKey, PLACEHOLDER_PREFIX};
pub use resource_type::{ContributionMode, ResourceType};
pub use sync_state::{
    ConfigSource, SyncPhase, SyncState, SyncStateMeta, SyncStateStatus, SYNC_FINALIZER,
};
