//! The `SyncState` aggregate: one record per external resource, tracking every
//! contributing source and the outcome of the last sync.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use time::OffsetDateTime;

use crate::identity::{ExternalId, OwnerRef, SyncStateKey};
use crate::resource_type::ResourceType;

/// Finalizer held by the engine while it owns cleanup of the external resource.
pub const SYNC_FINALIZER: &str = "unisync.io/sync-state";

/// A configuration fragment contributed by one declarative object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSource {
    pub owner_ref: OwnerRef,
    /// Lower sorts first and wins for one-contributor resource types.
    pub priority: i32,
    pub config: Value,
}

impl ConfigSource {
    pub fn new(owner_ref: OwnerRef, priority: i32, config: Value) -> Self {
        Self {
            owner_ref,
            priority,
            config,
        }
    }

    /// Total order used for merging: priority, then owner as a stable tiebreak.
    pub fn merge_order(a: &ConfigSource, b: &ConfigSource) -> Ordering {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.owner_ref.cmp(&b.owner_ref))
    }
}

/// Sync lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SyncPhase {
    #[default]
    New,
    Syncing,
    Synced,
    Error,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::New => "New",
            SyncPhase::Syncing => "Syncing",
            SyncPhase::Synced => "Synced",
            SyncPhase::Error => "Error",
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record metadata owned by the storage layer and the deletion protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStateMeta {
    /// Optimistic-concurrency token assigned by the storage backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    /// Tombstone set when deletion was requested while finalizers were present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(with = "time::serde::rfc3339::option")]
    pub deletion_requested_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Default for SyncStateMeta {
    fn default() -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            version: None,
            finalizers: Vec::new(),
            deletion_requested_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Observed outcome of the last reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStateStatus {
    pub phase: SyncPhase,
    /// Hash of the last configuration confirmed applied externally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_synced_at: Option<OffsetDateTime>,
    /// Fingerprint of the inputs of the last attempt, successful or not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_attempt_at: Option<OffsetDateTime>,
}

/// Aggregate root for one external resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub resource_type: ResourceType,
    /// Storage key name; see [`SyncStateKey`].
    pub name: String,
    pub external_id: ExternalId,
    pub account_scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_scope: Option<String>,
    pub credentials_ref: String,
    #[serde(default)]
    pub sources: Vec<ConfigSource>,
    #[serde(default)]
    pub status: SyncStateStatus,
    #[serde(default)]
    pub meta: SyncStateMeta,
}

impl SyncState {
    /// A fresh record with no sources in phase `New`, keyed by `external_id`.
    pub fn new(
        resource_type: ResourceType,
        external_id: ExternalId,
        account_scope: impl Into<String>,
        zone_scope: Option<String>,
        credentials_ref: impl Into<String>,
    ) -> Self {
        Self {
            resource_type,
            name: external_id.as_str().to_string(),
            external_id,
            account_scope: account_scope.into(),
            zone_scope,
            credentials_ref: credentials_ref.into(),
            sources: Vec::new(),
            status: SyncStateStatus::default(),
            meta: SyncStateMeta::default(),
        }
    }

    pub fn key(&self) -> SyncStateKey {
        SyncStateKey::new(self.resource_type, self.name.clone())
    }

    pub fn version(&self) -> Option<&str> {
        self.meta.version.as_deref()
    }

    /// Inserts or replaces the source owned by `source.owner_ref`.
    ///
    /// Returns `true` when the stored sources changed.
    pub fn upsert_source(&mut self, source: ConfigSource) -> bool {
        match self
            .sources
            .iter_mut()
            .find(|s| s.owner_ref == source.owner_ref)
        {
            Some(existing) if *existing == source => false,
            Some(existing) => {
                *existing = source;
                true
            }
            None => {
                self.sources.push(source);
                true
            }
        }
    }

    /// Removes the source owned by `owner`. Returns `true` if one was removed.
    pub fn remove_source(&mut self, owner: &OwnerRef) -> bool {
        let before = self.sources.len();
        self.sources.retain(|s| &s.owner_ref != owner);
        self.sources.len() != before
    }

    pub fn has_source(&self, owner: &OwnerRef) -> bool {
        self.sources.iter().any(|s| &s.owner_ref == owner)
    }

    /// Sources in merge order (priority ascending, owner as tiebreak).
    pub fn sorted_sources(&self) -> Vec<&ConfigSource> {
        let mut sorted: Vec<&ConfigSource> = self.sources.iter().collect();
        sorted.sort_by(|a, b| ConfigSource::merge_order(a, b));
        sorted
    }

    pub fn has_finalizer(&self) -> bool {
        self.meta.finalizers.iter().any(|f| f == SYNC_FINALIZER)
    }

    /// Returns `true` if the finalizer was added.
    pub fn add_finalizer(&mut self) -> bool {
        if self.has_finalizer() {
            return false;
        }
        self.meta.finalizers.push(SYNC_FINALIZER.to_string());
        true
    }

    /// Returns `true` if the finalizer was removed.
    pub fn remove_finalizer(&mut self) -> bool {
        let before = self.meta.finalizers.len();
        self.meta.finalizers.retain(|f| f != SYNC_FINALIZER);
        self.meta.finalizers.len() != before
    }

    pub fn is_deletion_requested(&self) -> bool {
        self.meta.deletion_requested_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> SyncState {
        let owner = OwnerRef::cluster("FirewallRule", "A");
        SyncState::new(
            ResourceType::Rule,
            ExternalId::placeholder_for(&owner, None),
            "acct-1",
            None,
            "default",
        )
    }

    #[test]
    fn test_new_state_is_keyed_by_external_id() {
        let s = state();
        assert_eq!(s.key(), SyncStateKey::new(ResourceType::Rule, "pending-A"));
        assert_eq!(s.status.phase, SyncPhase::New);
        assert!(s.sources.is_empty());
        assert!(!s.has_finalizer());
    }

    #[test]
    fn test_upsert_source_replaces_by_owner() {
        let mut s = state();
        let owner = OwnerRef::cluster("FirewallRule", "A");

        assert!(s.upsert_source(ConfigSource::new(owner.clone(), 10, json!({"name": "r1"}))));
        assert!(!s.upsert_source(ConfigSource::new(owner.clone(), 10, json!({"name": "r1"}))));
        assert!(s.upsert_source(ConfigSource::new(owner.clone(), 10, json!({"name": "r2"}))));

        assert_eq!(s.sources.len(), 1);
        assert_eq!(s.sources[0].config, json!({"name": "r2"}));
    }

    #[test]
    fn test_remove_source() {
        let mut s = state();
        let a = OwnerRef::cluster("FirewallRule", "A");
        let b = OwnerRef::cluster("FirewallRule", "B");
        s.upsert_source(ConfigSource::new(a.clone(), 1, json!({})));
        s.upsert_source(ConfigSource::new(b.clone(), 2, json!({})));

        assert!(s.remove_source(&a));
        assert!(!s.remove_source(&a));
        assert!(s.has_source(&b));
    }

    #[test]
    fn test_sorted_sources_is_independent_of_insertion_order() {
        let mut s = state();
        s.upsert_source(ConfigSource::new(OwnerRef::cluster("R", "b"), 5, json!({})));
        s.upsert_source(ConfigSource::new(OwnerRef::cluster("R", "c"), 1, json!({})));
        s.upsert_source(ConfigSource::new(OwnerRef::cluster("R", "a"), 5, json!({})));

        let names: Vec<&str> = s
            .sorted_sources()
            .iter()
            .map(|src| src.owner_ref.name.as_str())
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_finalizer_helpers() {
        let mut s = state();
        assert!(s.add_finalizer());
        assert!(!s.add_finalizer());
        assert!(s.has_finalizer());
        assert!(s.remove_finalizer());
        assert!(!s.remove_finalizer());
    }

    #[test]
    fn test_sync_state_json_shape() {
        let mut s = state();
        s.upsert_source(ConfigSource::new(
            OwnerRef::cluster("FirewallRule", "A"),
            10,
            json!({"name": "r1"}),
        ));
        let value = serde_json::to_value(&s).unwrap();
        assert_eq!(value["resourceType"], json!("Rule"));
        assert_eq!(value["externalId"], json!("pending-A"));
        assert_eq!(value["sources"][0]["ownerRef"]["name"], json!("A"));
        assert_eq!(value["status"]["phase"], json!("New"));

        let back: SyncState = serde_json::from_value(value).unwrap();
        assert_eq!(back.key(), s.key());
    }
}
