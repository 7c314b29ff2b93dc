//! CRUD and merge operations over the `SyncState` aggregate.
//!
//! Every mutation goes through [`ConflictRetryer`]; contributors reconcile
//! concurrently and share records.

use std::sync::Arc;

use tracing::{debug, info, warn};
use unisync_core::{ConfigSource, ExternalId, OwnerRef, ResourceType, SyncState, SyncStateKey};
use unisync_storage::{DeleteOutcome, DynStorage, StorageError};

use crate::debounce::Debouncer;
use crate::error::SyncError;
use crate::retry::ConflictRetryer;

/// Addressing context for a record created on first registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub account: String,
    pub zone: Option<String>,
    pub credentials_ref: String,
}

impl Scope {
    pub fn new(
        account: impl Into<String>,
        zone: Option<String>,
        credentials_ref: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            zone,
            credentials_ref: credentials_ref.into(),
        }
    }
}

/// Why [`SyncStateStore::register`] left a record untouched.
enum Rejection {
    Deleting,
    Collision(OwnerRef),
}

/// Result of [`SyncStateStore::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnregisterOutcome {
    /// No record or no matching source; nothing changed.
    NotRegistered,
    /// The source was removed and others remain.
    SourceRemoved { remaining: usize },
    /// The last source was removed and the record deleted (or tombstoned).
    Deleted(DeleteOutcome),
}

pub struct SyncStateStore {
    storage: DynStorage,
    retryer: ConflictRetryer,
    debouncer: Arc<Debouncer>,
}

impl SyncStateStore {
    pub fn new(storage: DynStorage, retryer: ConflictRetryer, debouncer: Arc<Debouncer>) -> Self {
        Self {
            storage,
            retryer,
            debouncer,
        }
    }

    pub fn storage(&self) -> &DynStorage {
        &self.storage
    }

    pub fn retryer(&self) -> ConflictRetryer {
        self.retryer
    }

    pub fn debouncer(&self) -> &Arc<Debouncer> {
        &self.debouncer
    }

    /// Returns the record for `external_id`, creating an empty one if absent.
    ///
    /// A real identifier also matches a record created under a placeholder and
    /// migrated since. Losing a create race returns the winner's record.
    pub async fn get_or_create(
        &self,
        resource_type: ResourceType,
        external_id: ExternalId,
        scope: &Scope,
    ) -> Result<SyncState, SyncError> {
        if let Some(existing) = self.lookup(resource_type, external_id.as_str()).await? {
            return Self::usable(existing);
        }

        let fresh = SyncState::new(
            resource_type,
            external_id,
            scope.account.clone(),
            scope.zone.clone(),
            scope.credentials_ref.clone(),
        );
        let key = fresh.key();

        match self.storage.create(&fresh).await {
            Ok(created) => {
                // Give the first registration time to land before an empty
                // record is treated as an orphan.
                self.debouncer.mark_pending(&key);
                info!(key = %key, external_id = %created.external_id, "Created SyncState");
                Ok(created)
            }
            Err(e) if e.is_already_exists() => {
                debug!(key = %key, "Lost create race, using existing SyncState");
                let existing = self
                    .storage
                    .read(&key)
                    .await?
                    .ok_or_else(|| StorageError::not_found(&key))?;
                Self::usable(existing)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn usable(state: SyncState) -> Result<SyncState, SyncError> {
        if state.is_deletion_requested() {
            return Err(SyncError::deletion_in_progress(state.key()));
        }
        Ok(state)
    }

    /// Upserts `source` into the record and persists it.
    ///
    /// The write happens even when the source is unchanged; deciding whether
    /// anything needs to be applied is left to the engine. Nothing is written
    /// to a record that is being deleted, or to one keyed by the placeholder
    /// of a different-kind owner with the same namespace and name.
    pub async fn register(
        &self,
        key: &SyncStateKey,
        source: ConfigSource,
    ) -> Result<SyncState, SyncError> {
        let storage = &self.storage;
        let mut changed = false;
        let mut rejected = None;

        let stored = self
            .retryer
            .run(
                move || storage.read(key),
                |state: &mut SyncState| {
                    rejected = Self::rejection(state, &source.owner_ref);
                    if rejected.is_some() {
                        return false;
                    }
                    changed = state.upsert_source(source.clone());
                    true
                },
                move |state: SyncState| async move {
                    storage.update(&state, state.version()).await
                },
            )
            .await?
            .ok_or_else(|| StorageError::not_found(key))?;

        if let Some(rejection) = rejected {
            return Err(match rejection {
                Rejection::Deleting => SyncError::deletion_in_progress(key),
                Rejection::Collision(existing) => {
                    warn!(key = %key, owner = %source.owner_ref, existing = %existing,
                        "Placeholder collision between owner kinds");
                    SyncError::identity_collision(key, &source.owner_ref, existing)
                }
            });
        }

        if changed {
            self.debouncer.mark_pending(key);
            debug!(key = %key, owner = %source.owner_ref, priority = source.priority,
                "Registered config source");
        }
        Ok(stored)
    }

    fn rejection(state: &SyncState, owner: &OwnerRef) -> Option<Rejection> {
        if state.is_deletion_requested() {
            return Some(Rejection::Deleting);
        }
        if state.name != ExternalId::placeholder_for(owner, None).as_str() {
            return None;
        }
        state
            .sources
            .iter()
            .map(|s| &s.owner_ref)
            .find(|o| {
                o.namespace == owner.namespace && o.name == owner.name && o.kind != owner.kind
            })
            .map(|o| Rejection::Collision(o.clone()))
    }

    /// Removes the source owned by `owner`, deleting the record with its last source.
    ///
    /// Unregistering an owner that is not (or no longer) registered is a no-op.
    pub async fn unregister(
        &self,
        key: &SyncStateKey,
        owner: &OwnerRef,
    ) -> Result<UnregisterOutcome, SyncError> {
        let storage = &self.storage;
        let mut removed = false;

        let stored = self
            .retryer
            .run(
                move || storage.read(key),
                |state: &mut SyncState| {
                    removed = state.remove_source(owner);
                    removed
                },
                move |state: SyncState| async move {
                    storage.update(&state, state.version()).await
                },
            )
            .await?;

        let Some(stored) = stored else {
            debug!(key = %key, owner = %owner, "Unregister of unknown SyncState ignored");
            return Ok(UnregisterOutcome::NotRegistered);
        };

        if !stored.sources.is_empty() {
            if !removed {
                return Ok(UnregisterOutcome::NotRegistered);
            }
            self.debouncer.mark_pending(key);
            debug!(key = %key, owner = %owner, remaining = stored.sources.len(),
                "Unregistered config source");
            return Ok(UnregisterOutcome::SourceRemoved {
                remaining: stored.sources.len(),
            });
        }

        // Sources are empty: a previous attempt may have persisted the empty
        // set without completing the delete, so this runs even if !removed.
        match self.delete_if_orphaned(key).await? {
            Some(outcome) => {
                info!(key = %key, owner = %owner, outcome = ?outcome,
                    "Last source unregistered, SyncState deleted");
                Ok(UnregisterOutcome::Deleted(outcome))
            }
            None if removed => Ok(UnregisterOutcome::Deleted(DeleteOutcome::Removed)),
            None => Ok(UnregisterOutcome::NotRegistered),
        }
    }

    /// Deletes the record if it still has no sources.
    ///
    /// Returns `None` if the record is gone or has been re-registered meanwhile.
    pub async fn delete_if_orphaned(
        &self,
        key: &SyncStateKey,
    ) -> Result<Option<DeleteOutcome>, SyncError> {
        let storage = &self.storage;

        let result = self
            .retryer
            .run(
                move || async move {
                    Ok::<_, StorageError>(storage.read(key).await?.map(|s| (s, None)))
                },
                |(state, _): &mut (SyncState, Option<DeleteOutcome>)| {
                    state.sources.is_empty() && !state.is_deletion_requested()
                },
                move |(state, _): (SyncState, Option<DeleteOutcome>)| async move {
                    let outcome = storage.delete(key, state.version()).await?;
                    Ok::<_, StorageError>((state, Some(outcome)))
                },
            )
            .await;

        match result {
            Ok(Some((_, Some(outcome)))) => Ok(Some(outcome)),
            Ok(Some((state, None))) if state.sources.is_empty() => {
                Ok(Some(DeleteOutcome::Tombstoned))
            }
            Ok(_) => Ok(None),
            // Removed concurrently between read and delete.
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Finds a record by storage name or by real external identifier.
    ///
    /// Not-found is `Ok(None)`, never an error.
    pub async fn lookup(
        &self,
        resource_type: ResourceType,
        key: &str,
    ) -> Result<Option<SyncState>, SyncError> {
        let by_key = SyncStateKey::new(resource_type, key);
        if let Some(state) = self.storage.read(&by_key).await? {
            return Ok(Some(state));
        }
        Ok(self.storage.find_by_external_id(resource_type, key).await?)
    }

    pub async fn list(
        &self,
        resource_type: Option<ResourceType>,
    ) -> Result<Vec<SyncState>, SyncError> {
        Ok(self.storage.list(resource_type).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use unisync_core::SyncPhase;
    use unisync_db_memory::create_storage;

    fn store() -> SyncStateStore {
        SyncStateStore::new(
            create_storage(),
            ConflictRetryer::default(),
            Arc::new(Debouncer::new(Duration::from_secs(5))),
        )
    }

    fn scope() -> Scope {
        Scope::new("acct-1", None, "default")
    }

    fn owner(name: &str) -> OwnerRef {
        OwnerRef::cluster("FirewallRule", name)
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = store();
        let id = ExternalId::placeholder_for(&owner("A"), None);

        let first = store
            .get_or_create(ResourceType::Rule, id.clone(), &scope())
            .await
            .unwrap();
        let second = store
            .get_or_create(ResourceType::Rule, id, &scope())
            .await
            .unwrap();

        assert_eq!(first.key(), second.key());
        assert_eq!(first.status.phase, SyncPhase::New);
        assert!(first.sources.is_empty());
        assert_eq!(store.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_does_not_duplicate() {
        let store = Arc::new(store());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .get_or_create(
                        ResourceType::Rule,
                        ExternalId::placeholder_for(&owner("A"), None),
                        &scope(),
                    )
                    .await
                    .unwrap()
                    .key()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().name, "pending-A");
        }
        assert_eq!(store.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_upserts_and_marks_pending() {
        let store = store();
        let state = store
            .get_or_create(
                ResourceType::Rule,
                ExternalId::placeholder_for(&owner("A"), None),
                &scope(),
            )
            .await
            .unwrap();
        let key = state.key();

        store
            .register(&key, ConfigSource::new(owner("A"), 10, json!({"name": "r1"})))
            .await
            .unwrap();
        let updated = store
            .register(&key, ConfigSource::new(owner("A"), 10, json!({"name": "r2"})))
            .await
            .unwrap();

        assert_eq!(updated.sources.len(), 1);
        assert_eq!(updated.sources[0].config, json!({"name": "r2"}));
        assert!(store.debouncer.is_pending(&key));
    }

    #[tokio::test]
    async fn test_lookup_by_real_id_after_migration() {
        let store = store();
        let state = store
            .get_or_create(
                ResourceType::Rule,
                ExternalId::placeholder_for(&owner("A"), None),
                &scope(),
            )
            .await
            .unwrap();

        let mut migrated = state.clone();
        migrated.external_id = ExternalId::real("cf-42").unwrap();
        store.storage().update(&migrated, state.version()).await.unwrap();

        let found = store.lookup(ResourceType::Rule, "cf-42").await.unwrap().unwrap();
        assert_eq!(found.key(), state.key());
        assert!(store.lookup(ResourceType::Rule, "cf-0").await.unwrap().is_none());

        // Registering by the real id reuses the placeholder-keyed record.
        let again = store
            .get_or_create(ResourceType::Rule, ExternalId::real("cf-42").unwrap(), &scope())
            .await
            .unwrap();
        assert_eq!(again.key(), state.key());
    }

    #[tokio::test]
    async fn test_unregister_last_source_deletes_record() {
        let store = store();
        let state = store
            .get_or_create(
                ResourceType::List,
                ExternalId::placeholder_for(&owner("A"), None),
                &scope(),
            )
            .await
            .unwrap();
        let key = state.key();
        store
            .register(&key, ConfigSource::new(owner("A"), 1, json!({"name": "l"})))
            .await
            .unwrap();
        store
            .register(&key, ConfigSource::new(owner("B"), 2, json!({"name": "l"})))
            .await
            .unwrap();

        let outcome = store.unregister(&key, &owner("B")).await.unwrap();
        assert_eq!(outcome, UnregisterOutcome::SourceRemoved { remaining: 1 });

        let outcome = store.unregister(&key, &owner("A")).await.unwrap();
        assert_eq!(outcome, UnregisterOutcome::Deleted(DeleteOutcome::Removed));
        assert!(store.lookup(ResourceType::List, &key.name).await.unwrap().is_none());

        // Repeating is a no-op, not an error.
        let outcome = store.unregister(&key, &owner("A")).await.unwrap();
        assert_eq!(outcome, UnregisterOutcome::NotRegistered);
    }

    #[tokio::test]
    async fn test_unregister_with_finalizer_tombstones() {
        let store = store();
        let state = store
            .get_or_create(
                ResourceType::Rule,
                ExternalId::placeholder_for(&owner("A"), None),
                &scope(),
            )
            .await
            .unwrap();
        let key = state.key();
        let mut registered = store
            .register(&key, ConfigSource::new(owner("A"), 1, json!({"name": "r"})))
            .await
            .unwrap();
        registered.add_finalizer();
        store
            .storage()
            .update(&registered, registered.version())
            .await
            .unwrap();

        let outcome = store.unregister(&key, &owner("A")).await.unwrap();
        assert_eq!(outcome, UnregisterOutcome::Deleted(DeleteOutcome::Tombstoned));

        let tombstoned = store.storage().read(&key).await.unwrap().unwrap();
        assert!(tombstoned.is_deletion_requested());

        let err = store
            .register(&key, ConfigSource::new(owner("A"), 1, json!({"name": "r"})))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::DeletionInProgress { .. }));
    }

    #[tokio::test]
    async fn test_register_on_tombstone_writes_nothing() {
        let store = store();
        let state = store
            .get_or_create(
                ResourceType::Rule,
                ExternalId::placeholder_for(&owner("A"), None),
                &scope(),
            )
            .await
            .unwrap();
        let key = state.key();
        let mut registered = store
            .register(&key, ConfigSource::new(owner("A"), 1, json!({"name": "r"})))
            .await
            .unwrap();
        registered.add_finalizer();
        store
            .storage()
            .update(&registered, registered.version())
            .await
            .unwrap();
        store.unregister(&key, &owner("A")).await.unwrap();
        let tombstoned = store.storage().read(&key).await.unwrap().unwrap();

        let err = store
            .register(&key, ConfigSource::new(owner("B"), 5, json!({"name": "late"})))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::DeletionInProgress { .. }));

        let after = store.storage().read(&key).await.unwrap().unwrap();
        assert_eq!(after.version(), tombstoned.version());
        assert!(after.sources.is_empty());
    }

    #[tokio::test]
    async fn test_hyphenated_owners_get_separate_records() {
        let store = store();
        let first = OwnerRef::new("FirewallRule", "team", "a-www");
        let second = OwnerRef::new("FirewallRule", "team-a", "www");

        let mut keys = Vec::new();
        for owner in [&first, &second] {
            let state = store
                .get_or_create(
                    ResourceType::Rule,
                    ExternalId::placeholder_for(owner, None),
                    &scope(),
                )
                .await
                .unwrap();
            store
                .register(&state.key(), ConfigSource::new(owner.clone(), 1, json!({})))
                .await
                .unwrap();
            keys.push(state.key());
        }

        assert_ne!(keys[0], keys[1]);
        for (key, owner) in keys.iter().zip([&first, &second]) {
            let stored = store.storage().read(key).await.unwrap().unwrap();
            assert_eq!(stored.sources.len(), 1);
            assert_eq!(&stored.sources[0].owner_ref, owner);
        }
    }

    #[tokio::test]
    async fn test_same_name_different_kind_is_rejected() {
        let store = store();
        let rule_owner = OwnerRef::cluster("FirewallRule", "shared");
        let list_owner = OwnerRef::cluster("IpList", "shared");
        let state = store
            .get_or_create(
                ResourceType::Rule,
                ExternalId::placeholder_for(&rule_owner, None),
                &scope(),
            )
            .await
            .unwrap();
        let key = state.key();
        let registered = store
            .register(&key, ConfigSource::new(rule_owner.clone(), 1, json!({"name": "r"})))
            .await
            .unwrap();

        // Same placeholder, different kind.
        assert_eq!(
            ExternalId::placeholder_for(&list_owner, None).as_str(),
            key.name
        );
        let err = store
            .register(&key, ConfigSource::new(list_owner, 1, json!({"name": "l"})))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::IdentityCollision { .. }));
        assert_eq!(err.category(), "conflict");

        let after = store.storage().read(&key).await.unwrap().unwrap();
        assert_eq!(after.version(), registered.version());
        assert_eq!(after.sources.len(), 1);
        assert_eq!(after.sources[0].owner_ref, rule_owner);

        // The original owner can still update its own source.
        store
            .register(&key, ConfigSource::new(rule_owner, 2, json!({"name": "r2"})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unregister_unknown_owner_is_noop() {
        let store = store();
        let state = store
            .get_or_create(
                ResourceType::Rule,
                ExternalId::placeholder_for(&owner("A"), None),
                &scope(),
            )
            .await
            .unwrap();
        let key = state.key();
        store
            .register(&key, ConfigSource::new(owner("A"), 1, json!({"name": "r"})))
            .await
            .unwrap();

        let outcome = store.unregister(&key, &owner("Z")).await.unwrap();
        assert_eq!(outcome, UnregisterOutcome::NotRegistered);
        assert_eq!(store.storage().read(&key).await.unwrap().unwrap().sources.len(), 1);
    }
}
