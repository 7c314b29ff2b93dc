#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use unisync_core::{
    ApiContext, ApiError, ConfigSource, EventBroadcaster, ExternalApi, ExternalId,
    ExternalResource, OwnerRef, ResourceType, SyncState, SyncStateKey,
};
use unisync_db_memory::InMemorySyncStateStorage;
use unisync_engine::{
    ConflictRetryer, Debouncer, EngineSettings, ReconcileOutcome, Scope, StatusReporter,
    SyncEngine, SyncReport, SyncStateStore,
};
use unisync_storage::{DynStorage, EventedStorage};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(Value),
    Update(String, Value),
    Delete(String),
    Get(String),
    ListByName(String),
}

/// In-process stand-in for the external service.
///
/// Every call is recorded. Identifiers come from a scripted list, then
/// `cf-<n>`. Failures queued with `fail_next` are returned by the next calls
/// in order.
#[derive(Default)]
pub struct FakeApi {
    calls: Mutex<Vec<Call>>,
    resources: Mutex<BTreeMap<String, Value>>,
    ids: Mutex<VecDeque<String>>,
    failures: Mutex<VecDeque<ApiError>>,
    delay: Mutex<Option<Duration>>,
    counter: Mutex<u32>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(ids: &[&str]) -> Self {
        let api = Self::new();
        api.ids
            .lock()
            .unwrap()
            .extend(ids.iter().map(|id| id.to_string()));
        api
    }

    pub fn fail_next(&self, error: ApiError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Removes a resource behind the engine's back.
    pub fn vanish(&self, id: &str) {
        self.resources.lock().unwrap().remove(id);
    }

    pub fn resource(&self, id: &str) -> Option<Value> {
        self.resources.lock().unwrap().get(id).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn deletes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Delete(_)))
            .count()
    }

    async fn enter(&self, call: Call) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(call);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn next_id(&self) -> String {
        if let Some(id) = self.ids.lock().unwrap().pop_front() {
            return id;
        }
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        format!("cf-{}", *counter)
    }
}

fn name_of(params: &Value) -> Option<String> {
    params.get("name").and_then(Value::as_str).map(str::to_string)
}

#[async_trait]
impl ExternalApi for FakeApi {
    async fn create(
        &self,
        _ctx: &ApiContext,
        _resource_type: ResourceType,
        params: &Value,
    ) -> Result<ExternalResource, ApiError> {
        self.enter(Call::Create(params.clone())).await?;
        let id = self.next_id();
        self.resources
            .lock()
            .unwrap()
            .insert(id.clone(), params.clone());
        let mut resource = ExternalResource::new(id).with_body(params.clone());
        resource.name = name_of(params);
        Ok(resource)
    }

    async fn update(
        &self,
        _ctx: &ApiContext,
        resource_type: ResourceType,
        id: &str,
        params: &Value,
    ) -> Result<ExternalResource, ApiError> {
        self.enter(Call::Update(id.to_string(), params.clone()))
            .await?;
        let mut resources = self.resources.lock().unwrap();
        let Some(stored) = resources.get_mut(id) else {
            return Err(ApiError::not_found(resource_type.as_str(), id));
        };
        *stored = params.clone();
        Ok(ExternalResource::new(id).with_body(params.clone()))
    }

    async fn delete(
        &self,
        _ctx: &ApiContext,
        resource_type: ResourceType,
        id: &str,
    ) -> Result<(), ApiError> {
        self.enter(Call::Delete(id.to_string())).await?;
        match self.resources.lock().unwrap().remove(id) {
            Some(_) => Ok(()),
            None => Err(ApiError::not_found(resource_type.as_str(), id)),
        }
    }

    async fn get(
        &self,
        _ctx: &ApiContext,
        resource_type: ResourceType,
        id: &str,
    ) -> Result<ExternalResource, ApiError> {
        self.enter(Call::Get(id.to_string())).await?;
        self.resources
            .lock()
            .unwrap()
            .get(id)
            .map(|body| ExternalResource::new(id).with_body(body.clone()))
            .ok_or_else(|| ApiError::not_found(resource_type.as_str(), id))
    }

    async fn list_by_name(
        &self,
        _ctx: &ApiContext,
        _resource_type: ResourceType,
        name: &str,
    ) -> Result<Vec<ExternalResource>, ApiError> {
        self.enter(Call::ListByName(name.to_string())).await?;
        Ok(self
            .resources
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, body)| name_of(body).as_deref() == Some(name))
            .map(|(id, body)| {
                ExternalResource::new(id.clone())
                    .with_name(name)
                    .with_body(body.clone())
            })
            .collect())
    }
}

/// Collects every report for assertions.
#[derive(Default)]
pub struct RecordingReporter {
    pub reports: Mutex<Vec<SyncReport>>,
}

impl StatusReporter for RecordingReporter {
    fn report(&self, report: &SyncReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

pub struct Harness {
    pub storage: DynStorage,
    pub broadcaster: Arc<EventBroadcaster>,
    pub store: Arc<SyncStateStore>,
    pub engine: Arc<SyncEngine>,
    pub api: Arc<FakeApi>,
    pub reporter: Arc<RecordingReporter>,
}

/// Settings without backoff so failed syncs can be retried immediately.
pub fn test_settings() -> EngineSettings {
    EngineSettings {
        error_backoff_base: Duration::ZERO,
        error_backoff_max: Duration::ZERO,
        ..EngineSettings::default()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::build(FakeApi::new(), Debouncer::disabled(), test_settings())
    }

    pub fn build(api: FakeApi, debouncer: Debouncer, settings: EngineSettings) -> Self {
        let broadcaster = EventBroadcaster::new_shared();
        let storage: DynStorage = Arc::new(EventedStorage::new(
            InMemorySyncStateStorage::new(),
            broadcaster.clone(),
        ));
        let store = Arc::new(SyncStateStore::new(
            storage.clone(),
            ConflictRetryer::new(settings.conflict_attempts),
            Arc::new(debouncer),
        ));
        let api = Arc::new(api);
        let reporter = Arc::new(RecordingReporter::default());
        let engine = Arc::new(
            SyncEngine::new(store.clone(), api.clone(), settings).with_reporter(reporter.clone()),
        );

        Self {
            storage,
            broadcaster,
            store,
            engine,
            api,
            reporter,
        }
    }

    pub fn scope() -> Scope {
        Scope::new("acct-1", None, "default")
    }

    /// Registers `config` from a cluster-scoped owner under its own placeholder.
    pub async fn register(
        &self,
        resource_type: ResourceType,
        owner: &str,
        priority: i32,
        config: Value,
    ) -> SyncStateKey {
        let owner = OwnerRef::cluster("FirewallRule", owner);
        let id = ExternalId::placeholder_for(&owner, None);
        self.register_at(resource_type, id, owner, priority, config)
            .await
    }

    pub async fn register_at(
        &self,
        resource_type: ResourceType,
        id: ExternalId,
        owner: OwnerRef,
        priority: i32,
        config: Value,
    ) -> SyncStateKey {
        let state = self
            .store
            .get_or_create(resource_type, id, &Self::scope())
            .await
            .unwrap();
        self.store
            .register(&state.key(), ConfigSource::new(owner, priority, config))
            .await
            .unwrap();
        state.key()
    }

    pub async fn state(&self, key: &SyncStateKey) -> Option<SyncState> {
        self.storage.read(key).await.unwrap()
    }

    /// Reconciles while the engine asks for an immediate requeue.
    pub async fn settle(&self, key: &SyncStateKey) -> ReconcileOutcome {
        for _ in 0..5 {
            let outcome = self.engine.reconcile(key).await.unwrap();
            if outcome != ReconcileOutcome::RequeueAfter(Duration::ZERO) {
                return outcome;
            }
        }
        panic!("{key} did not settle");
    }
}
