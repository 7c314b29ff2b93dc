//! Work queue and worker pool feeding keys to the engine.
//!
//! - A key is in the queue at most once.
//! - A key being processed is never handed to a second worker; changes that
//!   arrive meanwhile mark it dirty and it is queued again when the worker
//!   finishes.
//! - Storage change events enqueue their key; a lagged subscription triggers
//!   a full resync.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use unisync_core::{EventBroadcaster, SyncStateKey};
use unisync_storage::DynStorage;

use crate::engine::{ReconcileOutcome, SyncEngine};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub workers: usize,
    /// How often expired debounce entries are purged.
    pub cleanup_interval: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<SyncStateKey>,
    queued: HashSet<SyncStateKey>,
    processing: HashSet<SyncStateKey>,
    dirty: HashSet<SyncStateKey>,
}

/// Deduplicating work queue with per-key mutual exclusion.
#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    /// Earliest pending delayed add per key.
    scheduled: DashMap<SyncStateKey, Instant>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // Every critical section leaves the sets consistent, so poisoning is ignored.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add(&self, key: SyncStateKey) {
        let mut state = self.lock();
        if state.processing.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        if state.queued.insert(key.clone()) {
            state.queue.push_back(key);
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Adds `key` after `delay`, unless an earlier add is already scheduled.
    pub fn add_after(self: &Arc<Self>, key: SyncStateKey, delay: Duration, cancel: &CancellationToken) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let deadline = Instant::now() + delay;
        let mut replaced = false;
        self.scheduled
            .entry(key.clone())
            .and_modify(|existing| {
                if deadline < *existing {
                    *existing = deadline;
                    replaced = true;
                }
            })
            .or_insert_with(|| {
                replaced = true;
                deadline
            });
        if !replaced {
            return;
        }

        let queue = Arc::clone(self);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    // A later reschedule to an earlier deadline supersedes this timer.
                    if queue.scheduled.remove_if(&key, |_, d| *d == deadline).is_some() {
                        queue.add(key);
                    }
                }
            }
        });
    }

    /// Waits for the next key. Returns `None` once `cancel` fires.
    pub async fn next(&self, cancel: &CancellationToken) -> Option<SyncStateKey> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.queued.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = notified => {}
            }
        }
    }

    /// Marks `key` finished, re-queueing it if it changed meanwhile.
    pub fn done(&self, key: &SyncStateKey) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.remove(key) && state.queued.insert(key.clone()) {
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct Controller {
    engine: Arc<SyncEngine>,
    storage: DynStorage,
    broadcaster: Arc<EventBroadcaster>,
    queue: Arc<WorkQueue>,
    settings: ControllerSettings,
}

impl Controller {
    pub fn new(
        engine: Arc<SyncEngine>,
        broadcaster: Arc<EventBroadcaster>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            storage: engine.store().storage().clone(),
            engine,
            broadcaster,
            queue: Arc::new(WorkQueue::new()),
            settings,
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Runs until `cancel` fires.
    ///
    /// In-flight reconciles are dropped at their next await point on shutdown.
    pub async fn run(&self, cancel: CancellationToken) {
        // Subscribe before the initial listing so no change falls in between.
        let events = self.broadcaster.subscribe();
        self.resync().await;

        let mut tasks = JoinSet::new();
        for worker in 0..self.settings.workers.max(1) {
            tasks.spawn(worker_loop(
                worker,
                self.engine.clone(),
                self.queue.clone(),
                cancel.clone(),
            ));
        }
        tasks.spawn(event_pump(
            events,
            self.storage.clone(),
            self.queue.clone(),
            cancel.clone(),
        ));
        tasks.spawn(cleanup_loop(
            self.engine.clone(),
            self.settings.cleanup_interval,
            cancel.clone(),
        ));

        info!(workers = self.settings.workers.max(1), "Controller started");
        cancel.cancelled().await;

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Controller task failed");
            }
        }
        info!("Controller stopped");
    }

    /// Enqueues every stored record.
    pub async fn resync(&self) {
        resync(&self.storage, &self.queue).await;
    }
}

async fn resync(storage: &DynStorage, queue: &WorkQueue) {
    match storage.list(None).await {
        Ok(states) => {
            debug!(count = states.len(), "Full resync");
            for state in states {
                queue.add(state.key());
            }
        }
        Err(e) => error!(error = %e, "Full resync failed"),
    }
}

async fn worker_loop(
    worker: usize,
    engine: Arc<SyncEngine>,
    queue: Arc<WorkQueue>,
    cancel: CancellationToken,
) {
    while let Some(key) = queue.next(&cancel).await {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = engine.reconcile(&key) => outcome,
        };

        match outcome {
            Ok(ReconcileOutcome::Done) => {}
            Ok(ReconcileOutcome::RequeueAfter(delay)) => {
                queue.add_after(key.clone(), delay, &cancel);
            }
            Err(e) => {
                let delay = engine.settings().error_backoff(1);
                warn!(worker, key = %key, error = %e, retry_in_ms = delay.as_millis() as u64,
                    "Reconcile failed");
                queue.add_after(key.clone(), delay, &cancel);
            }
        }
        queue.done(&key);
    }
    debug!(worker, "Worker stopped");
}

async fn event_pump(
    mut events: tokio::sync::broadcast::Receiver<unisync_core::SyncStateEvent>,
    storage: DynStorage,
    queue: Arc<WorkQueue>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => queue.add(event.key),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Change events lagged, resyncing");
                    resync(&storage, &queue).await;
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

async fn cleanup_loop(engine: Arc<SyncEngine>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let removed = engine.store().debouncer().cleanup_expired();
                if removed > 0 {
                    debug!(removed, "Purged expired debounce entries");
                }
            }
        }
    }
}
