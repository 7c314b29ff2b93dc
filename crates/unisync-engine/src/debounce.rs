//! Per-identity cooldown gate for bursts of changes.
//!
//! Every registration pushes the identity's deadline to `now + window`.
//! Reconciles that run before the deadline return early and are requeued for
//! the remaining time, so a burst collapses into one reconcile that sees the
//! settled state.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use unisync_core::SyncStateKey;

/// Identity → deadline table.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    deadlines: DashMap<SyncStateKey, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadlines: DashMap::new(),
        }
    }

    /// A debouncer that never reports anything as pending.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Marks `key` as having a pending update for the configured window.
    pub fn mark_pending(&self, key: &SyncStateKey) {
        self.mark_pending_for(key, self.window);
    }

    /// Marks `key` as pending for `window`, extending any existing deadline.
    pub fn mark_pending_for(&self, key: &SyncStateKey, window: Duration) {
        if window.is_zero() {
            return;
        }
        let deadline = Instant::now() + window;
        self.deadlines
            .entry(key.clone())
            .and_modify(|d| *d = (*d).max(deadline))
            .or_insert(deadline);
    }

    pub fn is_pending(&self, key: &SyncStateKey) -> bool {
        self.remaining(key).is_some()
    }

    /// Time left until `key` settles, or `None` if it is not pending.
    ///
    /// Expired entries are removed on access.
    pub fn remaining(&self, key: &SyncStateKey) -> Option<Duration> {
        let now = Instant::now();
        let deadline = *self.deadlines.get(key)?;
        if deadline > now {
            return Some(deadline - now);
        }
        self.deadlines.remove_if(key, |_, d| *d <= now);
        None
    }

    pub fn forget(&self, key: &SyncStateKey) {
        self.deadlines.remove(key);
    }

    /// Removes expired entries. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.deadlines.retain(|_, deadline| {
            if *deadline <= now {
                removed += 1;
                false
            } else {
                true
            }
        });

        removed
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unisync_core::ResourceType;

    fn key(name: &str) -> SyncStateKey {
        SyncStateKey::new(ResourceType::Rule, name)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_until_window_elapses() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        debouncer.mark_pending(&key("a"));

        assert!(debouncer.is_pending(&key("a")));
        assert!(!debouncer.is_pending(&key("b")));

        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(debouncer.remaining(&key("a")), Some(Duration::from_millis(200)));

        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(!debouncer.is_pending(&key("a")));
        assert!(debouncer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_extends_deadline() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        for _ in 0..5 {
            debouncer.mark_pending(&key("a"));
            tokio::time::advance(Duration::from_millis(400)).await;
        }
        // Last mark was 400ms ago.
        assert_eq!(debouncer.remaining(&key("a")), Some(Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired() {
        let debouncer = Debouncer::new(Duration::from_millis(100));
        debouncer.mark_pending(&key("a"));
        debouncer.mark_pending_for(&key("b"), Duration::from_secs(10));

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(debouncer.cleanup_expired(), 1);
        assert_eq!(debouncer.len(), 1);

        debouncer.forget(&key("b"));
        assert!(debouncer.is_empty());
    }

    #[test]
    fn test_disabled_never_pending() {
        let debouncer = Debouncer::disabled();
        debouncer.mark_pending(&key("a"));
        assert!(!debouncer.is_pending(&key("a")));
        assert!(debouncer.is_empty());
    }
}
