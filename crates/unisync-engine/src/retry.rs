//! Retry-on-conflict combinator for read-modify-write persistence.

use std::future::Future;

use tracing::debug;
use unisync_storage::StorageError;

use crate::metrics;

/// Default number of fetch/mutate/persist cycles before giving up.
pub const DEFAULT_CONFLICT_ATTEMPTS: u32 = 5;

/// Runs fetch → mutate → persist, restarting the whole cycle on a version
/// conflict.
///
/// Conflicts are expected to be transient, so there is no delay between
/// attempts. Every attempt works on a freshly fetched record.
#[derive(Debug, Clone, Copy)]
pub struct ConflictRetryer {
    max_attempts: u32,
}

impl ConflictRetryer {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Applies `mutate` to the latest record and persists it.
    ///
    /// - `fetch` returns the current record, or `None` if it no longer exists,
    ///   in which case `Ok(None)` is returned without calling `mutate`.
    /// - `mutate` edits the record in place and returns whether it should be
    ///   persisted. Returning `false` yields the fetched record unchanged.
    /// - `persist` writes the record and returns the stored version.
    ///
    /// # Errors
    ///
    /// Non-conflict errors are returned immediately. When every attempt hits a
    /// conflict, the last `StorageError::VersionConflict` is returned.
    pub async fn run<T, Fetch, FetchFut, Mutate, Persist, PersistFut>(
        &self,
        mut fetch: Fetch,
        mut mutate: Mutate,
        mut persist: Persist,
    ) -> Result<Option<T>, StorageError>
    where
        Fetch: FnMut() -> FetchFut,
        FetchFut: Future<Output = Result<Option<T>, StorageError>>,
        Mutate: FnMut(&mut T) -> bool,
        Persist: FnMut(T) -> PersistFut,
        PersistFut: Future<Output = Result<T, StorageError>>,
    {
        let mut attempt = 1;
        loop {
            let Some(mut record) = fetch().await? else {
                return Ok(None);
            };

            if !mutate(&mut record) {
                return Ok(Some(record));
            }

            match persist(record).await {
                Ok(stored) => return Ok(Some(stored)),
                Err(e) if e.is_version_conflict() && attempt < self.max_attempts => {
                    debug!(attempt, error = %e, "Version conflict, retrying with fresh read");
                    metrics::record_conflict_retry();
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for ConflictRetryer {
    fn default() -> Self {
        Self::new(DEFAULT_CONFLICT_ATTEMPTS)
    }
}
