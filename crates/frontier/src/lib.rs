mod memory;
mod sqlite;

pub use memory::MemoryFrontier;
pub use sqlite::SqliteFrontier;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use darc_core::config::FrontierConfig;
use darc_core::{CrawlError, Link, LinkHash, PoolKind, VisitKind};

/// A held per-hash lock (spec.md §4.2 `acquire-lock`/`release-lock`). Drop
/// releases it; there is no separate release call needed by callers beyond
/// dropping the token, matching the `Frontier::release_lock` signature for
/// symmetry with the written contract.
pub type LockToken = tokio::sync::OwnedMutexGuard<()>;

/// The dual task-queue, host-dedup, visit-log and locking contract of
/// spec.md §4.2. Implemented by either an in-process map (`MemoryFrontier`)
/// or a SQLite-backed store (`SqliteFrontier`) — the "remote key-value
/// store with an atomic lock primitive" backing option — selected at
/// startup by `FrontierConfig::backend`.
#[async_trait]
pub trait Frontier: Send + Sync {
    /// Insert links into `queue`, ready to be popped immediately.
    /// Deduplicated by hash; an existing entry whose `not-before-time` has
    /// not yet passed is left untouched. Returns the subset of `links`
    /// never observed before by this frontier (across either queue) — the
    /// "first-seen" set callers log to `link.csv` (spec.md §6, §8 P6).
    async fn add_many(&self, queue: PoolKind, links: &[Link]) -> Result<Vec<Link>, CrawlError>;

    /// Same dedup contract as `add_many`, but a fresh insert is not ready
    /// until `now + delay` (used for backoff re-enqueues in the fetch/render
    /// worker state machines). Returns the first-seen subset, same as
    /// `add_many`.
    async fn add_many_delayed(&self, queue: PoolKind, links: &[Link], delay: Duration) -> Result<Vec<Link>, CrawlError>;

    /// Remove up to `max` ready entries, FIFO by enqueue-time, ties broken
    /// lexicographically by hash. Fewer (including zero) are returned when
    /// nothing is currently ready.
    async fn pop(&self, queue: PoolKind, max: usize) -> Result<Vec<Link>, CrawlError>;

    /// Idempotent removal of one entry from a queue.
    async fn drop_link(&self, queue: PoolKind, hash: &LinkHash) -> Result<(), CrawlError>;

    /// Number of entries currently sitting in `queue`, ready or not. Used by
    /// the scheduler's `REBOOT` check (spec.md §4.10 step 2), which must
    /// observe both queues empty before terminating even though a single
    /// process only pops from one of them.
    async fn queue_len(&self, queue: PoolKind) -> Result<usize, CrawlError>;

    async fn has_host(&self, host: &str) -> Result<bool, CrawlError>;
    async fn mark_host(&self, host: &str) -> Result<(), CrawlError>;

    async fn record_visit(&self, hash: &LinkHash, kind: VisitKind, t: DateTime<Utc>) -> Result<(), CrawlError>;
    async fn last_visit(&self, hash: &LinkHash, kind: VisitKind) -> Result<Option<DateTime<Utc>>, CrawlError>;

    /// Blocks up to `blocking_timeout` for exclusive access to `hash`,
    /// failing with `LockBusy` on expiry (spec.md §4.7 step 2).
    async fn acquire_lock(&self, hash: &LinkHash, blocking_timeout: Duration) -> Result<LockToken, CrawlError>;

    fn release_lock(&self, token: LockToken) {
        drop(token);
    }
}

/// Build the configured frontier backend (spec.md §4.2 "Backing options").
pub fn build(config: &FrontierConfig) -> Result<Box<dyn Frontier>, CrawlError> {
    match config.backend.as_str() {
        "memory" => Ok(Box::new(MemoryFrontier::new())),
        "sqlite" => {
            let path = config
                .sqlite_path
                .as_deref()
                .ok_or_else(|| CrawlError::Config("sqlite frontier backend requires frontier.sqlite_path".into()))?;
            Ok(Box::new(SqliteFrontier::open(path)?))
        }
        other => Err(CrawlError::Config(format!("unknown frontier backend: {other}"))),
    }
}

#[cfg(test)]
mod shared_tests {
    use super::*;
    use darc_core::link::parse;

    pub async fn exercise_uniqueness_and_fifo(frontier: &dyn Frontier) {
        let a = parse("http://example.com/a").unwrap();
        let b = parse("http://example.com/b").unwrap();
        frontier.add_many(PoolKind::Fetch, &[a.clone(), b.clone()]).await.unwrap();
        frontier.add_many(PoolKind::Fetch, &[a.clone()]).await.unwrap();

        let popped = frontier.pop(PoolKind::Fetch, 10).await.unwrap();
        assert_eq!(popped.len(), 2, "duplicate add must not create a second entry");
        assert_eq!(popped[0].hash, a.hash);
        assert_eq!(popped[1].hash, b.hash);
    }

    pub async fn exercise_lock_exclusivity(frontier: &dyn Frontier) {
        let a = parse("http://example.com/locked").unwrap();
        let token = frontier.acquire_lock(&a.hash, Duration::from_millis(50)).await.unwrap();
        let second = frontier.acquire_lock(&a.hash, Duration::from_millis(50)).await;
        assert!(matches!(second, Err(CrawlError::LockBusy(_))));
        frontier.release_lock(token);
        assert!(frontier.acquire_lock(&a.hash, Duration::from_millis(50)).await.is_ok());
    }
}
