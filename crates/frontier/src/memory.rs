use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use tokio::sync::Mutex as AsyncMutex;

use darc_core::{hash_hex, CrawlError, Link, LinkHash, PoolKind, VisitKind};

use crate::{Frontier, LockToken};

struct Entry {
    link: Link,
    enqueue_time: DateTime<Utc>,
    not_before: DateTime<Utc>,
}

/// In-process map+heap frontier backend (spec.md §4.2 "in-process map+heap
/// implementation"). A `Mutex<HashMap<hash, Entry>>` per queue stands in for
/// the heap: `pop` sorts the ready subset on demand, which is adequate at
/// the `MAX_POOL` batch sizes this contract pops at a time.
pub struct MemoryFrontier {
    fetch_queue: AsyncMutex<HashMap<LinkHash, Entry>>,
    render_queue: AsyncMutex<HashMap<LinkHash, Entry>>,
    hosts_seen: DashSet<String>,
    links_seen: DashSet<LinkHash>,
    visits: DashMap<(LinkHash, bool), DateTime<Utc>>,
    locks: DashMap<LinkHash, Arc<AsyncMutex<()>>>,
}

impl Default for MemoryFrontier {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFrontier {
    pub fn new() -> Self {
        Self {
            fetch_queue: AsyncMutex::new(HashMap::new()),
            render_queue: AsyncMutex::new(HashMap::new()),
            hosts_seen: DashSet::new(),
            links_seen: DashSet::new(),
            visits: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    fn queue_for(&self, kind: PoolKind) -> &AsyncMutex<HashMap<LinkHash, Entry>> {
        match kind {
            PoolKind::Fetch => &self.fetch_queue,
            PoolKind::Render => &self.render_queue,
        }
    }

    async fn upsert(&self, queue: PoolKind, links: &[Link], not_before: DateTime<Utc>) -> Vec<Link> {
        let now = Utc::now();
        let mut guard = self.queue_for(queue).lock().await;
        let mut first_seen = Vec::new();
        for link in links {
            match guard.get_mut(&link.hash) {
                Some(existing) => {
                    if existing.not_before <= now {
                        existing.enqueue_time = now;
                    }
                }
                None => {
                    guard.insert(
                        link.hash,
                        Entry {
                            link: link.clone(),
                            enqueue_time: now,
                            not_before,
                        },
                    );
                }
            }
            if self.links_seen.insert(link.hash) {
                first_seen.push(link.clone());
            }
        }
        first_seen
    }

    fn visit_key(hash: &LinkHash, kind: VisitKind) -> (LinkHash, bool) {
        (*hash, matches!(kind, VisitKind::Rendered))
    }
}

#[async_trait]
impl Frontier for MemoryFrontier {
    async fn add_many(&self, queue: PoolKind, links: &[Link]) -> Result<Vec<Link>, CrawlError> {
        Ok(self.upsert(queue, links, Utc::now()).await)
    }

    async fn add_many_delayed(&self, queue: PoolKind, links: &[Link], delay: Duration) -> Result<Vec<Link>, CrawlError> {
        let not_before = Utc::now()
            + chrono::Duration::from_std(delay).map_err(|e| CrawlError::Other(e.into()))?;
        Ok(self.upsert(queue, links, not_before).await)
    }

    async fn pop(&self, queue: PoolKind, max: usize) -> Result<Vec<Link>, CrawlError> {
        let now = Utc::now();
        let mut guard = self.queue_for(queue).lock().await;

        let mut ready: Vec<LinkHash> = guard
            .iter()
            .filter(|(_, e)| e.not_before <= now)
            .map(|(h, _)| *h)
            .collect();
        ready.sort_by(|a, b| {
            let ea = &guard[a];
            let eb = &guard[b];
            ea.enqueue_time.cmp(&eb.enqueue_time).then_with(|| hash_hex(a).cmp(&hash_hex(b)))
        });
        ready.truncate(max);

        let mut out = Vec::with_capacity(ready.len());
        for hash in ready {
            if let Some(entry) = guard.remove(&hash) {
                out.push(entry.link);
            }
        }
        Ok(out)
    }

    async fn drop_link(&self, queue: PoolKind, hash: &LinkHash) -> Result<(), CrawlError> {
        self.queue_for(queue).lock().await.remove(hash);
        Ok(())
    }

    async fn queue_len(&self, queue: PoolKind) -> Result<usize, CrawlError> {
        Ok(self.queue_for(queue).lock().await.len())
    }

    async fn has_host(&self, host: &str) -> Result<bool, CrawlError> {
        Ok(self.hosts_seen.contains(host))
    }

    async fn mark_host(&self, host: &str) -> Result<(), CrawlError> {
        self.hosts_seen.insert(host.to_string());
        Ok(())
    }

    async fn record_visit(&self, hash: &LinkHash, kind: VisitKind, t: DateTime<Utc>) -> Result<(), CrawlError> {
        self.visits.insert(Self::visit_key(hash, kind), t);
        Ok(())
    }

    async fn last_visit(&self, hash: &LinkHash, kind: VisitKind) -> Result<Option<DateTime<Utc>>, CrawlError> {
        Ok(self.visits.get(&Self::visit_key(hash, kind)).map(|v| *v))
    }

    async fn acquire_lock(&self, hash: &LinkHash, blocking_timeout: Duration) -> Result<LockToken, CrawlError> {
        let mutex = self
            .locks
            .entry(*hash)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        tokio::time::timeout(blocking_timeout, mutex.lock_owned())
            .await
            .map_err(|_| CrawlError::LockBusy(hash_hex(hash)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_tests::{exercise_lock_exclusivity, exercise_uniqueness_and_fifo};
    use darc_core::link::parse;

    #[tokio::test]
    async fn uniqueness_and_fifo_ordering() {
        exercise_uniqueness_and_fifo(&MemoryFrontier::new()).await;
    }

    #[tokio::test]
    async fn lock_is_exclusive() {
        exercise_lock_exclusivity(&MemoryFrontier::new()).await;
    }

    #[tokio::test]
    async fn freshness_window_via_last_visit() {
        let frontier = MemoryFrontier::new();
        let link = parse("http://example.com/fresh").unwrap();
        assert!(frontier.last_visit(&link.hash, VisitKind::Fetched).await.unwrap().is_none());

        let t = Utc::now();
        frontier.record_visit(&link.hash, VisitKind::Fetched, t).await.unwrap();
        assert_eq!(frontier.last_visit(&link.hash, VisitKind::Fetched).await.unwrap(), Some(t));
    }

    #[tokio::test]
    async fn delayed_add_is_not_immediately_ready() {
        let frontier = MemoryFrontier::new();
        let link = parse("http://example.com/delayed").unwrap();
        frontier
            .add_many_delayed(PoolKind::Fetch, &[link.clone()], Duration::from_secs(60))
            .await
            .unwrap();

        let popped = frontier.pop(PoolKind::Fetch, 10).await.unwrap();
        assert!(popped.is_empty());
    }

    #[tokio::test]
    async fn host_tracking_round_trips() {
        let frontier = MemoryFrontier::new();
        assert!(!frontier.has_host("example.com").await.unwrap());
        frontier.mark_host("example.com").await.unwrap();
        assert!(frontier.has_host("example.com").await.unwrap());
    }

    #[tokio::test]
    async fn pop_respects_max_cap() {
        let frontier = MemoryFrontier::new();
        let links: Vec<Link> = (0..5)
            .map(|i| parse(&format!("http://example.com/{i}")).unwrap())
            .collect();
        frontier.add_many(PoolKind::Fetch, &links).await.unwrap();

        let popped = frontier.pop(PoolKind::Fetch, 2).await.unwrap();
        assert_eq!(popped.len(), 2);
        let remaining = frontier.pop(PoolKind::Fetch, 10).await.unwrap();
        assert_eq!(remaining.len(), 3);
    }
}
