use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex as AsyncMutex;

use darc_core::link::parse;
use darc_core::{hash_hex, CrawlError, Link, LinkHash, PoolKind, VisitKind};

use crate::{Frontier, LockToken};

/// SQLite-backed frontier — the "remote key-value store" option of spec.md
/// §4.2. Queue/host/visit state is persisted to a single database file so a
/// restarted process resumes where it left off; per-hash locking stays an
/// in-process primitive (spec.md §4.2 "the contract is identical" — the
/// locking half of the contract does not require cross-process reach, only
/// the durability half does).
pub struct SqliteFrontier {
    conn: Arc<StdMutex<Connection>>,
    locks: DashMap<LinkHash, Arc<AsyncMutex<()>>>,
}

impl SqliteFrontier {
    pub fn open(path: &str) -> Result<Self, CrawlError> {
        let conn = Connection::open(path).map_err(|e| CrawlError::StoreUnavailable(e.to_string()))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS queue_entries (
                queue TEXT NOT NULL,
                hash BLOB NOT NULL,
                url TEXT NOT NULL,
                enqueue_time INTEGER NOT NULL,
                not_before INTEGER NOT NULL,
                PRIMARY KEY (queue, hash)
            );
            CREATE TABLE IF NOT EXISTS hosts_seen (host TEXT PRIMARY KEY);
            CREATE TABLE IF NOT EXISTS links_seen (hash BLOB PRIMARY KEY);
            CREATE TABLE IF NOT EXISTS visits (
                hash BLOB NOT NULL,
                kind TEXT NOT NULL,
                t INTEGER NOT NULL,
                PRIMARY KEY (hash, kind)
            );
            ",
        )
        .map_err(|e| CrawlError::StoreUnavailable(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(StdMutex::new(conn)),
            locks: DashMap::new(),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CrawlError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("sqlite connection mutex poisoned");
            f(&guard)
        })
        .await
        .map_err(|e| CrawlError::StoreUnavailable(e.to_string()))?
        .map_err(|e| CrawlError::StoreUnavailable(e.to_string()))
    }
}

#[async_trait]
impl Frontier for SqliteFrontier {
    async fn add_many(&self, queue: PoolKind, links: &[Link]) -> Result<Vec<Link>, CrawlError> {
        self.upsert(queue, links, Utc::now()).await
    }

    async fn add_many_delayed(&self, queue: PoolKind, links: &[Link], delay: Duration) -> Result<Vec<Link>, CrawlError> {
        let not_before = Utc::now()
            + chrono::Duration::from_std(delay).map_err(|e| CrawlError::Other(e.into()))?;
        self.upsert(queue, links, not_before).await
    }

    async fn pop(&self, queue: PoolKind, max: usize) -> Result<Vec<Link>, CrawlError> {
        let queue_name = queue.as_str().to_string();
        let now = Utc::now().timestamp();

        let rows: Vec<(Vec<u8>, String)> = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT hash, url FROM queue_entries
                     WHERE queue = ?1 AND not_before <= ?2
                     ORDER BY enqueue_time ASC, hash ASC
                     LIMIT ?3",
                )?;
                let rows = stmt
                    .query_map(params![queue_name, now, max as i64], |row| {
                        Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        let hashes: Vec<Vec<u8>> = rows.iter().map(|(h, _)| h.clone()).collect();
        for (_, url) in &rows {
            if let Ok(link) = parse(url) {
                out.push(link);
            }
        }

        let queue_name = queue.as_str().to_string();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            for hash in &hashes {
                tx.execute(
                    "DELETE FROM queue_entries WHERE queue = ?1 AND hash = ?2",
                    params![queue_name, hash],
                )?;
            }
            tx.commit()
        })
        .await?;

        Ok(out)
    }

    async fn drop_link(&self, queue: PoolKind, hash: &LinkHash) -> Result<(), CrawlError> {
        let queue_name = queue.as_str().to_string();
        let hash = hash.to_vec();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM queue_entries WHERE queue = ?1 AND hash = ?2",
                params![queue_name, hash],
            )
            .map(|_| ())
        })
        .await
    }

    async fn queue_len(&self, queue: PoolKind) -> Result<usize, CrawlError> {
        let queue_name = queue.as_str().to_string();
        let count: i64 = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM queue_entries WHERE queue = ?1",
                    params![queue_name],
                    |row| row.get(0),
                )
            })
            .await?;
        Ok(count as usize)
    }

    async fn has_host(&self, host: &str) -> Result<bool, CrawlError> {
        let host = host.to_string();
        self.with_conn(move |conn| {
            conn.query_row("SELECT 1 FROM hosts_seen WHERE host = ?1", params![host], |_| Ok(()))
                .optional()
                .map(|r| r.is_some())
        })
        .await
    }

    async fn mark_host(&self, host: &str) -> Result<(), CrawlError> {
        let host = host.to_string();
        self.with_conn(move |conn| {
            conn.execute("INSERT OR IGNORE INTO hosts_seen (host) VALUES (?1)", params![host])
                .map(|_| ())
        })
        .await
    }

    async fn record_visit(&self, hash: &LinkHash, kind: VisitKind, t: DateTime<Utc>) -> Result<(), CrawlError> {
        let hash = hash.to_vec();
        let kind_name = visit_kind_name(kind).to_string();
        let ts = t.timestamp();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO visits (hash, kind, t) VALUES (?1, ?2, ?3)
                 ON CONFLICT(hash, kind) DO UPDATE SET t = excluded.t",
                params![hash, kind_name, ts],
            )
            .map(|_| ())
        })
        .await
    }

    async fn last_visit(&self, hash: &LinkHash, kind: VisitKind) -> Result<Option<DateTime<Utc>>, CrawlError> {
        let hash = hash.to_vec();
        let kind_name = visit_kind_name(kind).to_string();
        let ts: Option<i64> = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT t FROM visits WHERE hash = ?1 AND kind = ?2",
                    params![hash, kind_name],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;
        Ok(ts.and_then(|t| Utc.timestamp_opt(t, 0).single()))
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

impl SqliteFrontier {
    async fn upsert(&self, queue: PoolKind, links: &[Link], not_before: DateTime<Utc>) -> Result<Vec<Link>, CrawlError> {
        let queue_name = queue.as_str().to_string();
        let now = Utc::now().timestamp();
        let not_before_ts = not_before.timestamp();
        let rows: Vec<(Vec<u8>, String)> = links
            .iter()
            .map(|l| (l.hash.to_vec(), l.url.clone()))
            .collect();

        let first_seen_hashes: Vec<Vec<u8>> = self
            .with_conn(move |conn| {
                let tx = conn.unchecked_transaction()?;
                let mut first_seen = Vec::new();
                for (hash, url) in &rows {
                    let existing_not_before: Option<i64> = tx
                        .query_row(
                            "SELECT not_before FROM queue_entries WHERE queue = ?1 AND hash = ?2",
                            params![queue_name, hash],
                            |row| row.get(0),
                        )
                        .optional()?;

                    match existing_not_before {
                        Some(existing) if existing <= now => {
                            tx.execute(
                                "UPDATE queue_entries SET enqueue_time = ?1 WHERE queue = ?2 AND hash = ?3",
                                params![now, queue_name, hash],
                            )?;
                        }
                        Some(_) => {}
                        None => {
                            tx.execute(
                                "INSERT INTO queue_entries (queue, hash, url, enqueue_time, not_before)
                                 VALUES (?1, ?2, ?3, ?4, ?5)",
                                params![queue_name, hash, url, now, not_before_ts],
                            )?;
                        }
                    }

                    let inserted = tx.execute("INSERT OR IGNORE INTO links_seen (hash) VALUES (?1)", params![hash])?;
                    if inserted > 0 {
                        first_seen.push(hash.clone());
                    }
                }
                tx.commit()?;
                Ok(first_seen)
            })
            .await?;

        Ok(links
            .iter()
            .filter(|l| first_seen_hashes.contains(&l.hash.to_vec()))
            .cloned()
            .collect())
    }
}

fn visit_kind_name(kind: VisitKind) -> &'static str {
    match kind {
        VisitKind::Fetched => "fetched",
        VisitKind::Rendered => "rendered",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_tests::{exercise_lock_exclusivity, exercise_uniqueness_and_fifo};
    use tempfile::tempdir;

    fn open_temp() -> (tempfile::TempDir, SqliteFrontier) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frontier.sqlite3");
        let frontier = SqliteFrontier::open(path.to_str().unwrap()).unwrap();
        (dir, frontier)
    }

    #[tokio::test]
    async fn uniqueness_and_fifo_ordering() {
        let (_dir, frontier) = open_temp();
        exercise_uniqueness_and_fifo(&frontier).await;
    }

    #[tokio::test]
    async fn lock_is_exclusive() {
        let (_dir, frontier) = open_temp();
        exercise_lock_exclusivity(&frontier).await;
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frontier.sqlite3");
        {
            let frontier = SqliteFrontier::open(path.to_str().unwrap()).unwrap();
            frontier.mark_host("example.com").await.unwrap();
        }
        let reopened = SqliteFrontier::open(path.to_str().unwrap()).unwrap();
        assert!(reopened.has_host("example.com").await.unwrap());
    }
}
