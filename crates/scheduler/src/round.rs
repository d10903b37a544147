use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{info, warn};

use darc_core::config::AppConfig;
use darc_core::{CrawlError, Link, PoolKind};
use darc_filters::Gates;
use darc_frontier::Frontier;
use darc_hooks::HookRegistry;
use darc_networks::TransportRegistry;
use darc_render::RenderDriverRegistry;
use darc_robots::RobotsCache;
use darc_storage::Storage;
use darc_submission::SubmissionSink;

use crate::fetch;
use crate::render;

/// Everything a fetch/render worker needs, shared read-only across a pool's
/// workers (spec.md §5 "all cross-worker state is mediated by the frontier
/// store").
pub struct Ctx {
    pub frontier: Arc<dyn Frontier>,
    pub gates: Arc<Gates>,
    pub transports: Arc<TransportRegistry>,
    pub renderers: Arc<RenderDriverRegistry>,
    pub hooks: Arc<HookRegistry>,
    pub robots: Arc<RobotsCache>,
    pub storage: Arc<Storage>,
    pub submission: Arc<SubmissionSink>,
    pub config: Arc<AppConfig>,
}

/// Record every link observed for the first time by this frontier to
/// `link.csv` (spec.md §6 "one row per first-seen", §8 P6). Called after
/// every `add_many`/`add_many_delayed` with the subset the frontier
/// reports as newly seen.
pub(crate) async fn record_first_seen(ctx: &Ctx, first_seen: &[Link]) -> Result<(), CrawlError> {
    for link in first_seen {
        ctx.storage.record_link(&link.hash, &link.url).await?;
    }
    Ok(())
}

/// Inter-round hook (spec.md §4.10 step 4): invoked with the pool kind and
/// the links just processed. Returning `WorkerBreak` stops the scheduler
/// after the current round completes.
#[async_trait]
pub trait RoundHook: Send + Sync {
    async fn after_round(&self, pool: PoolKind, links: &[Link]) -> Result<(), CrawlError>;
}

/// One of the three concurrency policies of spec.md §4.10. At most one of
/// `ParallelProcess`/`ParallelThread` may be selected — enforced by
/// `SchedulingConfig::validate` before a `Scheduler` is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyMode {
    ParallelProcess,
    ParallelThread,
    Single,
}

impl ConcurrencyMode {
    pub fn from_config(config: &AppConfig) -> Self {
        if config.scheduling.parallel_process {
            ConcurrencyMode::ParallelProcess
        } else if config.scheduling.parallel_thread {
            ConcurrencyMode::ParallelThread
        } else {
            ConcurrencyMode::Single
        }
    }
}

pub struct Scheduler {
    ctx: Arc<Ctx>,
    mode: ConcurrencyMode,
    round_hooks: Vec<Arc<dyn RoundHook>>,
}

impl Scheduler {
    pub fn new(ctx: Ctx, round_hooks: Vec<Arc<dyn RoundHook>>) -> Self {
        let mode = ConcurrencyMode::from_config(&ctx.config);
        Self {
            ctx: Arc::new(ctx),
            mode,
            round_hooks,
        }
    }

    /// Seed a pool's queue before the round loop starts (spec.md §6 "seed
    /// URLs are enqueued to the fetch pool at startup").
    pub async fn seed(&self, pool: PoolKind, links: &[Link]) -> Result<(), CrawlError> {
        let first_seen = self.ctx.frontier.add_many(pool, links).await?;
        record_first_seen(&self.ctx, &first_seen).await
    }

    /// Sink a URL that failed to parse (spec.md §7 `MalformedUrl`: "sink to
    /// `invalid.txt`; drop").
    pub async fn sink_malformed(&self, raw: &str) -> Result<(), CrawlError> {
        self.ctx.storage.record_non_fetchable("invalid", raw).await
    }

    /// Drive one pool's round loop until shutdown, `WorkerBreak`, or (with
    /// `REBOOT` set) both queues observed empty (spec.md §4.10).
    pub async fn run(&self, pool: PoolKind, mut shutdown: broadcast::Receiver<()>) -> Result<(), CrawlError> {
        loop {
            if shutdown.try_recv().is_ok() {
                info!(pool = pool.as_str(), "shutdown requested, stopping round loop");
                return Ok(());
            }

            let popped = self.ctx.frontier.pop(pool, self.ctx.config.frontier.max_pool).await?;

            if popped.is_empty() {
                let other = match pool {
                    PoolKind::Fetch => PoolKind::Render,
                    PoolKind::Render => PoolKind::Fetch,
                };
                if self.ctx.config.scheduling.reboot && self.ctx.frontier.queue_len(other).await? == 0 {
                    info!(pool = pool.as_str(), "both queues empty, REBOOT set, terminating");
                    return Ok(());
                }

                let wait = Duration::from_secs(self.ctx.config.scheduling.darc_wait_seconds);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shutdown.recv() => {
                        info!(pool = pool.as_str(), "shutdown during empty-queue sleep");
                        return Ok(());
                    }
                }
                continue;
            }

            info!(pool = pool.as_str(), count = popped.len(), mode = ?self.mode, "dispatching round");
            self.dispatch(pool, &popped).await;

            for hook in &self.round_hooks {
                if let Err(CrawlError::WorkerBreak) = hook.after_round(pool, &popped).await {
                    info!(pool = pool.as_str(), "inter-round hook requested stop");
                    return Ok(());
                }
            }
        }
    }

    async fn dispatch(&self, pool: PoolKind, links: &[Link]) {
        match self.mode {
            ConcurrencyMode::Single => {
                for link in links {
                    self.process_one(pool, link.clone()).await;
                }
            }
            ConcurrencyMode::ParallelProcess | ConcurrencyMode::ParallelThread => {
                let permits = self.ctx.config.scheduling.darc_cpu.max(1);
                let semaphore = Arc::new(tokio::sync::Semaphore::new(permits));
                let mut handles = Vec::with_capacity(links.len());
                for link in links {
                    let ctx = self.ctx.clone();
                    let link = link.clone();
                    let semaphore = semaphore.clone();
                    handles.push(tokio::spawn(async move {
                        let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                        process_link(&ctx, pool, link).await;
                    }));
                }
                for handle in handles {
                    if let Err(e) = handle.await {
                        warn!(error = %e, "worker task panicked");
                    }
                }
            }
        }
    }

    async fn process_one(&self, pool: PoolKind, link: Link) {
        process_link(&self.ctx, pool, link).await;
    }
}

async fn process_link(ctx: &Ctx, pool: PoolKind, link: Link) {
    let result = match pool {
        PoolKind::Fetch => fetch::handle(ctx, link).await,
        PoolKind::Render => render::handle(ctx, link).await,
    };
    if let Err(e) = result {
        warn!(pool = pool.as_str(), error = %e, "worker step failed");
    }
}
