use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::tempdir;
use tokio::sync::broadcast;

use darc_core::config::AppConfig;
use darc_core::{CrawlError, FetchConfig, FetchResponse, FetchSession, Link, PoolKind, RenderDriver, RenderResponse, VisitKind};
use darc_filters::Gates;
use darc_frontier::MemoryFrontier;
use darc_hooks::HookRegistry;
use darc_networks::TransportRegistry;
use darc_render::RenderDriverRegistry;
use darc_robots::RobotsCache;
use darc_storage::Storage;
use darc_submission::SubmissionSink;

use crate::round::{Ctx, RoundHook, Scheduler};

struct StaticHtmlSession {
    html: &'static str,
}

#[async_trait]
impl FetchSession for StaticHtmlSession {
    async fn get(&self, link: &Link, _config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        Ok(FetchResponse {
            url: link.url.clone(),
            final_url: link.url.clone(),
            status: 200,
            headers: HashMap::new(),
            cookies: vec![],
            body: self.html.as_bytes().to_vec(),
            content_type: Some("text/html".to_string()),
            fetched_at: Utc::now(),
            response_time_ms: 1,
        })
    }
}

struct StaticRenderDriver;

#[async_trait]
impl RenderDriver for StaticRenderDriver {
    async fn load(&self, _link: &Link, _wait: Duration) -> Result<RenderResponse, CrawlError> {
        Ok(RenderResponse {
            html: "<html><body>rendered</body></html>".to_string(),
            screenshot: vec![1, 2, 3],
            rendered_at: Utc::now(),
        })
    }
}

fn build_ctx(html: &'static str, path_data: std::path::PathBuf) -> Ctx {
    let mut config = AppConfig::default();
    config.storage.path_data = path_data.to_string_lossy().to_string();
    config.caching.time_cache_seconds = Some(3600);

    let mut transports = TransportRegistry::new();
    transports.register("null", Box::new(StaticHtmlSession { html }));
    transports.register("tor", Box::new(StaticHtmlSession { html }));

    let mut renderers = RenderDriverRegistry::new();
    renderers.register("null", Box::new(StaticRenderDriver));
    renderers.register("tor", Box::new(StaticRenderDriver));

    let config = Arc::new(config);
    Ctx {
        frontier: Arc::new(MemoryFrontier::new()),
        gates: Arc::new(Gates::compile(&config.filters).unwrap()),
        transports: Arc::new(transports),
        renderers: Arc::new(renderers),
        hooks: Arc::new(HookRegistry::new()),
        robots: Arc::new(RobotsCache::new()),
        storage: Arc::new(Storage::new(path_data)),
        submission: Arc::new(SubmissionSink::new(config.submission.clone(), config.storage.path_data.clone())),
        config,
    }
}

#[tokio::test]
async fn p3_successful_fetch_promotes_to_render_queue() {
    let dir = tempdir().unwrap();
    let ctx = build_ctx("<html><body>no links here</body></html>", dir.path().to_path_buf());
    let link = darc_core::parse("http://example.com/").unwrap();

    crate::fetch::handle(&ctx, link.clone()).await.unwrap();

    let popped = ctx.frontier.pop(PoolKind::Render, 10).await.unwrap();
    assert_eq!(popped.len(), 1);
    assert_eq!(popped[0].hash, link.hash);
}

struct RobotsTxtSession;

#[async_trait]
impl FetchSession for RobotsTxtSession {
    async fn get(&self, link: &Link, _config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        let body = if link.path == "/robots.txt" {
            "User-agent: *\nDisallow: /private\n".to_string()
        } else {
            "not found".to_string()
        };
        Ok(FetchResponse {
            url: link.url.clone(),
            final_url: link.url.clone(),
            status: if link.path == "/robots.txt" { 200 } else { 404 },
            headers: HashMap::new(),
            cookies: vec![],
            body: body.into_bytes(),
            content_type: Some("text/plain".to_string()),
            fetched_at: Utc::now(),
            response_time_ms: 1,
        })
    }
}

#[tokio::test]
async fn p4_robots_denial_records_visit_without_fetching() {
    let dir = tempdir().unwrap();
    let mut ctx = build_ctx("<html></html>", dir.path().to_path_buf());

    let mut transports = TransportRegistry::new();
    transports.register("null", Box::new(RobotsTxtSession));
    ctx.transports = Arc::new(transports);

    let link = darc_core::parse("http://example.com/private").unwrap();
    let root = darc_core::parse("http://example.com/").unwrap();

    ctx.robots
        .onboard(&root, ctx.transports.get(link.proxy_tag).unwrap(), &FetchConfig::default())
        .await;
    ctx.frontier.mark_host("example.com").await.unwrap();

    crate::fetch::handle(&ctx, link.clone()).await.unwrap();

    assert!(ctx.frontier.last_visit(&link.hash, VisitKind::Fetched).await.unwrap().is_some());
    let rendered = ctx.frontier.pop(PoolKind::Render, 10).await.unwrap();
    assert!(rendered.is_empty(), "robots-denied link must not reach the render queue");
}

struct BreakAfterFirstRound {
    rounds: AtomicUsize,
}

#[async_trait]
impl RoundHook for BreakAfterFirstRound {
    async fn after_round(&self, _pool: PoolKind, _links: &[Link]) -> Result<(), CrawlError> {
        let n = self.rounds.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            Err(CrawlError::WorkerBreak)
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn p7_inter_round_hook_stops_scheduler() {
    let dir = tempdir().unwrap();
    let ctx = build_ctx("<html><body>no links</body></html>", dir.path().to_path_buf());
    let link = darc_core::parse("http://example.com/").unwrap();
    ctx.frontier.add_many(PoolKind::Fetch, &[link]).await.unwrap();

    let hook = Arc::new(BreakAfterFirstRound { rounds: AtomicUsize::new(0) });
    let scheduler = Scheduler::new(ctx, vec![hook]);
    let (_tx, rx) = broadcast::channel(1);

    let result = tokio::time::timeout(Duration::from_secs(5), scheduler.run(PoolKind::Fetch, rx)).await;
    assert!(result.is_ok(), "scheduler should stop promptly once WorkerBreak is raised");
    assert!(result.unwrap().is_ok());
}
