use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use darc_core::{CrawlError, Link, PoolKind, VisitKind, EMPTY_RENDER_SENTINEL};

use crate::round::{record_first_seen, Ctx};

/// Render worker state machine (spec.md §4.8, steps 1-10).
pub async fn handle(ctx: &Ctx, link: Link) -> Result<(), CrawlError> {
    // 1. Filter.
    if !ctx.gates.allow_proxy(link.proxy_tag.as_str()) || !ctx.gates.allow_host(&link.host) {
        ctx.frontier.drop_link(PoolKind::Render, &link.hash).await?;
        return Ok(());
    }

    // 2. Acquire lock.
    let lock_timeout = Duration::from_secs(ctx.config.frontier.lock_timeout_seconds);
    let token = match ctx.frontier.acquire_lock(&link.hash, lock_timeout).await {
        Ok(token) => token,
        Err(CrawlError::LockBusy(_)) => {
            let backoff = backoff_duration(ctx);
            let first_seen = ctx.frontier.add_many_delayed(PoolKind::Render, &[link], backoff).await?;
            record_first_seen(ctx, &first_seen).await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    // 3. Freshness check.
    if let Some(last) = ctx.frontier.last_visit(&link.hash, VisitKind::Rendered).await? {
        if is_fresh(last, ctx) {
            ctx.frontier.release_lock(token);
            return Ok(());
        }
    }

    // 4-5. Select driver/hook; render.
    let driver = match ctx.renderers.get(link.proxy_tag) {
        Ok(d) => d,
        Err(e) => {
            ctx.frontier.release_lock(token);
            return Err(e);
        }
    };
    let hook = ctx.hooks.render_hook_for(&link.host);
    let wait = Duration::from_secs(ctx.config.caching.se_wait_seconds);

    let response = match hook.render(driver, &link, wait).await {
        Ok(response) => response,
        Err(CrawlError::LinkNoReturn(reason)) => {
            debug!(url = %link.url, reason, "render hook dropped link permanently");
            ctx.frontier.drop_link(PoolKind::Fetch, &link.hash).await?;
            ctx.frontier.drop_link(PoolKind::Render, &link.hash).await?;
            ctx.frontier.release_lock(token);
            return Ok(());
        }
        Err(e @ (CrawlError::Network(_) | CrawlError::Timeout(_) | CrawlError::EmptyRender)) => {
            warn!(url = %link.url, error = %e, "render failed, re-enqueueing with backoff");
            let first_seen = ctx.frontier.add_many_delayed(PoolKind::Render, &[link], backoff_duration(ctx)).await?;
            record_first_seen(ctx, &first_seen).await?;
            ctx.frontier.release_lock(token);
            return Ok(());
        }
        Err(e) => {
            ctx.frontier.release_lock(token);
            return Err(e);
        }
    };

    // 6. Sentinel empty page → transient failure.
    if response.html.trim() == EMPTY_RENDER_SENTINEL {
        warn!(url = %link.url, "render produced sentinel empty page, treating as transient failure");
        let first_seen = ctx.frontier.add_many_delayed(PoolKind::Render, &[link], backoff_duration(ctx)).await?;
        record_first_seen(ctx, &first_seen).await?;
        ctx.frontier.release_lock(token);
        return Ok(());
    }

    // 7. Save rendered HTML + screenshot.
    ctx.storage.save_render_artifacts(&link, &response).await?;

    // 8. Submission.
    ctx.submission
        .submit(
            &link,
            darc_submission::SubmissionEvent::RenderedDocument {
                url: link.url.clone(),
                screenshot_size: response.screenshot.len(),
            },
        )
        .await
        .ok();

    // 9. Extract links.
    let candidates = darc_parser::extract(&response.html, &link.url);
    let mut new_links = Vec::with_capacity(candidates.len());
    for raw in &candidates {
        match darc_core::parse(raw) {
            Ok(l) => new_links.push(l),
            Err(_) => ctx.storage.record_non_fetchable("invalid", raw).await?,
        }
    }
    if !new_links.is_empty() {
        let first_seen = ctx.frontier.add_many(PoolKind::Fetch, &new_links).await?;
        record_first_seen(ctx, &first_seen).await?;
    }

    // 10. Record visit; release lock.
    ctx.frontier.record_visit(&link.hash, VisitKind::Rendered, Utc::now()).await?;
    ctx.frontier.release_lock(token);
    Ok(())
}

/// Same backoff choice as the fetch worker's `time_cache_duration`
/// fallback: prefer `TIME_CACHE`, fall back to `RETRY_INTERVAL` only when
/// `TIME_CACHE` is null (spec.md §7 "re-enqueued with a
/// not-before-time = now + TIME_CACHE").
fn backoff_duration(ctx: &Ctx) -> Duration {
    ctx.config
        .caching
        .time_cache_seconds
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(ctx.config.frontier.retry_interval_seconds))
}

fn is_fresh(last: chrono::DateTime<Utc>, ctx: &Ctx) -> bool {
    match ctx.config.caching.time_cache_seconds {
        None => true,
        Some(secs) => Utc::now()
            .signed_duration_since(last)
            .to_std()
            .map(|age| age < Duration::from_secs(secs))
            .unwrap_or(false),
    }
}
