use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use darc_core::{CrawlError, FetchConfig, Link, PoolKind, ProxyTag, VisitKind};

use crate::round::{record_first_seen, Ctx};

/// Fetch worker state machine (spec.md §4.7, steps 1-13).
pub async fn handle(ctx: &Ctx, link: Link) -> Result<(), CrawlError> {
    // 1. Filter.
    if !ctx.gates.allow_proxy(link.proxy_tag.as_str()) || !ctx.gates.allow_host(&link.host) {
        ctx.frontier.drop_link(PoolKind::Fetch, &link.hash).await?;
        return Ok(());
    }

    // 2. Acquire lock.
    let lock_timeout = Duration::from_secs(ctx.config.frontier.lock_timeout_seconds);
    let token = match ctx.frontier.acquire_lock(&link.hash, lock_timeout).await {
        Ok(token) => token,
        Err(CrawlError::LockBusy(_)) => {
            let backoff = time_cache_duration(ctx).unwrap_or(Duration::from_secs(ctx.config.frontier.retry_interval_seconds));
            let first_seen = ctx.frontier.add_many_delayed(PoolKind::Fetch, &[link], backoff).await?;
            record_first_seen(ctx, &first_seen).await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    // 3. Freshness check.
    if let Some(last) = ctx.frontier.last_visit(&link.hash, VisitKind::Fetched).await? {
        if is_fresh(last, ctx) {
            ctx.frontier.release_lock(token);
            return Ok(());
        }
    }

    // 4. Proxy tag branch — non-fetchable families go straight to a sink file.
    if !link.proxy_tag.is_fetchable() {
        ctx.storage.record_non_fetchable(link.proxy_tag.as_str(), &link.url).await?;
        ctx.frontier.drop_link(PoolKind::Fetch, &link.hash).await?;
        ctx.frontier.release_lock(token);
        return Ok(());
    }

    let fetch_config = FetchConfig {
        timeout: Duration::from_secs(120),
        ..FetchConfig::default()
    };

    // 5. Host onboarding.
    if !ctx.frontier.has_host(&link.host).await? {
        if let Ok(session) = ctx.transports.get(link.proxy_tag) {
            let discovered = ctx.robots.onboard(&link, session, &fetch_config).await;
            if !discovered.is_empty() {
                let sitemap_links: Vec<Link> = discovered.iter().filter_map(|u| darc_core::parse(u).ok()).collect();
                let first_seen = ctx.frontier.add_many(PoolKind::Fetch, &sitemap_links).await?;
                record_first_seen(ctx, &first_seen).await?;
            }
        }
        ctx.frontier.mark_host(&link.host).await?;
        ctx.submission
            .submit(&link, darc_submission::SubmissionEvent::NewHost { host: link.host.clone() })
            .await
            .ok();
    }

    // 6. Robots gate.
    let force = ctx.config.scheduling.force;
    if !force && !ctx.robots.may_fetch(&link, &fetch_config.user_agent, force, time_cache_duration(ctx)) {
        ctx.frontier.record_visit(&link.hash, VisitKind::Fetched, Utc::now()).await?;
        ctx.frontier.release_lock(token);
        return Ok(());
    }

    // 7. Fetch.
    let session = ctx.transports.get(link.proxy_tag)?;
    let hook = ctx.hooks.fetch_hook_for(&link.host);
    let response = match hook.fetch(session, &link, &fetch_config).await {
        Ok(response) => response,
        Err(CrawlError::InvalidScheme(_)) => {
            ctx.storage.record_non_fetchable(link.proxy_tag.as_str(), &link.url).await?;
            ctx.frontier.drop_link(PoolKind::Fetch, &link.hash).await?;
            ctx.frontier.release_lock(token);
            return Ok(());
        }
        Err(e @ (CrawlError::Network(_) | CrawlError::Timeout(_))) => {
            warn!(url = %link.url, error = %e, "fetch failed, re-enqueueing with backoff");
            let backoff = time_cache_duration(ctx).unwrap_or(Duration::from_secs(ctx.config.frontier.retry_interval_seconds));
            let first_seen = ctx.frontier.add_many_delayed(PoolKind::Fetch, &[link], backoff).await?;
            record_first_seen(ctx, &first_seen).await?;
            ctx.frontier.release_lock(token);
            return Ok(());
        }
        Err(CrawlError::LinkNoReturn(reason)) => {
            debug!(url = %link.url, reason, "hook dropped link permanently");
            ctx.frontier.drop_link(PoolKind::Fetch, &link.hash).await?;
            ctx.frontier.drop_link(PoolKind::Render, &link.hash).await?;
            ctx.frontier.release_lock(token);
            return Ok(());
        }
        Err(e) => {
            ctx.frontier.release_lock(token);
            return Err(e);
        }
    };

    // 8. Persist.
    ctx.storage.save_fetch_artifacts(&link, &response).await?;

    // 9. MIME gate.
    let content_type = response.content_type.clone().unwrap_or_default();
    let mime = mime_without_params(&content_type);
    if !ctx.gates.allow_mime(&content_type) {
        ctx.frontier.record_visit(&link.hash, VisitKind::Fetched, Utc::now()).await?;
        ctx.frontier.release_lock(token);
        return Ok(());
    }

    // 10. Submission.
    ctx.submission
        .submit(
            &link,
            darc_submission::SubmissionEvent::FetchedDocument {
                url: response.final_url.clone(),
                status: response.status,
                content_type: response.content_type.clone(),
                body_size: response.body.len(),
            },
        )
        .await
        .ok();

    // 11. HTML handling.
    if mime == "text/html" || mime == "application/xhtml+xml" {
        let html = String::from_utf8_lossy(&response.body);
        let candidates = darc_parser::extract(&html, &response.final_url);
        let mut new_links = Vec::with_capacity(candidates.len());
        for raw in &candidates {
            match darc_core::parse(raw) {
                Ok(l) => new_links.push(l),
                Err(_) => ctx.storage.record_non_fetchable("invalid", raw).await?,
            }
        }
        if ctx.config.filters.check_ng {
            new_links = filter_check_ng(ctx, &fetch_config, new_links).await;
        }
        if !new_links.is_empty() {
            let first_seen = ctx.frontier.add_many(PoolKind::Fetch, &new_links).await?;
            record_first_seen(ctx, &first_seen).await?;
        }
    }

    // 12. Status branch.
    if (400..600).contains(&response.status) {
        let backoff = time_cache_duration(ctx).unwrap_or(Duration::from_secs(ctx.config.frontier.retry_interval_seconds));
        let first_seen = ctx.frontier.add_many_delayed(PoolKind::Fetch, &[link.clone()], backoff).await?;
        record_first_seen(ctx, &first_seen).await?;
    } else {
        let first_seen = ctx.frontier.add_many(PoolKind::Render, &[link.clone()]).await?;
        record_first_seen(ctx, &first_seen).await?;
    }

    // 13. Record visit; release lock.
    ctx.frontier.record_visit(&link.hash, VisitKind::Fetched, Utc::now()).await?;
    ctx.frontier.release_lock(token);
    Ok(())
}

fn time_cache_duration(ctx: &Ctx) -> Option<Duration> {
    ctx.config.caching.time_cache_seconds.map(Duration::from_secs)
}

/// Strip `; charset=...`-style parameters a real server's `Content-Type`
/// header almost always carries before comparing against a bare mime type.
fn mime_without_params(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or(content_type).trim()
}

/// `CHECK_NG` (spec.md §4.9): probe each candidate through *its own*
/// transport, not the parent page's — a `.onion`/`.i2p` link found on a
/// clearnet page must be probed via `tor`/`i2p`, not `null`.
async fn filter_check_ng(ctx: &Ctx, fetch_config: &FetchConfig, candidates: Vec<Link>) -> Vec<Link> {
    let mut by_tag: HashMap<ProxyTag, Vec<Link>> = HashMap::new();
    for link in candidates {
        by_tag.entry(link.proxy_tag).or_default().push(link);
    }

    let mut kept = Vec::new();
    for (tag, group) in by_tag {
        match ctx.transports.get(tag) {
            Ok(session) => kept.extend(darc_parser::filter_by_content_type(session, fetch_config, group, &ctx.gates).await),
            Err(_) => debug!(tag = tag.as_str(), "no transport for CHECK_NG probe, dropping candidates"),
        }
    }
    kept
}

/// A null `TIME_CACHE` means "forever" — a visit is never stale again
/// (spec.md §5 "Freshness window").
fn is_fresh(last: chrono::DateTime<Utc>, ctx: &Ctx) -> bool {
    match time_cache_duration(ctx) {
        None => true,
        Some(ttl) => Utc::now().signed_duration_since(last).to_std().map(|age| age < ttl).unwrap_or(false),
    }
}
