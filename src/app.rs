use std::sync::Arc;

use anyhow::{Context, Result};

use darc_core::config::AppConfig;
use darc_core::PoolKind;
use darc_filters::Gates;
use darc_frontier::{self as frontier};
use darc_hooks::HookRegistry;
use darc_networks::{FreenetSession, I2pSession, NullSession, TorSession, TransportRegistry, ZeronetSession};
use darc_render::{ChromeRenderDriver, RenderDriverRegistry};
use darc_robots::RobotsCache;
use darc_scheduler::{Ctx, Scheduler};
use darc_storage::Storage;
use darc_submission::SubmissionSink;

const CONNECT_TIMEOUT_SECS: u64 = 30;
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Build every process-wide registry from `config` (spec.md §4.5 Transport
/// registry, §4.6 Site hook registry) and wire them into a `Scheduler`.
/// Mirrors the teacher's `crawl.rs` bootstrap: build once, never mutate
/// after workers start (spec.md §9 "Process-wide registries").
pub fn build_scheduler(config: AppConfig) -> Result<Scheduler> {
    config
        .scheduling
        .validate()
        .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;

    let mut transports = TransportRegistry::new();
    transports.register(
        "null",
        Box::new(NullSession::new(CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS).context("building null transport")?),
    );
    if let Some(tor) = &config.proxies.tor {
        transports.register(
            "tor",
            Box::new(TorSession::new(&tor.addrs, CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS).context("building tor transport")?),
        );
    }
    if let Some(i2p) = &config.proxies.i2p {
        transports.register(
            "i2p",
            Box::new(I2pSession::new(&i2p.addrs, CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS).context("building i2p transport")?),
        );
    }
    if let Some(freenet) = &config.proxies.freenet {
        transports.register(
            "freenet",
            Box::new(FreenetSession::new(&freenet.addrs, CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS).context("building freenet transport")?),
        );
    }
    if let Some(zeronet) = &config.proxies.zeronet {
        transports.register(
            "zeronet",
            Box::new(ZeronetSession::new(&zeronet.addrs, CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS).context("building zeronet transport")?),
        );
    }

    let mut renderers = RenderDriverRegistry::new();
    renderers.register("null", Box::new(ChromeRenderDriver::new(None).context("building null render driver")?));
    if let Some(tor) = &config.proxies.tor {
        let addr = tor.addrs.first().map(|a| format!("socks5://{a}"));
        renderers.register(
            "tor",
            Box::new(ChromeRenderDriver::new(addr.as_deref()).context("building tor render driver")?),
        );
    }
    if let Some(i2p) = &config.proxies.i2p {
        let addr = i2p.addrs.first().map(|a| format!("http://{a}"));
        renderers.register(
            "i2p",
            Box::new(ChromeRenderDriver::new(addr.as_deref()).context("building i2p render driver")?),
        );
    }
    if let Some(freenet) = &config.proxies.freenet {
        let addr = freenet.addrs.first().map(|a| format!("http://{a}"));
        renderers.register(
            "freenet",
            Box::new(ChromeRenderDriver::new(addr.as_deref()).context("building freenet render driver")?),
        );
    }
    if let Some(zeronet) = &config.proxies.zeronet {
        let addr = zeronet.addrs.first().map(|a| format!("http://{a}"));
        renderers.register(
            "zeronet",
            Box::new(ChromeRenderDriver::new(addr.as_deref()).context("building zeronet render driver")?),
        );
    }

    let frontier = frontier::build(&config.frontier).map_err(|e| anyhow::anyhow!(e))?;
    let gates = Gates::compile(&config.filters).map_err(|e| anyhow::anyhow!("compiling filter gates: {e}"))?;
    let storage = Storage::new(config.storage.path_data.clone());
    let submission = SubmissionSink::new(config.submission.clone(), config.storage.path_data.clone());

    let ctx = Ctx {
        frontier: Arc::from(frontier),
        gates: Arc::new(gates),
        transports: Arc::new(transports),
        renderers: Arc::new(renderers),
        hooks: Arc::new(HookRegistry::new()),
        robots: Arc::new(RobotsCache::new()),
        storage: Arc::new(storage),
        submission: Arc::new(submission),
        config: Arc::new(config),
    };

    Ok(Scheduler::new(ctx, vec![]))
}

/// Read `-f FILE` (one URL per line, `#`-comments and blanks ignored) plus
/// any positional URLs and return the combined seed list (spec.md §6 CLI).
pub fn collect_seed_urls(seed_file: Option<&str>, positional: &[String]) -> Result<Vec<String>> {
    let mut seeds: Vec<String> = positional.to_vec();
    if let Some(path) = seed_file {
        let contents = std::fs::read_to_string(path).with_context(|| format!("reading seed file {path}"))?;
        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            seeds.push(trimmed.to_string());
        }
    }
    Ok(seeds)
}

pub fn pool_kind(pool: crate::cli::PoolArg) -> PoolKind {
    match pool {
        crate::cli::PoolArg::Crawler => PoolKind::Fetch,
        crate::cli::PoolArg::Loader => PoolKind::Render,
    }
}
