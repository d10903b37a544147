mod app;
mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use darc_core::config::AppConfig;
use darc_core::CrawlError;

use crate::cli::Cli;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(async_main());
    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            let code = e
                .downcast_ref::<CrawlError>()
                .map(|e| e.exit_code())
                .unwrap_or(1);
            eprintln!("darc: {e:#}");
            std::process::exit(code);
        }
    }
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let config: AppConfig = toml::from_str(&config_str).context("parsing config file")?;

    let seeds = app::collect_seed_urls(cli.seed_file.as_deref(), &cli.urls)?;
    let pool = app::pool_kind(cli.pool);

    let scheduler = app::build_scheduler(config)?;

    if !seeds.is_empty() {
        let mut links = Vec::with_capacity(seeds.len());
        for raw in &seeds {
            match darc_core::parse(raw) {
                Ok(link) => links.push(link),
                Err(e) => {
                    warn!(url = %raw, error = %e, "sinking unparseable seed URL");
                    scheduler.sink_malformed(raw).await?;
                }
            }
        }
        info!(count = links.len(), "seeding fetch queue");
        scheduler.seed(darc_core::PoolKind::Fetch, &links).await?;
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler");
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    info!("SIGINT received, shutting down");
                }
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down");
            }
        }
        let _ = shutdown_tx.send(());
    });

    scheduler.run(pool, shutdown_rx).await?;
    Ok(())
}
