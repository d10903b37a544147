use async_trait::async_trait;

use darc_core::{CrawlError, FetchConfig, FetchResponse, FetchSession, Link};

use crate::common::ClientPool;

/// Freenet transport: routes through an FProxy HTTP gateway (spec.md §4.5,
/// proxy-tag `freenet`).
pub struct FreenetSession {
    pool: ClientPool,
}

impl FreenetSession {
    pub fn new(
        http_proxies: &[String],
        connect_timeout_seconds: u64,
        request_timeout_seconds: u64,
    ) -> Result<Self, CrawlError> {
        let addrs: Vec<String> = http_proxies.iter().map(|a| format!("http://{a}")).collect();
        Ok(Self {
            pool: ClientPool::build("freenet", &addrs, connect_timeout_seconds, request_timeout_seconds)?,
        })
    }
}

#[async_trait]
impl FetchSession for FreenetSession {
    async fn get(&self, link: &Link, config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        self.pool.get(link, config).await
    }
}
