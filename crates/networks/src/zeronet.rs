use async_trait::async_trait;

use darc_core::{CrawlError, FetchConfig, FetchResponse, FetchSession, Link};

use crate::common::ClientPool;

/// ZeroNet transport: routes through a ZeroNet HTTP gateway (spec.md §4.5,
/// proxy-tag `zeronet`, `.bit` pseudo-TLD hosts).
pub struct ZeronetSession {
    pool: ClientPool,
}

impl ZeronetSession {
    pub fn new(
        http_proxies: &[String],
        connect_timeout_seconds: u64,
        request_timeout_seconds: u64,
    ) -> Result<Self, CrawlError> {
        let addrs: Vec<String> = http_proxies.iter().map(|a| format!("http://{a}")).collect();
        Ok(Self {
            pool: ClientPool::build("zeronet", &addrs, connect_timeout_seconds, request_timeout_seconds)?,
        })
    }
}

#[async_trait]
impl FetchSession for ZeronetSession {
    async fn get(&self, link: &Link, config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        self.pool.get(link, config).await
    }
}
