use async_trait::async_trait;

use darc_core::{CrawlError, FetchConfig, FetchResponse, FetchSession, Link};

use crate::common::ClientPool;

/// `.onion` transport: routes through one or more Tor SOCKS5 proxies
/// (spec.md §4.5, proxy-tag `tor`).
pub struct TorSession {
    pool: ClientPool,
}

impl TorSession {
    pub fn new(
        socks_addrs: &[String],
        connect_timeout_seconds: u64,
        request_timeout_seconds: u64,
    ) -> Result<Self, CrawlError> {
        let addrs: Vec<String> = socks_addrs
            .iter()
            .map(|a| format!("socks5h://{a}"))
            .collect();
        Ok(Self {
            pool: ClientPool::build("tor", &addrs, connect_timeout_seconds, request_timeout_seconds)?,
        })
    }
}

#[async_trait]
impl FetchSession for TorSession {
    async fn get(&self, link: &Link, config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        self.pool.get(link, config).await
    }
}
