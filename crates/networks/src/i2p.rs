use async_trait::async_trait;

use darc_core::{CrawlError, FetchConfig, FetchResponse, FetchSession, Link};

use crate::common::ClientPool;

/// `.i2p` transport: routes through an I2P HTTP proxy (spec.md §4.5,
/// proxy-tag `i2p`).
pub struct I2pSession {
    pool: ClientPool,
}

impl I2pSession {
    pub fn new(
        http_proxies: &[String],
        connect_timeout_seconds: u64,
        request_timeout_seconds: u64,
    ) -> Result<Self, CrawlError> {
        let addrs: Vec<String> = http_proxies.iter().map(|a| format!("http://{a}")).collect();
        Ok(Self {
            pool: ClientPool::build("i2p", &addrs, connect_timeout_seconds, request_timeout_seconds)?,
        })
    }
}

#[async_trait]
impl FetchSession for I2pSession {
    async fn get(&self, link: &Link, config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        self.pool.get(link, config).await
    }
}
