use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use darc_core::{CrawlError, FetchConfig, FetchResponse, FetchSession, Link};

/// The identity transport: direct Internet, no proxy. Used for proxy-tag
/// `null` (plain clearnet `http`/`https`/`ftp`/`ws`/`wss`) per spec.md
/// §4.1 table.
pub struct NullSession {
    client: reqwest::Client,
}

impl NullSession {
    pub fn new(connect_timeout_seconds: u64, request_timeout_seconds: u64) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .connect_timeout(std::time::Duration::from_secs(connect_timeout_seconds))
            .timeout(std::time::Duration::from_secs(request_timeout_seconds))
            .build()
            .map_err(|e| CrawlError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FetchSession for NullSession {
    async fn get(&self, link: &Link, config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        let start = Instant::now();
        debug!(url = %link.url, network = "null", "fetching");

        let resp = self
            .client
            .get(&link.url)
            .header("user-agent", &config.user_agent)
            .send()
            .await
            .map_err(|e| CrawlError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();

        let mut headers = HashMap::new();
        for (k, v) in resp.headers() {
            if let Ok(val) = v.to_str() {
                headers.insert(k.as_str().to_string(), val.to_string());
            }
        }
        let cookies: Vec<String> = resp
            .headers()
            .get_all("set-cookie")
            .iter()
            .filter_map(|v| v.to_str().ok().map(|s| s.to_string()))
            .collect();
        let content_type = headers.get("content-type").cloned();

        let body = resp
            .bytes()
            .await
            .map_err(|e| CrawlError::Network(e.to_string()))?;

        if body.len() > config.max_body_size {
            return Err(CrawlError::BodyTooLarge {
                size: body.len(),
                max: config.max_body_size,
            });
        }

        Ok(FetchResponse {
            url: link.url.clone(),
            final_url,
            status,
            headers,
            cookies,
            body: body.to_vec(),
            content_type,
            fetched_at: chrono::Utc::now(),
            response_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}
