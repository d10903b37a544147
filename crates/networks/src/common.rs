use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tracing::{debug, warn};

use darc_core::{CrawlError, FetchConfig, FetchResponse, Link};

/// Shared round-robin client pool used by every proxied transport
/// (spec.md §4.5, "a factory returns a session with the proper proxy
/// configured"). One `reqwest::Client` per configured proxy address.
pub struct ClientPool {
    clients: Vec<reqwest::Client>,
    counter: AtomicUsize,
    pub name: &'static str,
}

impl ClientPool {
    pub fn build(
        name: &'static str,
        proxy_urls: &[String],
        connect_timeout_seconds: u64,
        request_timeout_seconds: u64,
    ) -> Result<Self, CrawlError> {
        if proxy_urls.is_empty() {
            return Err(CrawlError::Proxy(format!("no {name} proxies configured")));
        }

        let mut clients = Vec::new();
        for addr in proxy_urls {
            let proxy = match reqwest::Proxy::all(addr) {
                Ok(p) => p,
                Err(e) => {
                    warn!(%addr, error = %e, "skipping unreachable proxy config");
                    continue;
                }
            };
            match reqwest::Client::builder()
                .proxy(proxy)
                .cookie_store(true)
                .connect_timeout(std::time::Duration::from_secs(connect_timeout_seconds))
                .timeout(std::time::Duration::from_secs(request_timeout_seconds))
                .build()
            {
                Ok(client) => clients.push(client),
                Err(e) => warn!(%addr, error = %e, "skipping proxy, client build failed"),
            }
        }

        if clients.is_empty() {
            return Err(CrawlError::Proxy(format!("no working {name} proxies")));
        }

        Ok(Self {
            clients,
            counter: AtomicUsize::new(0),
            name,
        })
    }

    pub fn next(&self) -> &reqwest::Client {
        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        &self.clients[idx]
    }

    pub async fn get(&self, link: &Link, config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        let start = Instant::now();
        let client = self.next();
        debug!(url = %link.url, network = self.name, "fetching");

        let resp = client
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
