use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use darc_core::config::SubmissionConfig;
use darc_core::{hash_hex, CrawlError, Link};

/// The three submission events of spec.md §3/§4.7/§4.8: `new-host`,
/// `fetched-document`, `rendered-document`. Each carries a timestamp, the
/// link, and event-specific artifact metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SubmissionEvent {
    NewHost {
        host: String,
    },
    FetchedDocument {
        url: String,
        status: u16,
        content_type: Option<String>,
        body_size: usize,
    },
    RenderedDocument {
        url: String,
        screenshot_size: usize,
    },
}

impl SubmissionEvent {
    fn endpoint<'a>(&self, config: &'a SubmissionConfig) -> Option<&'a str> {
        match self {
            SubmissionEvent::NewHost { .. } => config.api_new_host.as_deref(),
            SubmissionEvent::FetchedDocument { .. } => config.api_requests.as_deref(),
            SubmissionEvent::RenderedDocument { .. } => config.api_selenium.as_deref(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            SubmissionEvent::NewHost { .. } => "new-host",
            SubmissionEvent::FetchedDocument { .. } => "fetched-document",
            SubmissionEvent::RenderedDocument { .. } => "rendered-document",
        }
    }
}

/// Fire-and-forget reporter for the three submission events (spec.md §3
/// "Submission sink (5%)"). Retries a reachable endpoint up to `API_RETRY`
/// times before falling back to a local JSON file under
/// `{PATH_DATA}/api/{yyyy-mm-dd}/` (spec.md §6, §7 `SubmissionError`, §8 P8).
pub struct SubmissionSink {
    client: reqwest::Client,
    config: SubmissionConfig,
    path_data: PathBuf,
}

impl SubmissionSink {
    pub fn new(config: SubmissionConfig, path_data: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            path_data: path_data.into(),
        }
    }

    pub async fn submit(&self, link: &Link, event: SubmissionEvent) -> Result<(), CrawlError> {
        let payload = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "hash": hash_hex(&link.hash),
            "url": link.url,
            "event": event,
        });

        match event.endpoint(&self.config) {
            Some(url) => self.post_with_retry(url, &payload, event.kind()).await,
            None => self.save_local(&payload, event.kind()).await,
        }
    }

    async fn post_with_retry(
        &self,
        url: &str,
        payload: &serde_json::Value,
        kind: &str,
    ) -> Result<(), CrawlError> {
        let mut attempt = 0;
        loop {
            match self.client.post(url).json(payload).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(kind, url, "submission accepted");
                    return Ok(());
                }
                Ok(resp) => {
                    warn!(kind, url, status = %resp.status(), attempt, "submission rejected");
                }
                Err(e) => {
                    warn!(kind, url, attempt, error = %e, "submission request failed");
                }
            }

            attempt += 1;
            if attempt >= self.config.api_retry {
                warn!(kind, url, "submission exhausted retries, saving locally");
                return self.save_local(payload, kind).await;
            }
            tokio::time::sleep(Duration::from_secs(1 << attempt.min(5))).await;
        }
    }

    async fn save_local(&self, payload: &serde_json::Value, kind: &str) -> Result<(), CrawlError> {
        let day = Utc::now().format("%Y-%m-%d").to_string();
        let dir = self.path_data.join("api").join(&day);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CrawlError::SubmissionError(e.to_string()))?;

        let filename = format!(
            "{kind}-{}-{}.json",
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            payload
                .get("hash")
                .and_then(|h| h.as_str())
                .unwrap_or("unknown")
        );
        let body = serde_json::to_vec_pretty(payload).map_err(|e| CrawlError::SubmissionError(e.to_string()))?;
        tokio::fs::write(dir.join(filename), body)
            .await
            .map_err(|e| CrawlError::SubmissionError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use darc_core::link::parse;
    use tempfile::tempdir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_with_no_endpoints() -> SubmissionConfig {
        SubmissionConfig {
            api_new_host: None,
            api_requests: None,
            api_selenium: None,
            api_retry: 2,
        }
    }

    #[tokio::test]
    async fn null_endpoint_writes_local_json_immediately() {
        let dir = tempdir().unwrap();
        let sink = SubmissionSink::new(config_with_no_endpoints(), dir.path());
        let link = parse("http://example.com/").unwrap();

        sink.submit(&link, SubmissionEvent::NewHost { host: "example.com".into() })
            .await
            .unwrap();

        let day_dir = dir.path().join("api").join(Utc::now().format("%Y-%m-%d").to_string());
        let mut entries = tokio::fs::read_dir(&day_dir).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let mut config = config_with_no_endpoints();
        config.api_requests = Some(format!("{}/requests", server.uri()));
        let sink = SubmissionSink::new(config, dir.path());
        let link = parse("http://example.com/page").unwrap();

        sink.submit(
            &link,
            SubmissionEvent::FetchedDocument {
                url: link.url.clone(),
                status: 200,
                content_type: Some("text/html".into()),
                body_size: 10,
            },
        )
        .await
        .unwrap();

        let day_dir = dir.path().join("api").join(Utc::now().format("%Y-%m-%d").to_string());
        let mut entries = tokio::fs::read_dir(&day_dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reachable_endpoint_does_not_write_locally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let mut config = config_with_no_endpoints();
        config.api_new_host = Some(format!("{}/new-host", server.uri()));
        let sink = SubmissionSink::new(config, dir.path());
        let link = parse("http://example.com/").unwrap();

        sink.submit(&link, SubmissionEvent::NewHost { host: "example.com".into() })
            .await
            .unwrap();

        let day_dir = dir.path().join("api");
        assert!(!day_dir.exists());
    }
}
