use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CrawlError;
use crate::link::Link;

/// Per-call fetch parameters (spec.md §4.5, fetch session contract).
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_body_size: usize,
    pub follow_redirects: bool,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_body_size: 10 * 1024 * 1024,
            follow_redirects: true,
            user_agent: "darc/0.1".to_string(),
        }
    }
}

/// Result of a fetch-session `get` (spec.md §4.5). Must carry status,
/// headers, final URL, cookies, and bytes.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub cookies: Vec<String>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub response_time_ms: u64,
}

/// Result of a render-driver `load` (spec.md §4.5): rendered HTML plus a
/// full-page screenshot.
#[derive(Debug, Clone)]
pub struct RenderResponse {
    pub html: String,
    pub screenshot: Vec<u8>,
    pub rendered_at: DateTime<Utc>,
}

/// Sentinel empty page used to detect a transient render failure
/// (spec.md §4.8 step 6, §7 `EmptyRender`).
pub const EMPTY_RENDER_SENTINEL: &str = "<html><head></head><body></body></html>";

/// A fetch session bound to one proxy tag's transport (spec.md §4.5).
/// Implementors live in `darc-networks`.
#[async_trait]
pub trait FetchSession: Send + Sync {
    async fn get(&self, link: &Link, config: &FetchConfig) -> Result<FetchResponse, CrawlError>;

    /// Content-type probe used by link extraction's `CHECK_NG` option
    /// (spec.md §4.9). Default implementation falls back to a full `get`
    /// since not every transport distinguishes HEAD from GET; implementors
    /// may override with a cheaper call.
    async fn head(&self, link: &Link, config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        self.get(link, config).await
    }
}

/// A render driver bound to one proxy tag's transport (spec.md §4.5).
/// Implementors live in `darc-render`.
#[async_trait]
pub trait RenderDriver: Send + Sync {
    async fn load(&self, link: &Link, wait: Duration) -> Result<RenderResponse, CrawlError>;
}

/// Which pool a [`Link`] belongs to — the two frontier queues of spec.md §2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Fetch,
    Render,
}

impl PoolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::Fetch => "fetch",
            PoolKind::Render => "render",
        }
    }
}

/// `kind` discriminator for [`record_visit`]/[`last_visit`] in the frontier
/// contract (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitKind {
    Fetched,
    Rendered,
}
