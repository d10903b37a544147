mod registry;

pub use registry::RenderDriverRegistry;

use std::ffi::OsString;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptionsBuilder};
use tracing::{debug, warn};

use darc_core::{CrawlError, Link, RenderDriver, RenderResponse, EMPTY_RENDER_SENTINEL};

/// A headless-Chrome render driver bound to one proxy (spec.md §4.5,
/// render-driver factory). One instance per worker — browser drivers are
/// not shared across workers (spec.md §5 "Shared-resource discipline").
///
/// Grounded on `crates/registration/src/browser.rs`'s `HeadlessBrowser`.
pub struct ChromeRenderDriver {
    browser: Browser,
}

impl ChromeRenderDriver {
    pub fn new(proxy_addr: Option<&str>) -> Result<Self, CrawlError> {
        let mut extra_args: Vec<OsString> = vec![
            OsString::from("--no-sandbox"),
            OsString::from("--disable-dev-shm-usage"),
            OsString::from("--disable-gpu"),
        ];
        if let Some(proxy) = proxy_addr {
            extra_args.push(OsString::from(format!("--proxy-server={proxy}")));
        }

        let launch_options = LaunchOptionsBuilder::default()
            .headless(true)
            .window_size(Some((1920, 1080)))
            .args(extra_args.iter().map(|a| a.as_ref()).collect())
            .build()
            .map_err(|e| CrawlError::Network(e.to_string()))?;

        let browser = Browser::new(launch_options).map_err(|e| CrawlError::Network(e.to_string()))?;
        Ok(Self { browser })
    }
}

#[async_trait]
impl RenderDriver for ChromeRenderDriver {
    async fn load(&self, link: &Link, wait: Duration) -> Result<RenderResponse, CrawlError> {
        debug!(url = %link.url, "rendering");

        let tab = self
            .browser
            .new_tab()
            .map_err(|e| CrawlError::Network(e.to_string()))?;

        tab.navigate_to(&link.url)
            .map_err(|e| CrawlError::Network(e.to_string()))?;
        tab.wait_until_navigated()
            .map_err(|e| CrawlError::Timeout(wait.as_secs()))?;

        // Additional settle wait beyond document-ready, per spec.md §4.5
        // render-driver contract ("after the document-ready event plus an
        // additional wait SE_WAIT").
        tokio::time::sleep(wait).await;

        let html = tab
            .get_content()
            .map_err(|e| CrawlError::Network(e.to_string()))?;

        if html.trim() == EMPTY_RENDER_SENTINEL {
            warn!(url = %link.url, "render produced sentinel empty page");
        }

        let screenshot = tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| CrawlError::Network(e.to_string()))?;

        Ok(RenderResponse {
            html,
            screenshot,
            rendered_at: chrono::Utc::now(),
        })
    }
}
