use std::collections::HashMap;

use darc_core::{CrawlError, ProxyTag, RenderDriver};

/// Mapping from proxy tag to render driver (spec.md §4.5 "Transport
/// registry", render-driver half). Same registration discipline as
/// `darc-networks::TransportRegistry`: built once at startup, immutable
/// afterwards.
pub struct RenderDriverRegistry {
    drivers: HashMap<&'static str, Box<dyn RenderDriver>>,
}

impl Default for RenderDriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    pub fn register(&mut self, tag: &'static str, driver: Box<dyn RenderDriver>) {
        self.drivers.insert(tag, driver);
    }

    pub fn get(&self, tag: ProxyTag) -> Result<&dyn RenderDriver, CrawlError> {
        self.drivers
            .get(tag.as_str())
            .map(|b| b.as_ref())
            .ok_or_else(|| CrawlError::InvalidScheme(tag.as_str().to_string()))
    }
}
