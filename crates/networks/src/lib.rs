mod common;
pub mod freenet;
pub mod i2p;
pub mod null;
pub mod tor;
pub mod zeronet;

use std::collections::HashMap;

pub use freenet::FreenetSession;
pub use i2p::I2pSession;
pub use null::NullSession;
pub use tor::TorSession;
pub use zeronet::ZeronetSession;

use darc_core::{CrawlError, FetchSession, ProxyTag};

/// Mapping from proxy tag to fetch session (spec.md §4.5 "Transport
/// registry"). The identity entry (`null`) is the direct-Internet
/// transport; every other entry proxies through the configured addresses.
///
/// Registration happens at startup only — no mutation after the scheduler
/// starts (spec.md §9 "Process-wide registries").
pub struct TransportRegistry {
    sessions: HashMap<&'static str, Box<dyn FetchSession>>,
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    pub fn register(&mut self, tag: &'static str, session: Box<dyn FetchSession>) {
        self.sessions.insert(tag, session);
    }

    pub fn get(&self, tag: ProxyTag) -> Result<&dyn FetchSession, CrawlError> {
        self.sessions
            .get(tag.as_str())
            .map(|b| b.as_ref())
            .ok_or_else(|| CrawlError::InvalidScheme(tag.as_str().to_string()))
    }

    pub fn has(&self, tag: ProxyTag) -> bool {
        self.sessions.contains_key(tag.as_str())
    }
}
