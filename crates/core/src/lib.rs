pub mod config;
pub mod error;
pub mod link;
pub mod types;

pub use config::AppConfig;
pub use error::CrawlError;
pub use link::{hash_hex, parse, Link, LinkHash, ProxyTag};
pub use types::*;
