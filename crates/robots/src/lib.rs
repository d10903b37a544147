use std::time::{Duration, Instant};

use dashmap::DashMap;
use regex::Regex;
use robotstxt::DefaultMatcher;
use tracing::{debug, warn};

use darc_core::{FetchConfig, FetchSession, Link};

struct CachedPolicy {
    robots_body: Option<String>,
    fetched_at: Instant,
}

/// Per-host cached `robots.txt` parse (spec.md §4.4 / §3 `RobotsPolicy`).
///
/// The root path `/` is unconditionally allowed regardless of rules. A
/// failed fetch caches "no rules" (everything allowed) rather than
/// retrying every call.
pub struct RobotsCache {
    cache: DashMap<String, CachedPolicy>,
}

impl Default for RobotsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RobotsCache {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Onboard a host: fetch `robots.txt` and the sitemaps it declares (plus
    /// `/sitemap.xml` as a fallback), caching the parsed rules. Returns the
    /// sitemap `<loc>` URLs discovered, for the caller to push into
    /// `pending-fetch` (spec.md §4.4 steps 1-3).
    pub async fn onboard(
        &self,
        link: &Link,
        session: &dyn FetchSession,
        config: &FetchConfig,
    ) -> Vec<String> {
        let robots_url = format!("{}://{}/robots.txt", link.scheme, link.host);
        let mut sitemaps = Vec::new();

        let body = match darc_core::parse(&robots_url) {
            Ok(robots_link) => match session.get(&robots_link, config).await {
                Ok(resp) if resp.status < 400 => {
                    let text = String::from_utf8_lossy(&resp.body).to_string();
                    sitemaps.extend(extract_sitemap_directives(&text));
                    Some(text)
                }
                Ok(resp) => {
                    debug!(host = %link.host, status = resp.status, "robots.txt not found, allowing all");
                    None
                }
                Err(e) => {
                    warn!(host = %link.host, error = %e, "robots.txt fetch failed, allowing all");
                    None
                }
            },
            Err(_) => None,
        };

        self.cache.insert(
            link.host.clone(),
            CachedPolicy {
                robots_body: body,
                fetched_at: Instant::now(),
            },
        );

        // Fallback: always also try the conventional /sitemap.xml location.
        if let Ok(sitemap_link) = darc_core::parse(&format!("{}://{}/sitemap.xml", link.scheme, link.host)) {
            if let Ok(resp) = session.get(&sitemap_link, config).await {
                if resp.status < 400 {
                    let text = String::from_utf8_lossy(&resp.body).to_string();
                    sitemaps.extend(extract_loc_urls(&text));
                }
            }
        }

        sitemaps.sort();
        sitemaps.dedup();
        sitemaps
    }

    /// Answer "may fetch `link`?" (spec.md §4.4 step 4). `force` and the
    /// root path always short-circuit to `true`.
    pub fn may_fetch(&self, link: &Link, user_agent: &str, force: bool, time_cache: Option<Duration>) -> bool {
        if force || link.path == "/" {
            return true;
        }

        let Some(entry) = self.cache.get(&link.host) else {
            // Not onboarded yet — caller should onboard before asking.
            return true;
        };

        if let Some(ttl) = time_cache {
            if entry.fetched_at.elapsed() > ttl {
                return true; // expired cache — caller should re-onboard; allow in the meantime
            }
        }

        match &entry.robots_body {
            None => true,
            Some(body) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(body, user_agent, &link.url)
            }
        }
    }

    pub fn is_cached(&self, host: &str) -> bool {
        self.cache.contains_key(host)
    }

    /// Whether the cached entry (if any) has outlived `time_cache`
    /// (spec.md §4.4, "Cache TTL equals `TIME_CACHE`").
    pub fn is_expired(&self, host: &str, time_cache: Option<Duration>) -> bool {
        let Some(ttl) = time_cache else { return false };
        match self.cache.get(host) {
            Some(entry) => entry.fetched_at.elapsed() > ttl,
            None => true,
        }
    }
}

fn extract_sitemap_directives(robots_body: &str) -> Vec<String> {
    robots_body
        .lines()
        .filter_map(|line| {
            let lower = line.to_lowercase();
            if let Some(idx) = lower.find("sitemap:") {
                Some(line[idx + "sitemap:".len()..].trim().to_string())
            } else {
                None
            }
        })
        .collect()
}

fn extract_loc_urls(xml: &str) -> Vec<String> {
    let re = Regex::new(r"<loc>\s*([^<\s]+)\s*</loc>").expect("static regex");
    re.captures_iter(xml)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_sitemap_directive() {
        let body = "User-agent: *\nDisallow: /private\nSitemap: https://example.com/sitemap.xml\n";
        let sitemaps = extract_sitemap_directives(body);
        assert_eq!(sitemaps, vec!["https://example.com/sitemap.xml".to_string()]);
    }

    #[test]
    fn extracts_loc_urls() {
        let xml = "<urlset><url><loc>https://example.com/a</loc></url><url><loc>https://example.com/b</loc></url></urlset>";
        let locs = extract_loc_urls(xml);
        assert_eq!(locs, vec!["https://example.com/a", "https://example.com/b"]);
    }

    #[test]
    fn root_path_always_allowed() {
        let cache = RobotsCache::new();
        let link = darc_core::parse("https://example.com/").unwrap();
        assert!(cache.may_fetch(&link, "darc", false, Some(Duration::from_secs(60))));
    }

    #[test]
    fn force_bypasses_robots() {
        let cache = RobotsCache::new();
        let link = darc_core::parse("https://example.com/private").unwrap();
        assert!(cache.may_fetch(&link, "darc", true, Some(Duration::from_secs(60))));
    }

    #[test]
    fn uncached_host_defaults_allow() {
        let cache = RobotsCache::new();
        let link = darc_core::parse("https://example.com/private").unwrap();
        assert!(cache.may_fetch(&link, "darc", false, Some(Duration::from_secs(60))));
    }
}
