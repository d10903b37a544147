use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use darc_core::{FetchConfig, FetchSession, Link};
use darc_filters::Gates;

/// Attributes that may carry a link, per spec.md §4.9.
const LINK_ATTRS: &[&str] = &["href", "src", "data-href", "action", "poster", "formaction"];

/// URL-shaped text-node scan, covering schemed network URLs and the
/// non-network schemes of spec.md §4.1.
static URL_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:https?|ftp|wss?|data|mailto|tel|irc|magnet|ed2k|bitcoin|ethereum|javascript):[^\s<>\x22']+",
    )
    .unwrap()
});

/// Extract and resolve every candidate link from `html`, relative to
/// `base_url`. Deduplicated within this call (spec.md §4.9).
pub fn extract(html: &str, base_url: &str) -> Vec<String> {
    let base = match Url::parse(base_url) {
        Ok(u) => u,
        Err(e) => {
            debug!(base_url, error = %e, "cannot parse base url, skipping extraction");
            return Vec::new();
        }
    };

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for attr in LINK_ATTRS {
        let selector = match Selector::parse(&format!("[{attr}]")) {
            Ok(s) => s,
            Err(_) => continue,
        };
        for el in document.select(&selector) {
            if let Some(raw) = el.value().attr(attr) {
                push_resolved(&base, raw, &mut seen, &mut out);
            }
        }
    }

    if let Ok(srcset_selector) = Selector::parse("[srcset]") {
        for el in document.select(&srcset_selector) {
            if let Some(raw) = el.value().attr("srcset") {
                for candidate in raw.split(',') {
                    let url_part = candidate.trim().split_whitespace().next().unwrap_or("");
                    if !url_part.is_empty() {
                        push_resolved(&base, url_part, &mut seen, &mut out);
                    }
                }
            }
        }
    }

    for text_node in document.root_element().text() {
        for m in URL_LIKE.find_iter(text_node) {
            push_resolved(&base, m.as_str(), &mut seen, &mut out);
        }
    }

    out
}

fn push_resolved(base: &Url, raw: &str, seen: &mut HashSet<String>, out: &mut Vec<String>) {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return;
    }

    let resolved = if let Ok(absolute) = Url::parse(raw) {
        absolute.to_string()
    } else {
        match base.join(raw) {
            Ok(joined) => joined.to_string(),
            Err(_) => return,
        }
    };

    if seen.insert(resolved.clone()) {
        out.push(resolved);
    }
}

/// `CHECK_NG` content-type filter (spec.md §4.9, final bullet): issue a HEAD
/// through the link's proxy and keep only candidates whose content-type is
/// not obviously uninteresting.
pub async fn filter_by_content_type(
    session: &dyn FetchSession,
    config: &FetchConfig,
    candidates: Vec<Link>,
    allowed: &Gates,
) -> Vec<Link> {
    let mut kept = Vec::with_capacity(candidates.len());
    for link in candidates {
        match session.head(&link, config).await {
            Ok(resp) => {
                let mime = resp
                    .content_type
                    .as_deref()
                    .map(|c| c.split(';').next().unwrap_or(c).trim())
                    .unwrap_or("");
                if mime.is_empty() || allowed.allow_mime(mime) {
                    kept.push(link);
                }
            }
            Err(e) => {
                debug!(url = %link.url, error = %e, "CHECK_NG head probe failed, dropping candidate");
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_attribute_links() {
        let html = r#"<a href="/a">x</a><img src="b.png"><form action="/submit"></form>"#;
        let links = extract(html, "http://example.com/dir/");
        assert!(links.contains(&"http://example.com/a".to_string()));
        assert!(links.contains(&"http://example.com/dir/b.png".to_string()));
        assert!(links.contains(&"http://example.com/submit".to_string()));
    }

    #[test]
    fn extracts_srcset_candidates() {
        let html = r#"<img srcset="small.jpg 480w, large.jpg 800w">"#;
        let links = extract(html, "http://example.com/");
        assert!(links.contains(&"http://example.com/small.jpg".to_string()));
        assert!(links.contains(&"http://example.com/large.jpg".to_string()));
    }

    #[test]
    fn extracts_text_node_urls_including_non_network_schemes() {
        let html = r#"<p>contact mailto:a@b.com or see http://other.example/page</p>"#;
        let links = extract(html, "http://example.com/");
        assert!(links.iter().any(|l| l.starts_with("mailto:a@b.com")));
        assert!(links.contains(&"http://other.example/page".to_string()));
    }

    #[test]
    fn dedups_within_call() {
        let html = r#"<a href="/a">x</a><a href="/a">y</a>"#;
        let links = extract(html, "http://example.com/");
        assert_eq!(links.iter().filter(|l| l.ends_with("/a")).count(), 1);
    }

    #[test]
    fn skips_fragment_only_hrefs() {
        let html = r##"<a href="#top">x</a>"##;
        let links = extract(html, "http://example.com/");
        assert!(links.is_empty());
    }

    #[test]
    fn invalid_base_url_yields_no_links() {
        let links = extract("<a href=\"/a\">x</a>", "not a url");
        assert!(links.is_empty());
    }
}
