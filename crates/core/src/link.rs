use sha2::{Digest, Sha256};
use url::Url;

use crate::error::CrawlError;

/// Transport family a [`Link`] should be routed through.
///
/// `Null` is the identity transport (direct Internet). The non-fetchable
/// variants name link families that are recorded to a sink file instead of
/// ever being queued — see `spec.md` §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyTag {
    Null,
    Tor,
    I2p,
    Freenet,
    Zeronet,
    Data,
    Mailto,
    Tel,
    Irc,
    Magnet,
    Ed2k,
    Bitcoin,
    Ethereum,
    Javascript,
}

impl ProxyTag {
    /// Lowercase label used in config lookups (`PROXY_WHITE/BLACK_LIST`,
    /// transport/sink-file registry keys).
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyTag::Null => "null",
            ProxyTag::Tor => "tor",
            ProxyTag::I2p => "i2p",
            ProxyTag::Freenet => "freenet",
            ProxyTag::Zeronet => "zeronet",
            ProxyTag::Data => "data",
            ProxyTag::Mailto => "mailto",
            ProxyTag::Tel => "tel",
            ProxyTag::Irc => "irc",
            ProxyTag::Magnet => "magnet",
            ProxyTag::Ed2k => "ed2k",
            ProxyTag::Bitcoin => "bitcoin",
            ProxyTag::Ethereum => "ethereum",
            ProxyTag::Javascript => "javascript",
        }
    }

    /// Non-fetchable families are recorded to a sink file and dropped;
    /// see `spec.md` §4.1 table, "no (save)" column.
    pub fn is_fetchable(&self) -> bool {
        !matches!(
            self,
            ProxyTag::Data
                | ProxyTag::Mailto
                | ProxyTag::Tel
                | ProxyTag::Irc
                | ProxyTag::Magnet
                | ProxyTag::Ed2k
                | ProxyTag::Bitcoin
                | ProxyTag::Ethereum
                | ProxyTag::Javascript
        )
    }
}

/// A stable 16-byte digest identifying a canonicalized URL. Identity of a
/// [`Link`] for the lifetime of a process (spec.md §3, Link "identity is
/// `hash`").
pub type LinkHash = [u8; 16];

pub fn hash_hex(hash: &LinkHash) -> String {
    hex::encode(hash)
}

/// A canonicalized, immutable link. Constructed once via [`parse`]; never
/// mutated afterwards (spec.md §3, "Lifecycle").
#[derive(Debug, Clone)]
pub struct Link {
    pub url: String,
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub proxy_tag: ProxyTag,
    pub hash: LinkHash,
}

/// Parse and canonicalize a raw URL string into a [`Link`].
///
/// Canonicalization (spec.md §4.1): case-fold scheme and host, remove
/// default ports, leave query and fragment intact, collapse an empty path to
/// `/`. No other path normalization is performed.
pub fn parse(raw: &str) -> Result<Link, CrawlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CrawlError::MalformedUrl("empty URL".into()));
    }

    let url = Url::parse(trimmed).map_err(|e| CrawlError::MalformedUrl(e.to_string()))?;
    let scheme = url.scheme().to_ascii_lowercase();

    // Non-network schemes have no authority; host/path canonicalization
    // doesn't apply to them.
    if is_non_network_scheme(&scheme) {
        let canonical = trimmed.to_string();
        let hash = digest(&scheme, "", &canonical, url.query().unwrap_or(""), url.fragment().unwrap_or(""));
        return Ok(Link {
            url: canonical,
            scheme: scheme.clone(),
            host: String::new(),
            path: String::new(),
            proxy_tag: non_network_proxy_tag(&scheme).unwrap_or(ProxyTag::Null),
            hash,
        });
    }

    let host = url
        .host_str()
        .ok_or_else(|| CrawlError::MalformedUrl(format!("no host in {trimmed}")))?
        .to_ascii_lowercase();

    let mut canonical = url.clone();
    let _ = canonical.set_host(Some(&host));
    strip_default_port(&mut canonical);

    let mut path = canonical.path().to_string();
    if path.is_empty() {
        path = "/".to_string();
    }
    let _ = canonical.set_path(&path);

    let proxy_tag = proxy_tag_for(&scheme, &host);
    let hash = digest(
        &scheme,
        &host,
        &path,
        canonical.query().unwrap_or(""),
        canonical.fragment().unwrap_or(""),
    );

    Ok(Link {
        url: canonical.to_string(),
        scheme,
        host,
        path,
        proxy_tag,
        hash,
    })
}

fn strip_default_port(url: &mut Url) {
    let default_port = match url.scheme() {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        "ftp" => Some(21),
        _ => None,
    };
    if let (Some(default), Some(actual)) = (default_port, url.port()) {
        if default == actual {
            let _ = url.set_port(None);
        }
    }
}

fn is_non_network_scheme(scheme: &str) -> bool {
    non_network_proxy_tag(scheme).is_some()
}

fn non_network_proxy_tag(scheme: &str) -> Option<ProxyTag> {
    Some(match scheme {
        "data" => ProxyTag::Data,
        "mailto" => ProxyTag::Mailto,
        "tel" => ProxyTag::Tel,
        "irc" => ProxyTag::Irc,
        "magnet" => ProxyTag::Magnet,
        "ed2k" => ProxyTag::Ed2k,
        "bitcoin" => ProxyTag::Bitcoin,
        "ethereum" => ProxyTag::Ethereum,
        "javascript" => ProxyTag::Javascript,
        _ => return None,
    })
}

/// Pure function of scheme/host → proxy tag (spec.md §4.1 table, extended
/// with `freenet`/`zeronet` per the Purpose & Scope network list).
fn proxy_tag_for(scheme: &str, host: &str) -> ProxyTag {
    if scheme == "freenet" {
        return ProxyTag::Freenet;
    }
    match scheme {
        "http" | "https" => {
            if host.ends_with(".onion") {
                ProxyTag::Tor
            } else if host.ends_with(".i2p") {
                ProxyTag::I2p
            } else if host.ends_with(".bit") {
                ProxyTag::Zeronet
            } else {
                ProxyTag::Null
            }
        }
        "ftp" | "ws" | "wss" => ProxyTag::Null,
        _ => ProxyTag::Null,
    }
}

fn digest(scheme: &str, host: &str, path: &str, query: &str, fragment: &str) -> LinkHash {
    let mut hasher = Sha256::new();
    hasher.update(scheme.as_bytes());
    hasher.update(b"|");
    hasher.update(host.as_bytes());
    hasher.update(b"|");
    hasher.update(path.as_bytes());
    hasher.update(b"|");
    hasher.update(query.as_bytes());
    hasher.update(b"|");
    hasher.update(fragment.as_bytes());
    let full = hasher.finalize();
    let mut out = [0u8; 16];
    out.copy_from_slice(&full[..16]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_scheme_and_host_case() {
        let a = parse("HTTP://Example.COM/Path").unwrap();
        let b = parse("http://example.com/Path").unwrap();
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn strips_default_port() {
        let a = parse("http://example.com:80/x").unwrap();
        let b = parse("http://example.com/x").unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.url, b.url);
    }

    #[test]
    fn keeps_non_default_port() {
        let a = parse("http://example.com:8080/x").unwrap();
        assert!(a.url.contains(":8080"));
    }

    #[test]
    fn collapses_empty_path() {
        let a = parse("http://example.com").unwrap();
        assert_eq!(a.path, "/");
    }

    #[test]
    fn preserves_query_and_fragment() {
        let a = parse("http://example.com/x?y=1#frag").unwrap();
        assert!(a.url.contains("?y=1"));
        assert!(a.url.contains("#frag"));
    }

    #[test]
    fn rejects_empty() {
        assert!(parse("   ").is_err());
    }

    #[test]
    fn tor_proxy_tag() {
        let a = parse("http://abcexample.onion/").unwrap();
        assert_eq!(a.proxy_tag, ProxyTag::Tor);
    }

    #[test]
    fn i2p_proxy_tag() {
        let a = parse("http://example.i2p/").unwrap();
        assert_eq!(a.proxy_tag, ProxyTag::I2p);
    }

    #[test]
    fn zeronet_proxy_tag() {
        let a = parse("http://example.bit/").unwrap();
        assert_eq!(a.proxy_tag, ProxyTag::Zeronet);
    }

    #[test]
    fn clearnet_proxy_tag() {
        let a = parse("https://example.com/").unwrap();
        assert_eq!(a.proxy_tag, ProxyTag::Null);
    }

    #[test]
    fn non_fetchable_families() {
        assert_eq!(parse("mailto:x@y.com").unwrap().proxy_tag, ProxyTag::Mailto);
        assert_eq!(parse("magnet:?xt=abc").unwrap().proxy_tag, ProxyTag::Magnet);
        assert_eq!(parse("data:text/plain;base64,abc").unwrap().proxy_tag, ProxyTag::Data);
        assert!(!ProxyTag::Mailto.is_fetchable());
        assert!(ProxyTag::Null.is_fetchable());
    }
}
