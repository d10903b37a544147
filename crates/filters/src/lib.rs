use darc_core::config::GateList;
use regex::Regex;

/// One allow/deny gate, compiled once from a [`GateList`].
///
/// Matching rule (spec.md §4.3): if `white` is non-empty and matches, allow;
/// else if `black` is non-empty and matches, deny; else return `fallback`.
pub struct RegexGate {
    white: Vec<Regex>,
    black: Vec<Regex>,
    fallback: bool,
}

impl RegexGate {
    pub fn compile(list: &GateList) -> Result<Self, regex::Error> {
        let white = list
            .white
            .iter()
            .map(|p| Regex::new(&p.to_lowercase()))
            .collect::<Result<Vec<_>, _>>()?;
        let black = list
            .black
            .iter()
            .map(|p| Regex::new(&p.to_lowercase()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            white,
            black,
            fallback: list.fallback,
        })
    }

    /// Substring-regex match against the lowercased input (spec.md §4.3).
    pub fn allow(&self, input: &str) -> bool {
        let lowered = input.to_lowercase();
        if !self.white.is_empty() {
            return self.white.iter().any(|r| r.is_match(&lowered));
        }
        if !self.black.is_empty() {
            return !self.black.iter().any(|r| r.is_match(&lowered));
        }
        self.fallback
    }
}

/// The proxy-tag gate compares entries as literal tags, case-insensitively,
/// rather than as regexes (spec.md §4.3, "allow-proxy compares
/// case-insensitively as a literal tag").
pub struct ProxyGate {
    white: Vec<String>,
    black: Vec<String>,
    fallback: bool,
}

impl ProxyGate {
    pub fn new(list: &GateList) -> Self {
        Self {
            white: list.white.iter().map(|s| s.to_lowercase()).collect(),
            black: list.black.iter().map(|s| s.to_lowercase()).collect(),
            fallback: list.fallback,
        }
    }

    pub fn allow(&self, tag: &str) -> bool {
        let lowered = tag.to_lowercase();
        if !self.white.is_empty() {
            return self.white.iter().any(|t| t == &lowered);
        }
        if !self.black.is_empty() {
            return !self.black.iter().any(|t| t == &lowered);
        }
        self.fallback
    }
}

/// All three gates bundled together, as consumed by the scheduler's
/// Filter step (spec.md §4.7 step 1 / §4.8 step 1).
pub struct Gates {
    pub host: RegexGate,
    pub mime: RegexGate,
    pub proxy: ProxyGate,
}

impl Gates {
    pub fn compile(config: &darc_core::config::FiltersConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            host: RegexGate::compile(&config.link)?,
            mime: RegexGate::compile(&config.mime)?,
            proxy: ProxyGate::new(&config.proxy),
        })
    }

    pub fn allow_host(&self, host: &str) -> bool {
        self.host.allow(host)
    }

    pub fn allow_mime(&self, content_type: &str) -> bool {
        self.mime.allow(content_type)
    }

    pub fn allow_proxy(&self, tag: &str) -> bool {
        self.proxy.allow(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use darc_core::config::GateList;

    fn list(white: &[&str], black: &[&str], fallback: bool) -> GateList {
        GateList {
            white: white.iter().map(|s| s.to_string()).collect(),
            black: black.iter().map(|s| s.to_string()).collect(),
            fallback,
        }
    }

    #[test]
    fn white_match_allows() {
        let gate = RegexGate::compile(&list(&["example"], &[], false)).unwrap();
        assert!(gate.allow("EXAMPLE.com"));
    }

    #[test]
    fn white_present_but_no_match_denies() {
        let gate = RegexGate::compile(&list(&["example"], &[], false)).unwrap();
        assert!(!gate.allow("other.com"));
    }

    #[test]
    fn black_match_denies() {
        let gate = RegexGate::compile(&list(&[], &["bad"], true)).unwrap();
        assert!(!gate.allow("bad.example.com"));
        assert!(gate.allow("good.example.com"));
    }

    #[test]
    fn empty_lists_use_fallback() {
        let gate = RegexGate::compile(&list(&[], &[], true)).unwrap();
        assert!(gate.allow("anything"));
        let gate = RegexGate::compile(&list(&[], &[], false)).unwrap();
        assert!(!gate.allow("anything"));
    }

    #[test]
    fn proxy_gate_is_literal_not_regex() {
        let gate = ProxyGate::new(&list(&["tor"], &[], false));
        assert!(gate.allow("Tor"));
        assert!(!gate.allow("i2p"));
    }
}
