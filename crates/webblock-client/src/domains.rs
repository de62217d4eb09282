//! Which hosts the blocking decision applies to.

use std::collections::HashSet;
use webblock_core::defaults::DEFAULT_BLOCKED_DOMAINS;

/// Blocked domains. A host matches a domain exactly or as a subdomain;
/// a leading `www.` is ignored on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainList {
    domains: Vec<String>,
}

impl Default for DomainList {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKED_DOMAINS.iter().copied())
    }
}

impl DomainList {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let domains = domains
            .into_iter()
            .map(|d| normalize(d.as_ref()))
            .filter(|d| !d.is_empty() && seen.insert(d.clone()))
            .collect();
        Self { domains }
    }

    pub fn matches(&self, host: &str) -> bool {
        let host = normalize(host);
        if host.is_empty() {
            return false;
        }
        self.domains.iter().any(|d| {
            host == *d
                || host
                    .strip_suffix(d.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }
}

fn normalize(raw: &str) -> String {
    let lower = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    match lower.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}
