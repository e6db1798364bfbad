//! Share-link extraction.
//!
//! Messages are scanned for public share URLs of the configured drive host
//! (`https://<share_host>/s/<id>`). Links are returned in order of first
//! appearance with duplicates removed.

use regex::Regex;
use std::sync::LazyLock;

static SHARE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/s/([^/\s?#]+)").unwrap());

/// Finds share links for one drive host.
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    pattern: Regex,
}

impl LinkExtractor {
    pub fn new(share_host: &str) -> Self {
        let pattern = format!(r"https?://{}/s/[A-Za-z0-9_-]+", regex::escape(share_host));
        Self {
            // the host is escaped, so the pattern always compiles
            pattern: Regex::new(&pattern).unwrap(),
        }
    }

    pub fn extract(&self, text: &str) -> Vec<String> {
        let mut links: Vec<String> = Vec::new();
        for m in self.pattern.find_iter(text) {
            let link = m.as_str();
            if !links.iter().any(|l| l == link) {
                links.push(link.to_string());
            }
        }
        links
    }
}

/// Pull the share identifier out of a share URL.
pub fn share_id(url: &str) -> Option<&str> {
    SHARE_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}
