//! Engine configuration.

use std::collections::HashSet;
use std::time::Duration;

/// Freshness window under which a cached page 1 is trusted without a
/// revalidation fetch.
pub const RESPONSE_TTL: Duration = Duration::from_secs(5 * 60);

/// Tunables for one engine instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Normalized server base URL (scheme included, no trailing slash).
    pub base_url: String,
    /// Freshness window for cached responses.
    pub response_ttl: Duration,
    /// Pages fetched sequentially on first mount of a paginated key.
    pub initial_pages: u32,
    /// Image fetches allowed in flight per source over HTTP/1.x.
    pub per_source_limit: usize,
    /// Image fetches allowed in flight per source when the transport
    /// multiplexes over HTTP/2+ (head-of-line blocking is not a concern).
    pub multiplexed_limit: usize,
    /// Whether the connection to the server is known to multiplex.
    pub multiplexed: bool,
    /// Same-origin proxy path that cross-origin image URLs are routed
    /// through.
    pub proxy_prefix: String,
    /// Sources whose listings cannot be revalidated (revalidate is a no-op).
    pub revalidation_unsupported: HashSet<String>,
    /// Sources whose page 1 must never be skipped by the freshness window.
    pub revalidation_never_skip: HashSet<String>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(base_url.into()),
            response_ttl: RESPONSE_TTL,
            initial_pages: 3,
            per_source_limit: 2,
            multiplexed_limit: 64,
            multiplexed: false,
            proxy_prefix: "/api/v1/proxy".to_string(),
            revalidation_unsupported: HashSet::new(),
            revalidation_never_skip: HashSet::new(),
        }
    }

    /// Concurrency budget the image limiter should run with.
    pub fn image_concurrency(&self) -> usize {
        if self.multiplexed {
            self.multiplexed_limit
        } else {
            self.per_source_limit
        }
    }
}

/// Normalize a user-provided base URL.
///
/// Many users provide "localhost:4567" which reqwest rejects; add http://
/// if the scheme is missing and trim a trailing slash to prevent double
/// slashes in built URLs.
pub fn normalize_base_url(raw: String) -> String {
    let trimmed = raw.trim().trim_end_matches('/').to_string();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed
    } else {
        tracing::warn!(base_url = %trimmed, "base URL missing scheme, assuming http");
        format!("http://{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_scheme_and_trims_slash() {
        assert_eq!(
            normalize_base_url("localhost:4567/".into()),
            "http://localhost:4567"
        );
        assert_eq!(
            normalize_base_url("https://tatami.example/".into()),
            "https://tatami.example"
        );
    }

    #[test]
    fn image_concurrency_follows_multiplexing() {
        let mut config = ClientConfig::new("localhost:4567");
        assert_eq!(config.image_concurrency(), config.per_source_limit);
        config.multiplexed = true;
        assert_eq!(config.image_concurrency(), config.multiplexed_limit);
    }
}
