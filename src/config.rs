//! Configuration for the proxy pool.

use std::time::Duration;

use crate::identity::{DEFAULT_REFERERS, DEFAULT_USER_AGENTS};

/// Statuses that prove a proxy relayed the request.
pub const DEFAULT_VALID_STATUSES: [u16; 5] = [200, 301, 302, 307, 404];

/// Configuration for the proxy pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Cheap endpoint requested when validating a proxy.
    pub probe_url: String,
    /// Timeout applied to every outbound request.
    pub request_timeout: Duration,
    /// Response statuses that count as a working proxy.
    pub valid_statuses: Vec<u16>,
    /// Working count at or above which a refresh does nothing.
    pub high_water_mark: usize,
    /// Working count below which selection refreshes the pool first.
    pub low_water_mark: usize,
    /// Maximum unchecked proxies validated per refresh.
    pub unchecked_batch: usize,
    /// Number of not-working proxies sampled (with replacement) per refresh.
    pub not_working_sample: usize,
    /// Attempts made by the retry loop before giving up on a URL.
    pub max_attempts: usize,
    /// Probes run concurrently during a refresh.
    pub probe_concurrency: usize,
    /// URLs fetched concurrently by the crawler.
    pub crawl_workers: usize,
    /// Candidate User-Agent values.
    pub user_agents: Vec<String>,
    /// Candidate Referer values.
    pub referers: Vec<String>,
    /// Global cap on outbound requests per second, if any.
    pub max_requests_per_second: Option<f64>,
}

impl PoolConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    /// Whether `status` proves the proxy relayed the request.
    pub fn is_valid_status(&self, status: u16) -> bool {
        self.valid_statuses.contains(&status)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfigBuilder::new().build()
    }
}

/// Builder for `PoolConfig`.
#[derive(Default)]
pub struct PoolConfigBuilder {
    probe_url: Option<String>,
    request_timeout: Option<Duration>,
    valid_statuses: Option<Vec<u16>>,
    high_water_mark: Option<usize>,
    low_water_mark: Option<usize>,
    unchecked_batch: Option<usize>,
    not_working_sample: Option<usize>,
    max_attempts: Option<usize>,
    probe_concurrency: Option<usize>,
    crawl_workers: Option<usize>,
    user_agents: Option<Vec<String>>,
    referers: Option<Vec<String>>,
    max_requests_per_second: Option<f64>,
}

impl PoolConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the URL used to validate proxies.
    pub fn probe_url(mut self, url: impl Into<String>) -> Self {
        self.probe_url = Some(url.into());
        self
    }

    /// Set the timeout for every outbound request.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the statuses that count as a working proxy.
    pub fn valid_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.valid_statuses = Some(statuses);
        self
    }

    /// Set the working count at or above which a refresh does nothing.
    pub fn high_water_mark(mut self, count: usize) -> Self {
        self.high_water_mark = Some(count);
        self
    }

    /// Set the working count below which selection refreshes first.
    pub fn low_water_mark(mut self, count: usize) -> Self {
        self.low_water_mark = Some(count);
        self
    }

    /// Set how many unchecked proxies one refresh validates.
    pub fn unchecked_batch(mut self, count: usize) -> Self {
        self.unchecked_batch = Some(count);
        self
    }

    /// Set how many not-working proxies one refresh samples.
    pub fn not_working_sample(mut self, count: usize) -> Self {
        self.not_working_sample = Some(count);
        self
    }

    /// Set how many attempts the retry loop makes per URL.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Set how many probes run at once during a refresh.
    pub fn probe_concurrency(mut self, count: usize) -> Self {
        self.probe_concurrency = Some(count);
        self
    }

    /// Set how many URLs the crawler fetches at once.
    pub fn crawl_workers(mut self, count: usize) -> Self {
        self.crawl_workers = Some(count);
        self
    }

    /// Replace the User-Agent candidates.
    pub fn user_agents(mut self, agents: Vec<impl Into<String>>) -> Self {
        self.user_agents = Some(agents.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the Referer candidates.
    pub fn referers(mut self, referers: Vec<impl Into<String>>) -> Self {
        self.referers = Some(referers.into_iter().map(Into::into).collect());
        self
    }

    /// Throttle all outbound requests to at most `rps` per second.
    pub fn max_requests_per_second(mut self, rps: f64) -> Self {
        self.max_requests_per_second = Some(rps);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> PoolConfig {
        PoolConfig {
            probe_url: self.probe_url.unwrap_or_else(|| "http://ident.me/".to_string()),
            request_timeout: self.request_timeout.unwrap_or(Duration::from_secs(4)),
            valid_statuses: self
                .valid_statuses
                .unwrap_or_else(|| DEFAULT_VALID_STATUSES.to_vec()),
            high_water_mark: self.high_water_mark.unwrap_or(50),
            low_water_mark: self.low_water_mark.unwrap_or(15),
            unchecked_batch: self.unchecked_batch.unwrap_or(100),
            not_working_sample: self.not_working_sample.unwrap_or(20),
            max_attempts: self.max_attempts.unwrap_or(9).max(1),
            probe_concurrency: self.probe_concurrency.unwrap_or(8).max(1),
            crawl_workers: self.crawl_workers.unwrap_or(4).max(1),
            user_agents: self
                .user_agents
                .unwrap_or_else(|| DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()),
            referers: self
                .referers
                .unwrap_or_else(|| DEFAULT_REFERERS.iter().map(|s| s.to_string()).collect()),
            max_requests_per_second: self.max_requests_per_second.filter(|rps| *rps > 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.probe_url, "http://ident.me/");
        assert_eq!(config.request_timeout, Duration::from_secs(4));
        assert_eq!(config.high_water_mark, 50);
        assert_eq!(config.low_water_mark, 15);
        assert_eq!(config.unchecked_batch, 100);
        assert_eq!(config.not_working_sample, 20);
        assert_eq!(config.max_attempts, 9);
        assert!(config.max_requests_per_second.is_none());
        assert!(!config.user_agents.is_empty());
        assert!(!config.referers.is_empty());
    }

    #[test]
    fn test_valid_statuses_include_redirects_and_not_found() {
        let config = PoolConfig::default();
        for status in [200, 301, 302, 307, 404] {
            assert!(config.is_valid_status(status), "{status} should be valid");
        }
        for status in [403, 429, 500, 502, 503] {
            assert!(!config.is_valid_status(status), "{status} should be invalid");
        }
    }

    #[test]
    fn test_builder_overrides_and_clamps() {
        let config = PoolConfig::builder()
            .max_attempts(0)
            .probe_concurrency(0)
            .max_requests_per_second(-1.0)
            .user_agents(vec!["ua"])
            .build();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.probe_concurrency, 1);
        assert!(config.max_requests_per_second.is_none());
        assert_eq!(config.user_agents, vec!["ua".to_string()]);
    }
}
