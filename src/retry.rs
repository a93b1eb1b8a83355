//! Bounded retry loop over proxied fetches.

use std::sync::Arc;

use log::{info, warn};

use crate::document::Document;
use crate::error::{Error, Result};
use crate::fetch::FetchExecutor;
use crate::selector::ProxySelector;

/// Retries a fetch on fresh proxies until it succeeds or attempts run out.
///
/// There is no backoff between attempts: every failure has already taken the
/// failing proxy out of selection.
pub struct RetryOrchestrator {
    selector: Arc<ProxySelector>,
    executor: Arc<FetchExecutor>,
}

impl RetryOrchestrator {
    pub fn new(selector: Arc<ProxySelector>, executor: Arc<FetchExecutor>) -> Self {
        Self { selector, executor }
    }

    /// Fetch `url` and return it as a [`Document`].
    ///
    /// Each attempt selects a proxy unless `proxy` pins one. Single-attempt
    /// failures are absorbed; after `max_attempts` of them the result is
    /// [`Error::RetryExhausted`]. Pool exhaustion and fatal errors are
    /// returned immediately.
    pub async fn fetch_with_retry(
        &self,
        url: &str,
        proxy: Option<&str>,
        max_attempts: usize,
    ) -> Result<Document> {
        url::Url::parse(url).map_err(|source| Error::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        let mut attempts = 0;
        while attempts < max_attempts {
            info!("Trying to get {} (attempt {})", url, attempts + 1);
            let chosen = match proxy {
                Some(p) => p.to_string(),
                None => self.selector.select_proxy().await?,
            };
            match self.executor.fetch_rotated(url, &chosen).await {
                Ok(response) => return Ok(Document::from(response)),
                Err(Error::FetchFailed { proxy: failed, cause }) => {
                    attempts += 1;
                    warn!(
                        "Attempt {}/{} for {} via {} failed: {}",
                        attempts, max_attempts, url, failed, cause
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::RetryExhausted {
            url: url.to_string(),
            attempts,
        })
    }
}
