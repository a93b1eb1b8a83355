//! Concurrent crawl of many URLs over one shared pool.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{info, warn};

use crate::document::Document;
use crate::error::Result;
use crate::pool::ProxyPool;

/// A URL given up on during a crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUrl {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct CrawlReport {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedUrl>,
}

/// Runs `fetch_with_retry` for many URLs with a fixed number of workers.
pub struct Crawler {
    pool: Arc<ProxyPool>,
    workers: usize,
}

impl Crawler {
    pub fn new(pool: Arc<ProxyPool>) -> Self {
        let workers = pool.config.crawl_workers;
        Self { pool, workers }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Fetch every URL. URLs that cannot be fetched are recorded and
    /// skipped; only a fatal error stops the run.
    pub async fn run<I>(&self, urls: I) -> Result<CrawlReport>
    where
        I: IntoIterator<Item = String>,
    {
        let pool = &self.pool;
        let mut results = stream::iter(urls)
            .map(|url| async move {
                let result = pool.fetch_with_retry(&url).await;
                (url, result)
            })
            .buffer_unordered(self.workers);

        let mut report = CrawlReport::default();
        while let Some((url, result)) = results.next().await {
            match result {
                Ok(document) => report.documents.push(document),
                Err(e) if e.is_fatal() => {
                    warn!("Stopping crawl at {}: {}", url, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", url, e);
                    report.skipped.push(SkippedUrl {
                        url,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Crawl finished: {} fetched, {} skipped",
            report.documents.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}
