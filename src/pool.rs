//! The proxy pool: storage, lifecycle, health and fetch wired together.

use std::sync::Arc;

use log::info;
use tokio::sync::watch;

use crate::config::PoolConfig;
use crate::document::Document;
use crate::error::Result;
use crate::fetch::FetchExecutor;
use crate::lifecycle::ProxyLifecycle;
use crate::proxy::ProxyState;
use crate::retry::RetryOrchestrator;
use crate::scheduler::{HealthScheduler, RefreshReport};
use crate::seed;
use crate::selector::ProxySelector;
use crate::storage::Storage;
use crate::transport::{FetchResponse, ReqwestTransport, Transport};

/// Number of proxies in each partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub unchecked: usize,
    pub working: usize,
    pub not_working: usize,
}

impl PoolStats {
    pub fn total(&self) -> usize {
        self.unchecked + self.working + self.not_working
    }
}

/// A pool of proxies that can be used for HTTP requests.
///
/// Built once per process around an injected [`Storage`]; share it behind
/// an `Arc` between workers.
pub struct ProxyPool {
    /// Configuration for the pool.
    pub config: Arc<PoolConfig>,
    lifecycle: ProxyLifecycle,
    executor: Arc<FetchExecutor>,
    scheduler: Arc<HealthScheduler>,
    selector: Arc<ProxySelector>,
    retry: RetryOrchestrator,
    shutdown: watch::Sender<bool>,
}

impl ProxyPool {
    /// Create a pool that fetches over the network with reqwest.
    pub fn new(config: PoolConfig, storage: Arc<dyn Storage>) -> Self {
        Self::with_transport(config, storage, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(
        config: PoolConfig,
        storage: Arc<dyn Storage>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let config = Arc::new(config);
        let lifecycle = ProxyLifecycle::new(storage);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let executor = Arc::new(FetchExecutor::new(
            config.clone(),
            lifecycle.clone(),
            transport,
            shutdown_rx,
        ));
        let scheduler = Arc::new(HealthScheduler::new(
            config.clone(),
            lifecycle.clone(),
            executor.clone(),
        ));
        let selector = Arc::new(ProxySelector::new(
            config.clone(),
            lifecycle.clone(),
            scheduler.clone(),
        ));
        let retry = RetryOrchestrator::new(selector.clone(), executor.clone());

        Self {
            config,
            lifecycle,
            executor,
            scheduler,
            selector,
            retry,
            shutdown,
        }
    }

    /// Replace the unchecked partition with `addresses`.
    pub async fn ingest_seeds(&self, addresses: &[String]) -> Result<usize> {
        self.lifecycle.ingest(addresses).await
    }

    /// Load a seed list from a file or URL and ingest it.
    pub async fn ingest_source(&self, source: &str) -> Result<usize> {
        let addresses = seed::load_seed_source(source).await?;
        self.ingest_seeds(&addresses).await
    }

    /// Run a health refresh now. See [`HealthScheduler::refresh`].
    pub async fn refresh(&self) -> Result<RefreshReport> {
        self.scheduler.refresh().await
    }

    /// Pick a working proxy, refreshing first if the pool is thin.
    pub async fn select_proxy(&self) -> Result<String> {
        self.selector.select_proxy().await
    }

    /// One attempt at `url` through `proxy`, with a rotated identity.
    pub async fn fetch(&self, url: &str, proxy: &str) -> Result<FetchResponse> {
        self.executor.fetch_rotated(url, proxy).await
    }

    /// Fetch `url` with the configured number of attempts.
    pub async fn fetch_with_retry(&self, url: &str) -> Result<Document> {
        self.retry
            .fetch_with_retry(url, None, self.config.max_attempts)
            .await
    }

    pub fn lifecycle(&self) -> &ProxyLifecycle {
        &self.lifecycle
    }

    pub fn executor(&self) -> &Arc<FetchExecutor> {
        &self.executor
    }

    pub fn retry(&self) -> &RetryOrchestrator {
        &self.retry
    }

    /// Get statistics about the proxy pool.
    pub async fn stats(&self) -> Result<PoolStats> {
        Ok(PoolStats {
            unchecked: self.lifecycle.count(ProxyState::Unchecked).await?,
            working: self.lifecycle.count(ProxyState::Working).await?,
            not_working: self.lifecycle.count(ProxyState::NotWorking).await?,
        })
    }

    /// Abort in-flight fetches and refuse new ones.
    pub fn shutdown(&self) {
        info!("Shutting down proxy pool");
        self.shutdown.send_replace(true);
    }
}
