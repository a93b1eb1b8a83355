//! # scrape-proxy-pool
//!
//! A self-healing pool of HTTP forward proxies for scraping.
//!
//! Proxies are kept in one of three partitions (unchecked, working and
//! not working) in an injected [`Storage`]. Every fetch relabels the proxy
//! it used, the pool is topped up from unchecked and not-working proxies
//! when it runs low, and a bounded retry loop rotates through working
//! proxies until a page comes back.
//!
//! ```no_run
//! use std::sync::Arc;
//! use scrape_proxy_pool::{PoolConfig, ProxyPool, SqliteStorage};
//!
//! # async fn run() -> scrape_proxy_pool::Result<()> {
//! let storage = Arc::new(SqliteStorage::open("proxy_pool.db").await?);
//! let pool = ProxyPool::new(PoolConfig::default(), storage);
//! pool.ingest_source("proxy_list.txt").await?;
//! let page = pool.fetch_with_retry("http://example.com/").await?;
//! println!("{:?}", page.title());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crawler;
pub mod document;
pub mod error;
pub mod fetch;
pub mod identity;
pub mod lifecycle;
pub mod middleware;
pub mod pool;
pub mod proxy;
pub mod retry;
pub mod scheduler;
pub mod seed;
pub mod selector;
pub mod storage;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::{PoolConfig, PoolConfigBuilder};
pub use crawler::{CrawlReport, Crawler, SkippedUrl};
pub use document::Document;
pub use error::{Error, FetchFailure, Result, StorageError};
pub use fetch::FetchExecutor;
pub use identity::Identity;
pub use lifecycle::ProxyLifecycle;
pub use middleware::ProxyPoolMiddleware;
pub use pool::{PoolStats, ProxyPool};
pub use proxy::ProxyState;
pub use retry::RetryOrchestrator;
pub use scheduler::{HealthScheduler, RefreshKind, RefreshReport};
pub use selector::ProxySelector;
pub use storage::{MemoryStorage, SqliteStorage, Storage};
pub use transport::{FetchResponse, ProxiedGet, ReqwestTransport, Transport};
