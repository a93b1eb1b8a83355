//! Keeps the working partition populated at bounded validation cost.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use rand::seq::IndexedRandom;
use tokio::sync::Mutex;

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::fetch::FetchExecutor;
use crate::lifecycle::ProxyLifecycle;
use crate::proxy::ProxyState;
use crate::storage::{Column, Value};

/// Which branch a refresh took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    /// The working partition did not exist and was built from scratch.
    Initialized,
    /// The pool was below the high-water mark; a bounded batch was validated.
    ToppedUp,
    /// The pool was at or above the high-water mark.
    Healthy,
    /// Another caller's refresh finished while this one waited.
    Coalesced,
}

/// Summary of one refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub kind: RefreshKind,
    /// Probes issued (duplicates from sampling count separately).
    pub validated: usize,
    /// Probes that succeeded.
    pub promoted: usize,
}

impl RefreshReport {
    fn idle(kind: RefreshKind) -> Self {
        Self {
            kind,
            validated: 0,
            promoted: 0,
        }
    }
}

/// Decides which non-working proxies to (re)validate, and how many.
pub struct HealthScheduler {
    config: Arc<PoolConfig>,
    lifecycle: ProxyLifecycle,
    executor: Arc<FetchExecutor>,
    refresh_lock: Mutex<()>,
    completed: AtomicU64,
}

impl HealthScheduler {
    pub fn new(
        config: Arc<PoolConfig>,
        lifecycle: ProxyLifecycle,
        executor: Arc<FetchExecutor>,
    ) -> Self {
        Self {
            config,
            lifecycle,
            executor,
            refresh_lock: Mutex::new(()),
            completed: AtomicU64::new(0),
        }
    }

    /// Run one refresh. Callers arriving while a refresh is in flight wait
    /// for it and then return without validating anything themselves.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let seen = self.completed.load(Ordering::Acquire);
        let _guard = self.refresh_lock.lock().await;
        if self.completed.load(Ordering::Acquire) != seen {
            debug!("Joined a refresh that was already in flight");
            return Ok(RefreshReport::idle(RefreshKind::Coalesced));
        }

        let report = self.run().await?;
        self.completed.fetch_add(1, Ordering::AcqRel);
        info!(
            "Refresh {:?}: validated {}, promoted {}",
            report.kind, report.validated, report.promoted
        );
        Ok(report)
    }

    async fn run(&self) -> Result<RefreshReport> {
        let storage = self.lifecycle.storage();
        let working_table = ProxyState::Working.table();

        if !storage.table_exists(working_table).await? {
            warn!("No working proxy table yet, validating every known proxy");
            storage.create_table(working_table).await?;

            let mut candidates = self.lifecycle.addresses(ProxyState::Unchecked).await?;
            if candidates.is_empty() {
                candidates = self.lifecycle.addresses(ProxyState::NotWorking).await?;
            }
            if candidates.is_empty() {
                return Err(Error::FatalPoolMisconfiguration);
            }
            let (validated, promoted) = self.validate_all(candidates).await?;
            return Ok(RefreshReport {
                kind: RefreshKind::Initialized,
                validated,
                promoted,
            });
        }

        let working = self.lifecycle.count(ProxyState::Working).await?;
        if working >= self.config.high_water_mark {
            debug!("{} working proxies, pool is healthy", working);
            return Ok(RefreshReport::idle(RefreshKind::Healthy));
        }

        info!(
            "Only {} working proxies, checking some unchecked and not-working ones",
            working
        );
        let mut unchecked = self.lifecycle.addresses(ProxyState::Unchecked).await?;
        unchecked.truncate(self.config.unchecked_batch);
        let (mut validated, mut promoted) = self.validate_all(unchecked).await?;

        let sample = self.sample_not_working().await?;
        let (v, p) = self.validate_all(sample).await?;
        validated += v;
        promoted += p;

        Ok(RefreshReport {
            kind: RefreshKind::ToppedUp,
            validated,
            promoted,
        })
    }

    /// Draw not-working addresses uniformly with replacement, so the same
    /// address may be probed more than once.
    async fn sample_not_working(&self) -> Result<Vec<String>> {
        let storage = self.lifecycle.storage();
        let table = ProxyState::NotWorking.table();
        if !storage.table_exists(table).await? {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = storage
            .column_values(table, Column::Id)
            .await?
            .iter()
            .filter_map(Value::as_integer)
            .collect();
        let picks: Vec<i64> = {
            let mut rng = rand::rng();
            let k = self.config.not_working_sample.min(ids.len());
            (0..k).filter_map(|_| ids.choose(&mut rng).copied()).collect()
        };

        let mut sample = Vec::with_capacity(picks.len());
        for id in picks {
            // A concurrent transition may have moved the row since the id read.
            if let Some(row) = storage.row_by_id(table, id).await? {
                sample.push(row.address);
            }
        }
        Ok(sample)
    }

    async fn validate_all(&self, addresses: Vec<String>) -> Result<(usize, usize)> {
        let executor = &self.executor;
        let results: Vec<Result<bool>> = stream::iter(addresses)
            .map(|address| async move { executor.validate(&address).await })
            .buffer_unordered(self.config.probe_concurrency)
            .collect()
            .await;

        let mut validated = 0;
        let mut promoted = 0;
        for result in results {
            validated += 1;
            if result? {
                promoted += 1;
            }
        }
        Ok((validated, promoted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{addresses, scripted_pool, test_config, Behavior};

    #[tokio::test]
    async fn test_first_refresh_validates_every_unchecked_proxy() {
        let (pool, transport) = scripted_pool(test_config(), Behavior::Status(200));
        pool.ingest_seeds(&addresses("10.0.0", 5)).await.unwrap();

        let report = pool.refresh().await.unwrap();

        assert_eq!(report.kind, RefreshKind::Initialized);
        assert_eq!(report.validated, 5);
        assert_eq!(transport.calls_to("http://probe.test/"), 5);
        let stats = pool.stats().await.unwrap();
        assert_eq!(stats.working, 5);
        assert_eq!(stats.unchecked, 0);
    }

    #[tokio::test]
    async fn test_first_refresh_falls_back_to_not_working() {
        let (pool, _transport) = scripted_pool(test_config(), Behavior::Status(200));
        pool.ingest_seeds(&[]).await.unwrap();
        for address in addresses("10.0.1", 3) {
            pool.lifecycle().mark_not_working(&address).await.unwrap();
        }
        let report = pool.refresh().await.unwrap();
        assert_eq!(report.kind, RefreshKind::Initialized);
        assert_eq!(report.validated, 3);
        assert_eq!(pool.stats().await.unwrap().working, 3);
    }

    #[tokio::test]
    async fn test_first_refresh_without_any_proxy_is_fatal() {
        let (pool, _transport) = scripted_pool(test_config(), Behavior::Status(200));
        pool.ingest_seeds(&[]).await.unwrap();

        let err = pool.refresh().await.unwrap_err();
        assert!(matches!(err, Error::FatalPoolMisconfiguration));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_healthy_pool_is_left_alone() {
        let config = PoolConfig::builder()
            .probe_url("http://probe.test/")
            .high_water_mark(3)
            .build();
        let (pool, transport) = scripted_pool(config, Behavior::Status(200));
        pool.ingest_seeds(&addresses("10.0.2", 5)).await.unwrap();
        pool.refresh().await.unwrap();
        let probes = transport.calls().len();

        let report = pool.refresh().await.unwrap();
        assert_eq!(report.kind, RefreshKind::Healthy);
        assert_eq!(transport.calls().len(), probes);
    }

    #[tokio::test]
    async fn test_refresh_cost_is_bounded() {
        let (pool, transport) = scripted_pool(test_config(), Behavior::Fail);
        pool.ingest_seeds(&addresses("10.1.0", 150)).await.unwrap();
        pool.lifecycle()
            .storage()
            .create_table(ProxyState::Working.table())
            .await
            .unwrap();
        for address in addresses("10.2.0", 60) {
            pool.lifecycle().mark_not_working(&address).await.unwrap();
        }

        let report = pool.refresh().await.unwrap();

        assert_eq!(report.kind, RefreshKind::ToppedUp);
        assert_eq!(report.validated, 100 + 20);
        assert_eq!(transport.calls().len(), 120);
        // Oldest unchecked go first; the newest fifty are never probed.
        let newest = addresses("10.1.0", 150).split_off(100);
        assert!(transport.calls().iter().all(|c| !newest.contains(&c.proxy)));
        assert_eq!(pool.stats().await.unwrap().unchecked, 50);
    }

    #[tokio::test]
    async fn test_small_not_working_pool_is_sampled_up_to_its_size() {
        let (pool, transport) = scripted_pool(test_config(), Behavior::Fail);
        pool.ingest_seeds(&[]).await.unwrap();
        pool.lifecycle()
            .storage()
            .create_table(ProxyState::Working.table())
            .await
            .unwrap();
        for address in addresses("10.3.0", 4) {
            pool.lifecycle().mark_not_working(&address).await.unwrap();
        }

        let report = pool.refresh().await.unwrap();
        assert_eq!(report.validated, 4);
        assert!(transport
            .calls()
            .iter()
            .all(|c| c.proxy.starts_with("10.3.0.")));
    }

    #[tokio::test]
    async fn test_not_working_sample_draws_with_replacement_at_the_boundary() {
        let (pool, transport) = scripted_pool(test_config(), Behavior::Fail);
        pool.ingest_seeds(&[]).await.unwrap();
        pool.lifecycle()
            .storage()
            .create_table(ProxyState::Working.table())
            .await
            .unwrap();
        let not_working = addresses("10.3.1", 20);
        for address in &not_working {
            pool.lifecycle().mark_not_working(address).await.unwrap();
        }

        let report = pool.refresh().await.unwrap();

        // Twenty rows still get twenty draws, duplicates allowed.
        assert_eq!(report.validated, 20);
        let calls = transport.calls();
        assert_eq!(calls.len(), 20);
        assert!(calls.iter().all(|c| not_working.contains(&c.proxy)));

        pool.lifecycle().mark_not_working("10.3.1.99:8080").await.unwrap();
        let report = pool.refresh().await.unwrap();
        assert_eq!(report.validated, 20);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_coalesce() {
        let config = PoolConfig::builder()
            .probe_url("http://probe.test/")
            .request_timeout(std::time::Duration::from_millis(50))
            .build();
        let (pool, transport) = scripted_pool(config, Behavior::Hang);
        pool.ingest_seeds(&addresses("10.4.0", 3)).await.unwrap();

        let (a, b) = tokio::join!(pool.refresh(), pool.refresh());
        let kinds = [a.unwrap().kind, b.unwrap().kind];

        assert!(kinds.contains(&RefreshKind::Initialized));
        assert!(kinds.contains(&RefreshKind::Coalesced));
        assert_eq!(transport.calls().len(), 3);
    }
}
