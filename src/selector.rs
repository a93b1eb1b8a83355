//! Picks a working proxy for each outbound request.

use std::sync::Arc;

use log::info;
use rand::seq::IndexedRandom;

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::lifecycle::ProxyLifecycle;
use crate::proxy::ProxyState;
use crate::scheduler::HealthScheduler;

pub struct ProxySelector {
    config: Arc<PoolConfig>,
    lifecycle: ProxyLifecycle,
    scheduler: Arc<HealthScheduler>,
}

impl ProxySelector {
    pub fn new(
        config: Arc<PoolConfig>,
        lifecycle: ProxyLifecycle,
        scheduler: Arc<HealthScheduler>,
    ) -> Self {
        Self {
            config,
            lifecycle,
            scheduler,
        }
    }

    /// Return a working proxy chosen uniformly at random.
    ///
    /// Refreshes the pool first when it is below the low-water mark, and
    /// fails with [`Error::PoolExhausted`] if it is still empty afterwards.
    pub async fn select_proxy(&self) -> Result<String> {
        if self.lifecycle.count(ProxyState::Working).await? < self.config.low_water_mark {
            self.scheduler.refresh().await?;
        }

        let available = self.lifecycle.addresses(ProxyState::Working).await?;
        let chosen = {
            let mut rng = rand::rng();
            available.choose(&mut rng).cloned()
        };
        let chosen = chosen.ok_or(Error::PoolExhausted)?;
        info!("Remaining proxies: {}", available.len());
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::RefreshKind;
    use crate::testing::{addresses, scripted_pool, test_config, Behavior};

    #[tokio::test]
    async fn test_thin_pool_triggers_refresh_before_selecting() {
        let (pool, transport) = scripted_pool(test_config(), Behavior::Status(200));
        pool.ingest_seeds(&addresses("10.5.0", 5)).await.unwrap();

        let proxy = pool.select_proxy().await.unwrap();

        assert_eq!(transport.calls().len(), 5);
        assert!(addresses("10.5.0", 5).contains(&proxy));
        assert_eq!(
            pool.lifecycle().state_of(&proxy).await.unwrap(),
            Some(ProxyState::Working)
        );
    }

    #[tokio::test]
    async fn test_pool_above_low_water_mark_selects_without_refresh() {
        let (pool, transport) = scripted_pool(test_config(), Behavior::Status(200));
        pool.ingest_seeds(&addresses("10.6.0", 30)).await.unwrap();
        let working = addresses("10.7.0", 20);
        for address in &working {
            pool.lifecycle().mark_working(address).await.unwrap();
        }

        for _ in 0..10 {
            let proxy = pool.select_proxy().await.unwrap();
            assert!(working.contains(&proxy));
        }
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_pool_after_refresh_is_exhausted() {
        let (pool, _transport) = scripted_pool(test_config(), Behavior::Fail);
        pool.ingest_seeds(&addresses("10.8.0", 3)).await.unwrap();

        let err = pool.select_proxy().await.unwrap_err();
        assert!(matches!(err, Error::PoolExhausted));
        assert_eq!(pool.stats().await.unwrap().not_working, 3);
    }

    #[tokio::test]
    async fn test_selection_only_returns_working_addresses() {
        let (pool, transport) = scripted_pool(test_config(), Behavior::Fail);
        let seeds = addresses("10.9.0", 6);
        transport.set(&seeds[1], Behavior::Status(200));
        transport.set(&seeds[4], Behavior::Status(301));
        pool.ingest_seeds(&seeds).await.unwrap();

        for _ in 0..10 {
            let proxy = pool.select_proxy().await.unwrap();
            let working = pool.lifecycle().addresses(ProxyState::Working).await.unwrap();
            assert!(working.contains(&proxy));
            assert!(proxy == seeds[1] || proxy == seeds[4]);
        }
        // First call initialized the pool; later thin-pool refreshes topped it up.
        assert_eq!(pool.refresh().await.unwrap().kind, RefreshKind::ToppedUp);
    }
}
