//! State transitions between the proxy partitions.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info};

use crate::error::Result;
use crate::proxy::{normalize_address, ProxyState};
use crate::storage::{Column, Filter, Mutation, Storage, Value};

/// The only component that writes proxy state.
///
/// Each transition inserts the address into its target partition and
/// removes it from the other two in a single storage batch, so no reader
/// can see it in two partitions or in none.
#[derive(Clone)]
pub struct ProxyLifecycle {
    storage: Arc<dyn Storage>,
}

impl ProxyLifecycle {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Move `address` into the working partition. Idempotent.
    pub async fn mark_working(&self, address: &str) -> Result<()> {
        self.transition(address, ProxyState::Working).await
    }

    pub async fn mark_not_working(&self, address: &str) -> Result<()> {
        self.transition(address, ProxyState::NotWorking).await
    }

    /// Put `address` back into the unchecked partition.
    pub async fn reset(&self, address: &str) -> Result<()> {
        self.transition(address, ProxyState::Unchecked).await
    }

    async fn transition(&self, address: &str, target: ProxyState) -> Result<()> {
        let address = normalize_address(address);
        let mut batch = vec![Mutation::InsertIfAbsent {
            table: target.table().to_string(),
            address: address.to_string(),
        }];
        for other in target.others() {
            batch.push(Mutation::Delete {
                table: other.table().to_string(),
                filter: Filter::eq(Column::Address, address),
            });
        }
        self.storage.apply(batch).await?;
        debug!("Proxy {} -> {}", address, target);
        Ok(())
    }

    /// Number of addresses in a partition; an uncreated partition is empty.
    pub async fn count(&self, state: ProxyState) -> Result<usize> {
        if !self.storage.table_exists(state.table()).await? {
            return Ok(0);
        }
        self.storage.row_count(state.table()).await
    }

    /// Addresses of a partition in insertion order.
    pub async fn addresses(&self, state: ProxyState) -> Result<Vec<String>> {
        if !self.storage.table_exists(state.table()).await? {
            return Ok(Vec::new());
        }
        let values = self
            .storage
            .column_values(state.table(), Column::Address)
            .await?;
        Ok(values
            .into_iter()
            .filter_map(|v| match v {
                Value::Text(address) => Some(address),
                _ => None,
            })
            .collect())
    }

    /// The partition currently holding `address`, if any.
    pub async fn state_of(&self, address: &str) -> Result<Option<ProxyState>> {
        let address = normalize_address(address);
        for state in ProxyState::ALL {
            if !self.storage.table_exists(state.table()).await? {
                continue;
            }
            if self
                .storage
                .value_exists(state.table(), Column::Address, Value::from(address))
                .await?
            {
                return Ok(Some(state));
            }
        }
        Ok(None)
    }

    /// Replace the unchecked partition with `addresses`.
    ///
    /// Addresses already classified as working or not working keep their
    /// state. Returns how many were inserted.
    pub async fn ingest(&self, addresses: &[String]) -> Result<usize> {
        let unchecked = ProxyState::Unchecked.table();
        if self.storage.table_exists(unchecked).await? {
            self.storage.drop_table(unchecked).await?;
        }
        self.storage.create_table(unchecked).await?;
        if !self
            .storage
            .table_exists(ProxyState::NotWorking.table())
            .await?
        {
            self.storage
                .create_table(ProxyState::NotWorking.table())
                .await?;
        }

        let mut classified = self.addresses(ProxyState::Working).await?;
        classified.extend(self.addresses(ProxyState::NotWorking).await?);

        let mut seen = HashSet::new();
        let batch: Vec<Mutation> = addresses
            .iter()
            .map(|a| normalize_address(a))
            .filter(|a| !a.is_empty() && !classified.iter().any(|c| c.as_str() == *a))
            .filter(|a| seen.insert(*a))
            .map(|a| Mutation::InsertIfAbsent {
                table: unchecked.to_string(),
                address: a.to_string(),
            })
            .collect();
        let inserted = batch.len();
        self.storage.apply(batch).await?;
        info!("Ingested {} unchecked proxies", inserted);
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn lifecycle() -> ProxyLifecycle {
        ProxyLifecycle::new(Arc::new(MemoryStorage::new()))
    }

    async fn partitions_holding(lc: &ProxyLifecycle, address: &str) -> usize {
        let mut n = 0;
        for state in ProxyState::ALL {
            if lc.addresses(state).await.unwrap().iter().any(|a| a == address) {
                n += 1;
            }
        }
        n
    }

    #[tokio::test]
    async fn test_address_is_in_exactly_one_partition_after_any_sequence() {
        let lc = lifecycle();
        lc.ingest(&["1.1.1.1:80".to_string()]).await.unwrap();
        let addr = "1.1.1.1:80";

        lc.mark_working(addr).await.unwrap();
        assert_eq!(partitions_holding(&lc, addr).await, 1);
        lc.mark_not_working(addr).await.unwrap();
        assert_eq!(partitions_holding(&lc, addr).await, 1);
        lc.reset(addr).await.unwrap();
        assert_eq!(partitions_holding(&lc, addr).await, 1);
        lc.mark_not_working(addr).await.unwrap();
        lc.mark_working(addr).await.unwrap();
        assert_eq!(partitions_holding(&lc, addr).await, 1);
        assert_eq!(lc.state_of(addr).await.unwrap(), Some(ProxyState::Working));
    }

    #[tokio::test]
    async fn test_mark_working_is_idempotent() {
        let lc = lifecycle();
        lc.ingest(&["2.2.2.2:80".to_string()]).await.unwrap();

        lc.mark_working("2.2.2.2:80").await.unwrap();
        let once: Vec<_> = futures::future::try_join_all(
            ProxyState::ALL.iter().map(|s| lc.addresses(*s)),
        )
        .await
        .unwrap();

        lc.mark_working("2.2.2.2:80").await.unwrap();
        let twice: Vec<_> = futures::future::try_join_all(
            ProxyState::ALL.iter().map(|s| lc.addresses(*s)),
        )
        .await
        .unwrap();

        assert_eq!(once, twice);
        assert_eq!(lc.count(ProxyState::Working).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transition_normalizes_address() {
        let lc = lifecycle();
        lc.mark_not_working(" 3.3.3.3:80\n").await.unwrap();
        assert_eq!(
            lc.state_of("3.3.3.3:80").await.unwrap(),
            Some(ProxyState::NotWorking)
        );
    }

    #[tokio::test]
    async fn test_count_of_uncreated_partition_is_zero() {
        let lc = lifecycle();
        assert_eq!(lc.count(ProxyState::Working).await.unwrap(), 0);
        assert!(lc.addresses(ProxyState::Working).await.unwrap().is_empty());
        assert_eq!(lc.state_of("9.9.9.9:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ingest_dedupes_and_keeps_classified_addresses() {
        let lc = lifecycle();
        lc.ingest(&["a:1".into(), "b:2".into()]).await.unwrap();
        lc.mark_working("a:1").await.unwrap();

        let inserted = lc
            .ingest(&["a:1".into(), "c:3".into(), "c:3".into(), " ".into()])
            .await
            .unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(lc.addresses(ProxyState::Unchecked).await.unwrap(), vec!["c:3"]);
        assert_eq!(lc.state_of("a:1").await.unwrap(), Some(ProxyState::Working));
        assert!(lc
            .storage()
            .table_exists(ProxyState::NotWorking.table())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_transitions_never_duplicate() {
        let lc = lifecycle();
        lc.ingest(&["4.4.4.4:80".to_string()]).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..32 {
            let lc = lc.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    lc.mark_working("4.4.4.4:80").await
                } else {
                    lc.mark_not_working("4.4.4.4:80").await
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(partitions_holding(&lc, "4.4.4.4:80").await, 1);
    }
}
