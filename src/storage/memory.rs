//! In-process storage backend.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{validate_identifier, Column, Filter, Mutation, ProxyRow, Storage, Value};
use crate::error::{Error, Result, StorageError};

#[derive(Debug, Default, Clone)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, String>,
}

impl Table {
    fn insert(&mut self, address: &str) -> i64 {
        self.next_id += 1;
        self.rows.insert(self.next_id, address.trim().to_string());
        self.next_id
    }

    fn contains(&self, address: &str) -> bool {
        let address = address.trim();
        self.rows.values().any(|a| a == address)
    }

    fn matching<'a>(&'a self, filter: Option<&'a Filter>) -> impl Iterator<Item = ProxyRow> + 'a {
        self.rows
            .iter()
            .map(|(id, address)| ProxyRow {
                id: *id,
                address: address.clone(),
            })
            .filter(move |row| filter.map_or(true, |f| f.matches(row)))
    }

    fn delete(&mut self, filter: &Filter) -> u64 {
        let before = self.rows.len();
        self.rows.retain(|id, address| {
            !filter.matches(&ProxyRow {
                id: *id,
                address: address.clone(),
            })
        });
        (before - self.rows.len()) as u64
    }
}

/// Storage kept entirely in memory. Every call takes one lock, so a
/// mutation batch is never partially observable.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(table: &str) -> Error {
    Error::Storage(StorageError::TableNotFound(table.to_string()))
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create_table(&self, table: &str) -> Result<()> {
        validate_identifier(table)?;
        self.tables.write().entry(table.to_string()).or_default();
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        validate_identifier(table)?;
        self.tables.write().remove(table);
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.tables.read().contains_key(table))
    }

    async fn row_count(&self, table: &str) -> Result<usize> {
        let tables = self.tables.read();
        let t = tables.get(table).ok_or_else(|| not_found(table))?;
        Ok(t.rows.len())
    }

    async fn column_values(&self, table: &str, column: Column) -> Result<Vec<Value>> {
        let tables = self.tables.read();
        let t = tables.get(table).ok_or_else(|| not_found(table))?;
        Ok(t.rows
            .iter()
            .map(|(id, address)| match column {
                Column::Id => Value::Integer(*id),
                Column::Address => Value::Text(address.clone()),
            })
            .collect())
    }

    async fn row_by_id(&self, table: &str, id: i64) -> Result<Option<ProxyRow>> {
        let tables = self.tables.read();
        let t = tables.get(table).ok_or_else(|| not_found(table))?;
        Ok(t.rows.get(&id).map(|address| ProxyRow {
            id,
            address: address.clone(),
        }))
    }

    async fn insert(&self, table: &str, address: &str) -> Result<i64> {
        let mut tables = self.tables.write();
        let t = tables.get_mut(table).ok_or_else(|| not_found(table))?;
        Ok(t.insert(address))
    }

    async fn select(
        &self,
        table: &str,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> Result<Vec<ProxyRow>> {
        let tables = self.tables.read();
        let t = tables.get(table).ok_or_else(|| not_found(table))?;
        Ok(t.matching(filter).take(limit.unwrap_or(usize::MAX)).collect())
    }

    async fn delete_where(&self, table: &str, filter: &Filter) -> Result<u64> {
        let mut tables = self.tables.write();
        let t = tables.get_mut(table).ok_or_else(|| not_found(table))?;
        Ok(t.delete(filter))
    }

    async fn apply(&self, mutations: Vec<Mutation>) -> Result<()> {
        for mutation in &mutations {
            let (Mutation::Insert { table, .. }
            | Mutation::InsertIfAbsent { table, .. }
            | Mutation::Delete { table, .. }) = mutation;
            validate_identifier(table)?;
        }

        let mut tables = self.tables.write();
        for mutation in mutations {
            match mutation {
                Mutation::Insert { table, address } => {
                    tables.entry(table).or_default().insert(&address);
                }
                Mutation::InsertIfAbsent { table, address } => {
                    let t = tables.entry(table).or_default();
                    if !t.contains(&address) {
                        t.insert(&address);
                    }
                }
                Mutation::Delete { table, filter } => {
                    if let Some(t) = tables.get_mut(&table) {
                        t.delete(&filter);
                    }
                }
            }
        }
        Ok(())
    }
}
