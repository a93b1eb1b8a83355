//! Row storage backing the three proxy partitions.
//!
//! Every proxy table has the same two columns: an auto-incrementing `id`
//! and the `ip_address` string. Backends must apply a [`Mutation`] batch
//! atomically; the lifecycle manager relies on that to keep an address in
//! exactly one partition.

mod memory;
mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::error::{Error, Result, StorageError};

/// Column of a proxy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Id,
    Address,
}

impl Column {
    pub fn name(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Address => "ip_address",
        }
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

/// Comparison operator of a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

/// A typed `column <op> value` predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: Column,
    pub op: Comparison,
    pub value: Value,
}

impl Filter {
    /// A predicate `column op value`.
    pub fn new(column: Column, op: Comparison, value: impl Into<Value>) -> Self {
        Self {
            column,
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: Column, value: impl Into<Value>) -> Self {
        Self::new(column, Comparison::Eq, value)
    }

    /// Evaluate against one row with SQL semantics: a comparison involving
    /// NULL or mixed types never matches.
    pub fn matches(&self, row: &ProxyRow) -> bool {
        let cell = match self.column {
            Column::Id => Value::Integer(row.id),
            Column::Address => Value::Text(row.address.clone()),
        };
        let Some(ordering) = cell.compare(&self.value) else {
            return false;
        };
        match self.op {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Ne => ordering != Ordering::Equal,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Le => ordering != Ordering::Greater,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Ge => ordering != Ordering::Less,
        }
    }

    /// SQL fragment with a single `?` placeholder for the value.
    pub(crate) fn to_sql(&self) -> String {
        format!("{} {} ?", self.column.name(), self.op.sql())
    }
}

/// One stored proxy row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRow {
    pub id: i64,
    pub address: String,
}

/// A write applied as part of an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Append a row with an auto-assigned id. Creates the table if missing.
    Insert { table: String, address: String },
    /// Like `Insert`, unless the address is already in the table.
    InsertIfAbsent { table: String, address: String },
    /// Delete all matching rows. A missing table is left alone.
    Delete { table: String, filter: Filter },
}

/// Storage collaborator for proxy tables.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Create an empty proxy table if it does not exist.
    async fn create_table(&self, table: &str) -> Result<()>;

    /// Drop a table and all its rows. Missing tables are ignored.
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// Whether `table` exists.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Number of rows in `table`.
    async fn row_count(&self, table: &str) -> Result<usize>;

    /// Whether `table` has no rows.
    async fn is_empty(&self, table: &str) -> Result<bool> {
        Ok(self.row_count(table).await? == 0)
    }

    /// All values of `column`, in insertion (id) order.
    async fn column_values(&self, table: &str, column: Column) -> Result<Vec<Value>>;

    /// The row with id `id`, if it is still present.
    async fn row_by_id(&self, table: &str, id: i64) -> Result<Option<ProxyRow>>;

    /// Insert a trimmed address with an auto-assigned id, returning the id.
    async fn insert(&self, table: &str, address: &str) -> Result<i64>;

    /// Rows matching `filter` (all rows when `None`), in id order.
    async fn select(
        &self,
        table: &str,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> Result<Vec<ProxyRow>>;

    /// Delete rows matching `filter`, returning how many were removed.
    async fn delete_where(&self, table: &str, filter: &Filter) -> Result<u64>;

    /// Delete rows whose `column` equals `value`.
    async fn delete_row(&self, table: &str, column: Column, value: Value) -> Result<u64> {
        self.delete_where(table, &Filter::eq(column, value)).await
    }

    /// Whether any row's `column` equals `value`.
    async fn value_exists(&self, table: &str, column: Column, value: Value) -> Result<bool> {
        Ok(!self
            .select(table, Some(&Filter::eq(column, value)), Some(1))
            .await?
            .is_empty())
    }

    /// Apply every mutation or none of them.
    async fn apply(&self, mutations: Vec<Mutation>) -> Result<()>;
}

/// Reject anything that is not a plain SQL identifier.
pub(crate) fn validate_identifier(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::Storage(StorageError::InvalidIdentifier(table.to_string())))
    }
}
