//! SQLite storage backend.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use log::debug;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use super::{validate_identifier, Column, Filter, Mutation, ProxyRow, Storage, Value};
use crate::error::{Error, Result, StorageError};

macro_rules! bind_value {
    ($query:expr, $value:expr) => {
        match $value {
            Value::Integer(i) => $query.bind(*i),
            Value::Text(s) => $query.bind(s.clone()),
            Value::Null => $query.bind(None::<String>),
        }
    };
}

const TABLE_EXISTS_SQL: &str =
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?";

fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY AUTOINCREMENT, ip_address TEXT NOT NULL)",
        table
    )
}

/// Storage persisted in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Connect with a `sqlite:` URL, creating the database file if needed.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        Self::with_options(options).await
    }

    /// Open (or create) a database file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::with_options(options).await
    }

    /// A private in-memory database.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    async fn with_options(options: SqliteConnectOptions) -> Result<Self> {
        // A single long-lived connection: in-memory databases exist per
        // connection, and SQLite serializes writers anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_exists(&self, table: &str) -> Result<()> {
        validate_identifier(table)?;
        if self.table_exists(table).await? {
            Ok(())
        } else {
            Err(Error::Storage(StorageError::TableNotFound(table.to_string())))
        }
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_table(&self, table: &str) -> Result<()> {
        validate_identifier(table)?;
        sqlx::query(&create_table_sql(table))
            .execute(&self.pool)
            .await?;
        debug!("Created table {}", table);
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        validate_identifier(table)?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(&self.pool)
            .await?;
        debug!("Dropped table {}", table);
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(TABLE_EXISTS_SQL)
            .bind(table)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn row_count(&self, table: &str) -> Result<usize> {
        self.ensure_exists(table).await?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }

    async fn column_values(&self, table: &str, column: Column) -> Result<Vec<Value>> {
        self.ensure_exists(table).await?;
        let sql = format!("SELECT {} FROM {} ORDER BY id", column.name(), table);
        let values = match column {
            Column::Id => sqlx::query_scalar::<_, i64>(&sql)
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(Value::Integer)
                .collect(),
            Column::Address => sqlx::query_scalar::<_, String>(&sql)
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(Value::Text)
                .collect(),
        };
        Ok(values)
    }

    async fn row_by_id(&self, table: &str, id: i64) -> Result<Option<ProxyRow>> {
        self.ensure_exists(table).await?;
        let row = sqlx::query_as::<_, (i64, String)>(&format!(
            "SELECT id, ip_address FROM {} WHERE id = ?",
            table
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, address)| ProxyRow { id, address }))
    }

    async fn insert(&self, table: &str, address: &str) -> Result<i64> {
        self.ensure_exists(table).await?;
        let result = sqlx::query(&format!(
            "INSERT INTO {} (id, ip_address) VALUES (NULL, ?)",
            table
        ))
        .bind(address.trim())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn select(
        &self,
        table: &str,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> Result<Vec<ProxyRow>> {
        self.ensure_exists(table).await?;
        let mut sql = format!("SELECT id, ip_address FROM {}", table);
        if let Some(filter) = filter {
            sql.push_str(" WHERE ");
            sql.push_str(&filter.to_sql());
        }
        sql.push_str(" ORDER BY id");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let query = sqlx::query_as::<_, (i64, String)>(&sql);
        let query = match filter {
            Some(filter) => bind_value!(query, &filter.value),
            None => query,
        };
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(id, address)| ProxyRow { id, address })
            .collect())
    }

    async fn delete_where(&self, table: &str, filter: &Filter) -> Result<u64> {
        self.ensure_exists(table).await?;
        let sql = format!("DELETE FROM {} WHERE {}", table, filter.to_sql());
        let query = sqlx::query(&sql);
        let result = bind_value!(query, &filter.value)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn apply(&self, mutations: Vec<Mutation>) -> Result<()> {
        for mutation in &mutations {
            let (Mutation::Insert { table, .. }
            | Mutation::InsertIfAbsent { table, .. }
            | Mutation::Delete { table, .. }) = mutation;
            validate_identifier(table)?;
        }

        let mut tx = self.pool.begin().await?;
        for mutation in &mutations {
            match mutation {
                Mutation::Insert { table, address } => {
                    sqlx::query(&create_table_sql(table))
                        .execute(&mut *tx)
                        .await?;
                    sqlx::query(&format!(
                        "INSERT INTO {} (id, ip_address) VALUES (NULL, ?)",
                        table
                    ))
                    .bind(address.trim())
                    .execute(&mut *tx)
                    .await?;
                }
                Mutation::InsertIfAbsent { table, address } => {
                    sqlx::query(&create_table_sql(table))
                        .execute(&mut *tx)
                        .await?;
                    sqlx::query(&format!(
                        "INSERT INTO {t} (id, ip_address) SELECT NULL, ? \
                         WHERE NOT EXISTS (SELECT 1 FROM {t} WHERE ip_address = ?)",
                        t = table
                    ))
                    .bind(address.trim())
                    .bind(address.trim())
                    .execute(&mut *tx)
                    .await?;
                }
                Mutation::Delete { table, filter } => {
                    let exists: i64 = sqlx::query_scalar(TABLE_EXISTS_SQL)
                        .bind(table.as_str())
                        .fetch_one(&mut *tx)
                        .await?;
                    if exists == 0 {
                        continue;
                    }
                    let sql = format!("DELETE FROM {} WHERE {}", table, filter.to_sql());
                    let query = sqlx::query(&sql);
                    bind_value!(query, &filter.value)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }
}
