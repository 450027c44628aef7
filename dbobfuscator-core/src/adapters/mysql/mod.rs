//! MySQL database adapter with connection pooling.
//!
//! # Module Structure
//! - `connection`: Connection pool creation and URL validation
//! - `schema_collection`: Table, column, DDL and foreign-key introspection
//! - `rows`: Locked paginated reads, cell decoding and multi-row inserts
//!
//! Data reads run over the text protocol so every column type (including
//! `DECIMAL`, `DATETIME` and `JSON`) round-trips without a typed decoder.

pub mod connection;
pub mod rows;
pub mod schema_collection;


use super::{Connector, DatabaseAdapter, LockedTable};
use crate::Result;
use crate::config::ConnectionInfo;
use crate::models::{RawColumn, Row};
use async_trait::async_trait;
use sqlx::MySqlPool;
use std::sync::Arc;

pub use connection::validate_mysql_connection_string;

/// MySQL database adapter with connection pooling
pub struct MySqlAdapter {
    /// Connection pool for database operations
    pub pool: MySqlPool,
    /// Maximum open connections configured for the pool
    pub max_connections: u32,
    /// Connection URL with the password masked
    redacted_url: String,
}

impl std::fmt::Debug for MySqlAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlAdapter")
            .field("url", &self.redacted_url)
            .field("max_connections", &self.max_connections)
            .field("pool_size", &self.pool.size())
            .field("pool_idle", &self.pool.num_idle())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DatabaseAdapter for MySqlAdapter {
    async fn test_connection(&self) -> Result<()> {
        let connectivity_result: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                crate::error::ObfuscatorError::connection_failed(
                    format!("Cannot reach {}", self.redacted_url),
                    e,
                )
            })?;

        if connectivity_result != 1 {
            return Err(crate::error::ObfuscatorError::configuration(
                "Basic connectivity test failed: unexpected result",
            ));
        }

        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        schema_collection::list_tables(&self.pool).await
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<RawColumn>> {
        schema_collection::describe_table(&self.pool, table).await
    }

    async fn show_create_table(&self, table: &str) -> Result<String> {
        schema_collection::show_create_table(&self.pool, table).await
    }

    async fn referenced_tables(&self, table: &str) -> Result<Vec<String>> {
        schema_collection::referenced_tables(&self.pool, table).await
    }

    async fn lock_table(&self, table: &str) -> Result<Box<dyn LockedTable>> {
        let locked = rows::MySqlLockedTable::acquire(&self.pool, table).await?;
        Ok(Box::new(locked))
    }

    async fn create_table(&self, ddl: &str) -> Result<()> {
        sqlx::raw_sql(ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| crate::error::ObfuscatorError::batch_io("Failed to create table", e))?;
        Ok(())
    }

    async fn insert_rows(&self, table: &str, columns: &[String], rows: &[Row]) -> Result<()> {
        rows::insert_rows(&self.pool, table, columns, rows).await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Opens [`MySqlAdapter`]s with a fixed pool size.
#[derive(Debug, Clone, Copy)]
pub struct MySqlConnector {
    max_connections: u32,
}

impl MySqlConnector {
    pub fn new(max_connections: u32) -> Self {
        Self { max_connections }
    }

    pub fn from_config(config: &crate::config::DbConfig) -> Self {
        Self::new(config.max_open_connections)
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self, info: &ConnectionInfo) -> Result<Arc<dyn DatabaseAdapter>> {
        let adapter = MySqlAdapter::connect(info, self.max_connections).await?;
        Ok(Arc::new(adapter))
    }
}
