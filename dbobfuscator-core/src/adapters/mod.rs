//! Database adapter traits for introspection and copying.
//!
//! The copy pipeline only talks to databases through these traits, so a run
//! can be driven against MySQL or against the in-memory store used in tests.
//!
//! # Module Structure
//! - `mysql`: `sqlx`-backed MySQL adapter and connector
//! - `memory`: in-process store implementing the same traits (`test-util`
//!   feature)

use crate::Result;
use crate::config::ConnectionInfo;
use crate::models::{RawColumn, Row};
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod mysql;

#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryConnector, MemoryDatabase};
pub use mysql::{MySqlAdapter, MySqlConnector};

/// One page of rows read from a locked table.
///
/// `columns` gives the order of cells within every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RowBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Main trait for database adapters with object-safe design.
///
/// # Object Safety
/// This trait is object-safe, allowing for dynamic dispatch through
/// `Arc<dyn DatabaseAdapter>`.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Tests the connection without touching any table.
    ///
    /// # Errors
    /// Returns a connection error if the database is unreachable.
    async fn test_connection(&self) -> Result<()>;

    /// Lists base tables of the connected schema, sorted by name.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Describes a table's columns in declaration order.
    async fn describe_table(&self, table: &str) -> Result<Vec<RawColumn>>;

    /// Returns the statement that recreates `table` on another server.
    async fn show_create_table(&self, table: &str) -> Result<String>;

    /// Tables that `table` references through foreign keys within the same
    /// schema. May include `table` itself.
    async fn referenced_tables(&self, table: &str) -> Result<Vec<String>>;

    /// Takes a read lock on `table` for the lifetime of the returned handle.
    ///
    /// # Errors
    /// Returns a batch I/O error if the lock cannot be acquired.
    async fn lock_table(&self, table: &str) -> Result<Box<dyn LockedTable>>;

    /// Executes a create-table statement produced by
    /// [`DatabaseAdapter::show_create_table`].
    async fn create_table(&self, ddl: &str) -> Result<()>;

    /// Inserts all `rows` into `table` with a single statement.
    ///
    /// Every row must have one cell per entry in `columns`. An empty `rows`
    /// slice is a no-op.
    async fn insert_rows(&self, table: &str, columns: &[String], rows: &[Row]) -> Result<()>;

    /// Releases pooled resources. Further calls may fail.
    async fn close(&self) {}
}

/// A table held under a read lock.
///
/// [`LockedTable::release`] must be called on every exit path; dropping the
/// handle without releasing leaves cleanup to the implementation.
#[async_trait]
pub trait LockedTable: Send {
    /// Reads rows ordered by `order_by`, skipping `offset` and returning at
    /// most `limit`.
    async fn read_batch(&mut self, order_by: &[String], limit: usize, offset: usize) -> Result<RowBatch>;

    /// Releases the lock.
    async fn release(self: Box<Self>) -> Result<()>;
}

/// Opens adapters from connection info.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a pooled adapter for `info`.
    ///
    /// # Errors
    /// Returns [`crate::error::ObfuscatorError::Connection`] if the database
    /// cannot be reached.
    async fn connect(&self, info: &ConnectionInfo) -> Result<Arc<dyn DatabaseAdapter>>;
}

/// Quotes an identifier with backticks, doubling embedded backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
