//! In-process database implementing the adapter traits.
//!
//! Tables live in a [`DashMap`]; a table's "DDL" is its JSON definition, so
//! [`DatabaseAdapter::show_create_table`] output can be replayed on another
//! `MemoryDatabase` with [`DatabaseAdapter::create_table`]. Every structural
//! operation is appended to a journal that tests inspect for ordering.

use super::{Connector, DatabaseAdapter, LockedTable, RowBatch};
use crate::Result;
use crate::config::ConnectionInfo;
use crate::error::ObfuscatorError;
use crate::models::{CellValue, KeyRole, RawColumn, Row};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, PoisonError};

/// Failure raised by the in-memory store.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MemoryStoreError(String);

/// Serialized table definition used as the store's DDL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryTableDef {
    pub name: String,
    pub columns: Vec<RawColumn>,
    /// Tables referenced through foreign keys
    #[serde(default)]
    pub references: Vec<String>,
}

/// Structural operations recorded by a [`MemoryDatabase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryEvent {
    Created(String),
    Locked(String),
    Unlocked(String),
    Inserted { table: String, rows: usize },
}

#[derive(Debug)]
struct MemoryTable {
    def: MemoryTableDef,
    rows: Vec<Row>,
    locks: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: DashMap<String, MemoryTable>,
    failing_inserts: DashSet<String>,
    journal: Mutex<Vec<MemoryEvent>>,
}

impl MemoryState {
    fn record(&self, event: MemoryEvent) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// A cloneable handle to one in-memory schema.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<MemoryState>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table. Replaces any existing table of the same name.
    pub fn add_table(&self, name: &str, columns: Vec<RawColumn>, references: &[&str]) {
        let def = MemoryTableDef {
            name: name.to_string(),
            columns,
            references: references.iter().map(|r| (*r).to_string()).collect(),
        };
        self.state.tables.insert(
            name.to_string(),
            MemoryTable {
                def,
                rows: Vec::new(),
                locks: 0,
            },
        );
    }

    /// Appends a row given in declaration order.
    ///
    /// # Errors
    /// Returns a table structure error for an unknown table or a row of the
    /// wrong width.
    pub fn push_row(&self, table: &str, row: Row) -> Result<()> {
        let mut entry = self
            .state
            .tables
            .get_mut(table)
            .ok_or_else(|| ObfuscatorError::table_structure(table, "table not found"))?;
        if row.len() != entry.def.columns.len() {
            return Err(ObfuscatorError::table_structure(
                table,
                format!("expected {} cells, got {}", entry.def.columns.len(), row.len()),
            ));
        }
        entry.rows.push(row);
        Ok(())
    }

    /// Rows of `table` in storage order, or `None` if it does not exist.
    pub fn rows(&self, table: &str) -> Option<Vec<Row>> {
        self.state.tables.get(table).map(|t| t.rows.clone())
    }

    /// Values of one column of `table` in storage order.
    pub fn column_values(&self, table: &str, column: &str) -> Option<Vec<CellValue>> {
        let entry = self.state.tables.get(table)?;
        let index = entry.def.columns.iter().position(|c| c.field == column)?;
        Some(entry.rows.iter().map(|r| r[index].clone()).collect())
    }

    /// Sorted table names.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.tables.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of read locks currently held on `table`.
    pub fn lock_count(&self, table: &str) -> usize {
        self.state.tables.get(table).map_or(0, |t| t.locks)
    }

    /// Makes every subsequent insert into `table` fail.
    pub fn fail_inserts_into(&self, table: &str) {
        self.state.failing_inserts.insert(table.to_string());
    }

    /// Structural operations so far, oldest first.
    pub fn journal(&self) -> Vec<MemoryEvent> {
        self.state
            .journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn missing(table: &str) -> ObfuscatorError {
        ObfuscatorError::batch_io(
            format!("Failed to access table '{}'", table),
            MemoryStoreError(format!("Table '{}' doesn't exist", table)),
        )
    }
}

#[async_trait]
impl DatabaseAdapter for MemoryDatabase {
    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.table_names())
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<RawColumn>> {
        self.state
            .tables
            .get(table)
            .map(|t| t.def.columns.clone())
            .ok_or_else(|| ObfuscatorError::table_structure(table, "table not found"))
    }

    async fn show_create_table(&self, table: &str) -> Result<String> {
        let entry = self.state.tables.get(table).ok_or_else(|| Self::missing(table))?;
        serde_json::to_string(&entry.def).map_err(|e| {
            ObfuscatorError::batch_io(format!("Failed to read DDL of table '{}'", table), e)
        })
    }

    async fn referenced_tables(&self, table: &str) -> Result<Vec<String>> {
        self.state
            .tables
            .get(table)
            .map(|t| t.def.references.clone())
            .ok_or_else(|| Self::missing(table))
    }

    async fn lock_table(&self, table: &str) -> Result<Box<dyn LockedTable>> {
        {
            let mut entry = self
                .state
                .tables
                .get_mut(table)
                .ok_or_else(|| Self::missing(table))?;
            entry.locks = entry.locks.saturating_add(1);
        }
        self.state.record(MemoryEvent::Locked(table.to_string()));

        Ok(Box::new(MemoryLockedTable {
            state: Arc::clone(&self.state),
            table: table.to_string(),
            held: true,
        }))
    }

    async fn create_table(&self, ddl: &str) -> Result<()> {
        let def: MemoryTableDef = serde_json::from_str(ddl)
            .map_err(|e| ObfuscatorError::batch_io("Failed to create table", e))?;
        let name = def.name.clone();

        match self.state.tables.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(ObfuscatorError::batch_io(
                    "Failed to create table",
                    MemoryStoreError(format!("Table '{}' already exists", name)),
                ));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(MemoryTable {
                    def,
                    rows: Vec::new(),
                    locks: 0,
                });
            }
        }

        self.state.record(MemoryEvent::Created(name));
        Ok(())
    }

    async fn insert_rows(&self, table: &str, columns: &[String], rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        if self.state.failing_inserts.contains(table) {
            return Err(ObfuscatorError::batch_io(
                format!("Failed to insert rows into table '{}'", table),
                MemoryStoreError("injected insert failure".to_string()),
            ));
        }

        {
            let mut entry = self
                .state
                .tables
                .get_mut(table)
                .ok_or_else(|| Self::missing(table))?;

            let positions = columns
                .iter()
                .map(|name| {
                    entry
                        .def
                        .columns
                        .iter()
                        .position(|c| &c.field == name)
                        .ok_or_else(|| {
                            ObfuscatorError::batch_io(
                                format!("Failed to insert rows into table '{}'", table),
                                MemoryStoreError(format!("Unknown column '{}'", name)),
                            )
                        })
                })
                .collect::<Result<Vec<usize>>>()?;

            let width = entry.def.columns.len();
            for row in rows {
                if row.len() != positions.len() {
                    return Err(ObfuscatorError::batch_io(
                        format!("Failed to insert rows into table '{}'", table),
                        MemoryStoreError("column count doesn't match value count".to_string()),
                    ));
                }
                let mut stored = vec![CellValue::Null; width];
                for (cell, &position) in row.iter().zip(&positions) {
                    stored[position] = cell.clone();
                }
                entry.rows.push(stored);
            }
        }

        self.state.record(MemoryEvent::Inserted {
            table: table.to_string(),
            rows: rows.len(),
        });
        Ok(())
    }
}

struct MemoryLockedTable {
    state: Arc<MemoryState>,
    table: String,
    held: bool,
}

impl MemoryLockedTable {
    fn unlock(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        if let Some(mut entry) = self.state.tables.get_mut(&self.table) {
            entry.locks = entry.locks.saturating_sub(1);
        }
        self.state.record(MemoryEvent::Unlocked(self.table.clone()));
    }
}

#[async_trait]
impl LockedTable for MemoryLockedTable {
    async fn read_batch(&mut self, order_by: &[String], limit: usize, offset: usize) -> Result<RowBatch> {
        let entry = self
            .state
            .tables
            .get(&self.table)
            .ok_or_else(|| MemoryDatabase::missing(&self.table))?;

        let keys: Vec<usize> = order_by
            .iter()
            .filter_map(|name| entry.def.columns.iter().position(|c| &c.field == name))
            .collect();

        let mut rows = entry.rows.clone();
        rows.sort_by(|a, b| {
            keys.iter()
                .map(|&k| compare_cells(&a[k], &b[k]))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });

        Ok(RowBatch {
            columns: entry.def.columns.iter().map(|c| c.field.clone()).collect(),
            rows: rows.into_iter().skip(offset).take(limit).collect(),
        })
    }

    async fn release(mut self: Box<Self>) -> Result<()> {
        self.unlock();
        Ok(())
    }
}

impl Drop for MemoryLockedTable {
    fn drop(&mut self) {
        self.unlock();
    }
}

/// Orders cells the way a database sorts a key column: `NULL` first, then
/// numerically where both sides are numeric, else by bytes.
fn compare_cells(a: &CellValue, b: &CellValue) -> Ordering {
    match (a, b) {
        (CellValue::Null, CellValue::Null) => Ordering::Equal,
        (CellValue::Null, _) => Ordering::Less,
        (_, CellValue::Null) => Ordering::Greater,
        (CellValue::Int(x), CellValue::Int(y)) => x.cmp(y),
        (CellValue::UInt(x), CellValue::UInt(y)) => x.cmp(y),
        _ => match (numeric(a), numeric(b)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => a.canonical_bytes().cmp(&b.canonical_bytes()),
        },
    }
}

#[allow(clippy::cast_precision_loss)]
fn numeric(cell: &CellValue) -> Option<f64> {
    match cell {
        CellValue::Int(v) => Some(*v as f64),
        CellValue::UInt(v) => Some(*v as f64),
        CellValue::Float(v) => Some(*v),
        _ => None,
    }
}

/// Resolves connection info to registered in-memory databases by schema name.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    databases: Arc<DashMap<String, MemoryDatabase>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `database` reachable under `schema`.
    pub fn register(&self, schema: &str, database: MemoryDatabase) {
        self.databases.insert(schema.to_string(), database);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, info: &ConnectionInfo) -> Result<Arc<dyn DatabaseAdapter>> {
        let database = self
            .databases
            .get(&info.schema)
            .map(|db| db.value().clone())
            .ok_or_else(|| {
                ObfuscatorError::connection_failed(
                    format!("Cannot reach {}", info),
                    MemoryStoreError(format!("Unknown database '{}'", info.schema)),
                )
            })?;
        Ok(Arc::new(database))
    }
}

/// Builds a primary-key column for test fixtures.
pub fn primary_key_column(name: &str, sql_type: &str) -> RawColumn {
    RawColumn::new(name, sql_type).with_key(KeyRole::Primary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.add_table(
            "people",
            vec![primary_key_column("id", "int"), RawColumn::new("name", "varchar(20)")],
            &[],
        );
        for (id, name) in [(3_i64, "carol"), (1, "alice"), (2, "bob")] {
            db.push_row("people", vec![id.into(), name.into()]).unwrap();
        }
        db
    }

    #[tokio::test]
    async fn test_read_batch_orders_and_pages() {
        let db = people();
        let mut locked = db.lock_table("people").await.unwrap();
        assert_eq!(db.lock_count("people"), 1);

        let first = locked.read_batch(&["id".to_string()], 2, 0).await.unwrap();
        assert_eq!(first.columns, vec!["id", "name"]);
        assert_eq!(
            first.rows,
            vec![
                vec![CellValue::Int(1), CellValue::from("alice")],
                vec![CellValue::Int(2), CellValue::from("bob")]
            ]
        );

        let second = locked.read_batch(&["id".to_string()], 2, 2).await.unwrap();
        assert_eq!(second.rows, vec![vec![CellValue::Int(3), CellValue::from("carol")]]);

        let empty = locked.read_batch(&["id".to_string()], 2, 4).await.unwrap();
        assert!(empty.is_empty());

        locked.release().await.unwrap();
        assert_eq!(db.lock_count("people"), 0);
    }

    #[tokio::test]
    async fn test_dropped_lock_is_released() {
        let db = people();
        let locked = db.lock_table("people").await.unwrap();
        drop(locked);
        assert_eq!(db.lock_count("people"), 0);
        assert_eq!(
            db.journal(),
            vec![
                MemoryEvent::Locked("people".to_string()),
                MemoryEvent::Unlocked("people".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_ddl_replays_on_another_database() {
        let source = people();
        let destination = MemoryDatabase::new();

        let ddl = source.show_create_table("people").await.unwrap();
        destination.create_table(&ddl).await.unwrap();

        assert_eq!(
            destination.describe_table("people").await.unwrap(),
            source.describe_table("people").await.unwrap()
        );
        assert_eq!(destination.rows("people"), Some(Vec::new()));
        assert!(destination.create_table(&ddl).await.is_err());
    }

    #[tokio::test]
    async fn test_insert_maps_columns_by_name() {
        let db = people();
        db.insert_rows(
            "people",
            &["name".to_string(), "id".to_string()],
            &[vec![CellValue::from("dave"), CellValue::Int(4)]],
        )
        .await
        .unwrap();

        assert_eq!(
            db.rows("people").unwrap().last(),
            Some(&vec![CellValue::Int(4), CellValue::from("dave")])
        );

        let unknown = db
            .insert_rows("people", &["nope".to_string()], &[vec![CellValue::Int(1)]])
            .await;
        assert!(matches!(unknown, Err(ObfuscatorError::BatchIo { .. })));
    }

    #[tokio::test]
    async fn test_injected_insert_failure() {
        let db = people();
        db.fail_inserts_into("people");
        let result = db
            .insert_rows("people", &["id".to_string()], &[vec![CellValue::Int(9)]])
            .await;
        assert!(matches!(result, Err(ObfuscatorError::BatchIo { .. })));
    }

    #[tokio::test]
    async fn test_connector_resolves_by_schema() {
        let connector = MemoryConnector::new();
        connector.register("shop", people());

        let adapter = connector
            .connect(&ConnectionInfo::new("u", "p", "mem", "shop"))
            .await
            .unwrap();
        assert_eq!(adapter.list_tables().await.unwrap(), vec!["people"]);

        let missing = connector
            .connect(&ConnectionInfo::new("u", "p", "mem", "other"))
            .await;
        assert!(matches!(missing, Err(ObfuscatorError::Connection { .. })));
    }

    #[test]
    fn test_compare_cells() {
        assert_eq!(compare_cells(&CellValue::Null, &CellValue::Int(0)), Ordering::Less);
        assert_eq!(compare_cells(&CellValue::Int(2), &CellValue::Int(10)), Ordering::Less);
        assert_eq!(compare_cells(&CellValue::Int(2), &CellValue::Float(1.5)), Ordering::Greater);
        assert_eq!(
            compare_cells(&CellValue::from("b"), &CellValue::from("a")),
            Ordering::Greater
        );
    }
}
