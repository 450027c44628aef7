//! Copy orchestration: the obfuscate-and-copy pipeline for one run.
//!
//! A run moves through `Initializing → Ordering → CopyingTable* → Completed`,
//! or stops in `Failed` on the first fatal error. Tables are copied strictly
//! in foreign-key order, one at a time, each under a source read lock held on
//! a dedicated connection.

use crate::Result;
use crate::adapters::{Connector, DatabaseAdapter, LockedTable, RowBatch};
use crate::catalog::SqlType;
use crate::config::{ConnectionInfo, ObfuscatorConfig};
use crate::dependency::{build_dependency_graph, resolve_insertion_order};
use crate::error::ObfuscatorError;
use crate::models::{CellValue, Column, ObfuscationPlan, Row};
use crate::obfuscation::ValueObfuscator;
use crate::progress::ProgressTracker;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fmt;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Initializing,
    Ordering,
    CopyingTable { table: String, position: usize, total: usize },
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Ordering => write!(f, "ordering"),
            Self::CopyingTable {
                table,
                position,
                total,
            } => write!(f, "copying table '{}' ({}/{})", table, position, total),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Where a run reads from and writes to.
#[derive(Debug, Clone)]
pub struct RunEndpoints {
    pub origin: ConnectionInfo,
    pub destination: ConnectionInfo,
}

/// Masking decisions for one table's planned columns.
///
/// Built once per table; every batch of the table reuses it.
#[derive(Debug)]
pub struct TableMask<'a> {
    table: &'a str,
    columns: Vec<ColumnMask<'a>>,
}

#[derive(Debug)]
struct ColumnMask<'a> {
    column: &'a Column,
    /// Parsed type when the column is masked and its type is understood
    sql_type: Option<SqlType>,
}

impl<'a> TableMask<'a> {
    /// Parses the declared type of every masked column in `columns`.
    ///
    /// A masked column whose type is not understood is logged here, once, and
    /// its values are copied unchanged.
    pub fn resolve(table: &'a str, columns: &'a [Column]) -> Self {
        let columns = columns
            .iter()
            .map(|column| {
                let sql_type = if column.needs_obfuscation {
                    match SqlType::parse(&column.sql_type) {
                        Ok(sql_type) if sql_type.is_obfuscatable() => Some(sql_type),
                        Ok(_) => None,
                        Err(error) => {
                            tracing::warn!(
                                table,
                                column = %column.name,
                                error = %error,
                                "Column type not understood, copying values unchanged"
                            );
                            None
                        }
                    }
                } else {
                    None
                };
                ColumnMask { column, sql_type }
            })
            .collect();

        Self { table, columns }
    }

    /// Names of the planned columns, in insert order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.column.name.clone()).collect()
    }

    fn source_indices(&self, batch_columns: &[String]) -> Result<Vec<usize>> {
        self.columns
            .iter()
            .map(|mask| {
                batch_columns
                    .iter()
                    .position(|name| *name == mask.column.name)
                    .ok_or_else(|| {
                        ObfuscatorError::table_structure(
                            self.table,
                            format!("column '{}' is missing from the source rows", mask.column.name),
                        )
                    })
            })
            .collect()
    }
}

/// Drives runs against a pair of databases.
#[derive(Debug, Clone)]
pub struct CopyOrchestrator {
    obfuscator: ValueObfuscator,
    slice_size: usize,
    progress: ProgressTracker,
    seed: Option<u64>,
}

impl CopyOrchestrator {
    /// Creates an orchestrator reporting into `progress`.
    ///
    /// # Errors
    /// Returns a configuration error for a zero slice size or an out-of-range
    /// dispersion percent.
    pub fn new(config: &ObfuscatorConfig, progress: ProgressTracker) -> Result<Self> {
        if config.slice_size == 0 {
            return Err(ObfuscatorError::configuration(
                "obfuscator.sliceSize must be greater than zero",
            ));
        }

        Ok(Self {
            obfuscator: ValueObfuscator::from_config(config)?,
            slice_size: config.slice_size,
            progress,
            seed: None,
        })
    }

    /// Builder method to make masking reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn slice_size(&self) -> usize {
        self.slice_size
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Runs a registered run to completion.
    ///
    /// Fatal errors are recorded on the run's progress entry and returned.
    ///
    /// # Errors
    /// Returns the first fatal error, or [`ObfuscatorError::Cancelled`].
    pub async fn run(
        &self,
        run_id: &str,
        plan: &ObfuscationPlan,
        endpoints: &RunEndpoints,
        connector: &dyn Connector,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let started = Instant::now();
        let result = self
            .connect_and_copy(run_id, plan, endpoints, connector, cancel)
            .await;

        match &result {
            Ok(()) => {
                log_state(run_id, &RunState::Completed);
                tracing::info!(
                    "Run {} copied {} tables in {:.2}s",
                    run_id,
                    plan.len(),
                    started.elapsed().as_secs_f64()
                );
            }
            Err(error) => {
                log_state(run_id, &RunState::Failed);
                tracing::error!(run_id, error = %error, "Run failed");
                self.progress.record_error(run_id, error.to_string());
            }
        }

        result
    }

    async fn connect_and_copy(
        &self,
        run_id: &str,
        plan: &ObfuscationPlan,
        endpoints: &RunEndpoints,
        connector: &dyn Connector,
        cancel: &CancellationToken,
    ) -> Result<()> {
        log_state(run_id, &RunState::Initializing);
        let origin = connector.connect(&endpoints.origin).await?;
        let destination = match connector.connect(&endpoints.destination).await {
            Ok(destination) => destination,
            Err(error) => {
                origin.close().await;
                return Err(error);
            }
        };

        let result = self
            .copy_schema(run_id, plan, origin.as_ref(), destination.as_ref(), cancel)
            .await;

        origin.close().await;
        destination.close().await;
        result
    }

    /// Copies every table of `plan` from `origin` to `destination`.
    ///
    /// # Errors
    /// Returns the first fatal error; later tables are not attempted.
    pub async fn copy_schema(
        &self,
        run_id: &str,
        plan: &ObfuscationPlan,
        origin: &dyn DatabaseAdapter,
        destination: &dyn DatabaseAdapter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        log_state(run_id, &RunState::Ordering);
        let tables = origin.list_tables().await?;
        let graph = build_dependency_graph(origin, &tables).await?;
        let order = resolve_insertion_order(graph)?;
        tracing::debug!(run_id, order = ?order, "Resolved insertion order");

        let mut rng = self.rng();
        let total = order.len();

        for (index, table) in order.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ObfuscatorError::Cancelled);
            }

            let Some(columns) = plan.get(table) else {
                return Err(ObfuscatorError::schema_mismatch(format!(
                    "the plan has no table '{}'",
                    table
                )));
            };

            log_state(
                run_id,
                &RunState::CopyingTable {
                    table: table.clone(),
                    position: index.saturating_add(1),
                    total,
                },
            );
            let copied = self
                .copy_table(table, columns, origin, destination, cancel, &mut rng)
                .await?;
            tracing::info!(run_id, table = %table, rows = copied, "Table copied");

            self.progress.advance(run_id);
        }

        Ok(())
    }

    /// Copies one table: structure, then rows page by page under a read lock.
    ///
    /// Returns the number of rows written.
    ///
    /// # Errors
    /// Returns lock, read, write or DDL errors, or [`ObfuscatorError::Cancelled`].
    pub async fn copy_table(
        &self,
        table: &str,
        columns: &[Column],
        origin: &dyn DatabaseAdapter,
        destination: &dyn DatabaseAdapter,
        cancel: &CancellationToken,
        rng: &mut StdRng,
    ) -> Result<u64> {
        let ddl = origin.show_create_table(table).await?;
        destination.create_table(&ddl).await?;

        let order_by: Vec<String> = columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect();
        if order_by.is_empty() {
            return Err(ObfuscatorError::table_structure(
                table,
                "table has no primary key",
            ));
        }

        let mut locked = origin.lock_table(table).await?;
        let copied = self
            .copy_rows(
                table,
                columns,
                &order_by,
                locked.as_mut(),
                destination,
                cancel,
                rng,
            )
            .await;
        let released = locked.release().await;

        let copied = copied?;
        released?;
        Ok(copied)
    }

    #[allow(clippy::too_many_arguments)]
    async fn copy_rows(
        &self,
        table: &str,
        columns: &[Column],
        order_by: &[String],
        locked: &mut dyn LockedTable,
        destination: &dyn DatabaseAdapter,
        cancel: &CancellationToken,
        rng: &mut StdRng,
    ) -> Result<u64> {
        let mask = TableMask::resolve(table, columns);
        let column_names = mask.column_names();
        let mut offset = 0_usize;
        let mut copied = 0_u64;

        loop {
            if cancel.is_cancelled() {
                return Err(ObfuscatorError::Cancelled);
            }

            let batch = locked.read_batch(order_by, self.slice_size, offset).await?;
            if batch.is_empty() {
                break;
            }

            let rows = self.mask_batch(&mask, &batch, rng)?;
            destination.insert_rows(table, &column_names, &rows).await?;

            tracing::trace!(table, offset, rows = rows.len(), "Batch written");
            copied = copied.saturating_add(u64::try_from(rows.len()).unwrap_or(u64::MAX));
            offset = offset.saturating_add(self.slice_size);
        }

        Ok(copied)
    }

    /// Rebuilds a batch in plan-column order with masked columns replaced.
    ///
    /// A cell that cannot be masked keeps its original value.
    ///
    /// # Errors
    /// Returns [`ObfuscatorError::TableStructure`] if the batch lacks a
    /// planned column.
    pub fn mask_batch(
        &self,
        mask: &TableMask<'_>,
        batch: &RowBatch,
        rng: &mut StdRng,
    ) -> Result<Vec<Row>> {
        let indices = mask.source_indices(&batch.columns)?;

        let rows = batch
            .rows
            .iter()
            .map(|row| {
                mask.columns
                    .iter()
                    .zip(&indices)
                    .map(|(column_mask, &index)| {
                        let raw = row.get(index).unwrap_or(&CellValue::Null);
                        self.mask_cell(mask.table, column_mask, raw, rng)
                    })
                    .collect()
            })
            .collect();

        Ok(rows)
    }

    fn mask_cell(
        &self,
        table: &str,
        column_mask: &ColumnMask<'_>,
        raw: &CellValue,
        rng: &mut StdRng,
    ) -> CellValue {
        let Some(sql_type) = column_mask.sql_type.as_ref() else {
            return raw.clone();
        };

        match self
            .obfuscator
            .obfuscate_parsed(raw, sql_type, &column_mask.column.sql_type, rng)
        {
            Ok(masked) => masked,
            Err(error) => {
                tracing::warn!(
                    table,
                    column = %column_mask.column.name,
                    error = %error,
                    "Could not obfuscate value, copying it unchanged"
                );
                raw.clone()
            }
        }
    }
}

fn log_state(run_id: &str, state: &RunState) {
    tracing::debug!(run_id, state = %state, "Run state changed");
}
