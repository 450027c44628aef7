//! Locked paginated reads and multi-row inserts.

use crate::Result;
use crate::adapters::{LockedTable, RowBatch, quote_identifier};
use crate::error::ObfuscatorError;
use crate::models::{CellValue, Row};
use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlConnection, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::{Column, Connection, Executor, MySqlPool, QueryBuilder, Row as _, TypeInfo};

/// MySQL rejects statements with more placeholders than this
const MAX_BIND_PARAMETERS: usize = 65_535;

/// A `LOCK TABLES ... READ` held on one dedicated session.
///
/// Table locks belong to the session that took them, so every read goes
/// through the same pooled connection. If the handle is dropped without
/// [`LockedTable::release`], the connection is detached from the pool and
/// closed, which drops the lock with it.
pub struct MySqlLockedTable {
    conn: Option<PoolConnection<MySql>>,
    table: String,
}

impl std::fmt::Debug for MySqlLockedTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlLockedTable")
            .field("table", &self.table)
            .field("held", &self.conn.is_some())
            .finish()
    }
}

impl MySqlLockedTable {
    pub(crate) async fn acquire(pool: &MySqlPool, table: &str) -> Result<Self> {
        let mut conn = pool.acquire().await.map_err(|e| {
            ObfuscatorError::batch_io(format!("Failed to acquire a connection to lock '{}'", table), e)
        })?;

        let statement = format!("LOCK TABLES {} READ", quote_identifier(table));
        let session: &mut MySqlConnection = &mut conn;
        session
            .execute(sqlx::raw_sql(&statement))
            .await
            .map_err(|e| ObfuscatorError::batch_io(format!("Failed to lock table '{}'", table), e))?;

        tracing::debug!(table, "Acquired read lock");
        Ok(Self {
            conn: Some(conn),
            table: table.to_string(),
        })
    }

    fn connection(&mut self) -> Result<&mut PoolConnection<MySql>> {
        let table = &self.table;
        self.conn.as_mut().ok_or_else(|| {
            ObfuscatorError::table_structure(table.clone(), "read lock already released")
        })
    }
}

#[async_trait]
impl LockedTable for MySqlLockedTable {
    async fn read_batch(&mut self, order_by: &[String], limit: usize, offset: usize) -> Result<RowBatch> {
        let query = select_page_sql(&self.table, order_by, limit, offset);
        let table = self.table.clone();
        let conn = self.connection()?;

        let session: &mut MySqlConnection = conn;
        let rows = session
            .fetch_all(sqlx::raw_sql(&query))
            .await
            .map_err(|e| {
                ObfuscatorError::batch_io(format!("Failed to read rows from table '{}'", table), e)
            })?;

        decode_rows(&rows)
    }

    async fn release(mut self: Box<Self>) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let session: &mut MySqlConnection = &mut conn;
        match session.execute(sqlx::raw_sql("UNLOCK TABLES")).await {
            Ok(_) => {
                tracing::debug!(table = %self.table, "Released read lock");
                Ok(())
            }
            Err(e) => {
                // Closing the session drops any table lock it still holds
                let _ = conn.detach().close().await;
                Err(ObfuscatorError::batch_io(
                    format!("Failed to unlock table '{}'", self.table),
                    e,
                ))
            }
        }
    }
}

impl Drop for MySqlLockedTable {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(table = %self.table, "Read lock dropped without release, closing its session");
            drop(conn.detach());
        }
    }
}

/// Builds the paginated `SELECT` for one batch.
pub fn select_page_sql(table: &str, order_by: &[String], limit: usize, offset: usize) -> String {
    let mut query = format!("SELECT * FROM {}", quote_identifier(table));
    if !order_by.is_empty() {
        let columns: Vec<String> = order_by.iter().map(|c| quote_identifier(c)).collect();
        query.push_str(" ORDER BY ");
        query.push_str(&columns.join(", "));
    }
    query.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
    query
}

fn decode_rows(rows: &[MySqlRow]) -> Result<RowBatch> {
    let Some(first) = rows.first() else {
        return Ok(RowBatch::default());
    };

    let columns: Vec<String> = first.columns().iter().map(|c| c.name().to_string()).collect();
    let type_names: Vec<String> = first
        .columns()
        .iter()
        .map(|c| c.type_info().name().to_string())
        .collect();

    let mut decoded = Vec::with_capacity(rows.len());
    for row in rows {
        let mut cells = Vec::with_capacity(type_names.len());
        for (index, type_name) in type_names.iter().enumerate() {
            // Text protocol: every non-null value arrives as its textual bytes
            let raw: Option<Vec<u8>> = row.try_get_unchecked(index).map_err(|e| {
                ObfuscatorError::batch_io(format!("Failed to decode column '{}'", columns[index]), e)
            })?;
            cells.push(raw.map_or(CellValue::Null, |bytes| classify_cell(type_name, bytes)));
        }
        decoded.push(cells);
    }

    Ok(RowBatch {
        columns,
        rows: decoded,
    })
}

/// Narrows a text-protocol value to a [`CellValue`] using the column's
/// reported type name.
pub fn classify_cell(type_name: &str, bytes: Vec<u8>) -> CellValue {
    let type_name = type_name.to_ascii_uppercase();

    if is_binary_type(&type_name) {
        return CellValue::Bytes(bytes);
    }

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => return CellValue::Bytes(e.into_bytes()),
    };

    if type_name.ends_with("INT UNSIGNED") {
        if let Ok(value) = text.parse::<u64>() {
            return CellValue::UInt(value);
        }
    } else if type_name.ends_with("INT") || type_name == "BOOLEAN" {
        if let Ok(value) = text.parse::<i64>() {
            return CellValue::Int(value);
        }
    } else if matches!(type_name.as_str(), "FLOAT" | "DOUBLE")
        && let Ok(value) = text.parse::<f64>()
    {
        return CellValue::Float(value);
    }

    CellValue::Text(text)
}

fn is_binary_type(type_name: &str) -> bool {
    matches!(
        type_name,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" | "GEOMETRY"
    )
}

/// Inserts rows with one multi-row `INSERT` per chunk.
///
/// A chunk is the whole slice unless it would exceed MySQL's placeholder limit.
pub(crate) async fn insert_rows(pool: &MySqlPool, table: &str, columns: &[String], rows: &[Row]) -> Result<()> {
    if rows.is_empty() || columns.is_empty() {
        return Ok(());
    }

    let rows_per_statement = (MAX_BIND_PARAMETERS / columns.len()).max(1);
    let column_list: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();

    for chunk in rows.chunks(rows_per_statement) {
        let mut builder: QueryBuilder<'_, MySql> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            quote_identifier(table),
            column_list.join(", ")
        ));

        builder.push_values(chunk, |mut values, row| {
            for cell in row {
                match cell {
                    CellValue::Null => values.push_bind(Option::<String>::None),
                    CellValue::Text(v) => values.push_bind(v.clone()),
                    CellValue::Bytes(v) => values.push_bind(v.clone()),
                    CellValue::Int(v) => values.push_bind(*v),
                    CellValue::UInt(v) => values.push_bind(*v),
                    CellValue::Float(v) => values.push_bind(*v),
                    CellValue::Bool(v) => values.push_bind(*v),
                };
            }
        });

        builder.build().execute(pool).await.map_err(|e| {
            ObfuscatorError::batch_io(format!("Failed to insert rows into table '{}'", table), e)
        })?;
    }

    tracing::trace!(table, rows = rows.len(), "Inserted batch");
    Ok(())
}
