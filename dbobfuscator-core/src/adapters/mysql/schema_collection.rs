//! MySQL schema introspection.
//!
//! All queries are scoped to the connection's default schema (`DATABASE()`).

use crate::Result;
use crate::adapters::quote_identifier;
use crate::error::ObfuscatorError;
use crate::models::{KeyRole, RawColumn};
use sqlx::{MySqlPool, Row};

/// Lists base tables of the current schema, sorted by name
pub(crate) async fn list_tables(pool: &MySqlPool) -> Result<Vec<String>> {
    // Cast to CHAR to avoid VARBINARY type issues in MySQL 8.0+
    let tables_query = r#"
        SELECT CAST(TABLE_NAME AS CHAR) as TABLE_NAME
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = DATABASE()
        AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
    "#;

    let rows = sqlx::query(tables_query)
        .fetch_all(pool)
        .await
        .map_err(|e| ObfuscatorError::batch_io("Failed to enumerate tables", e))?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in &rows {
        let name: String = row
            .try_get("TABLE_NAME")
            .map_err(|e| ObfuscatorError::batch_io("Failed to parse table name", e))?;
        tables.push(name);
    }

    tracing::debug!("Enumerated {} tables", tables.len());
    Ok(tables)
}

/// Describes a table the way `SHOW COLUMNS` does
pub(crate) async fn describe_table(pool: &MySqlPool, table: &str) -> Result<Vec<RawColumn>> {
    let columns_query = r#"
        SELECT
            CAST(COLUMN_NAME AS CHAR) as COLUMN_NAME,
            CAST(COLUMN_TYPE AS CHAR) as COLUMN_TYPE,
            CAST(IS_NULLABLE AS CHAR) as IS_NULLABLE,
            CAST(COLUMN_KEY AS CHAR) as COLUMN_KEY,
            CAST(COLUMN_DEFAULT AS CHAR) as COLUMN_DEFAULT,
            CAST(EXTRA AS CHAR) as EXTRA
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = DATABASE()
        AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
    "#;

    let rows = sqlx::query(columns_query)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            ObfuscatorError::batch_io(format!("Failed to collect columns for table '{}'", table), e)
        })?;

    if rows.is_empty() {
        return Err(ObfuscatorError::table_structure(table, "table not found"));
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let field: String = row
            .try_get("COLUMN_NAME")
            .map_err(|e| ObfuscatorError::batch_io("Failed to parse column name", e))?;
        let sql_type: String = row.try_get("COLUMN_TYPE").unwrap_or_default();
        let is_nullable: String = row.try_get("IS_NULLABLE").unwrap_or_default();
        let column_key: String = row.try_get("COLUMN_KEY").unwrap_or_default();
        let default: Option<String> = row.try_get("COLUMN_DEFAULT").ok().flatten();
        let extra: Option<String> = row
            .try_get::<Option<String>, _>("EXTRA")
            .ok()
            .flatten()
            .filter(|e| !e.is_empty());

        columns.push(RawColumn {
            field,
            sql_type,
            nullable: is_nullable.eq_ignore_ascii_case("YES"),
            key: KeyRole::from_show_columns(&column_key),
            default,
            extra,
        });
    }

    Ok(columns)
}

/// Returns the `CREATE TABLE` statement reported by the server
pub(crate) async fn show_create_table(pool: &MySqlPool, table: &str) -> Result<String> {
    let query = format!("SHOW CREATE TABLE {}", quote_identifier(table));
    let row = sqlx::raw_sql(&query).fetch_one(pool).await.map_err(|e| {
        ObfuscatorError::batch_io(format!("Failed to read DDL of table '{}'", table), e)
    })?;

    // Columns are (Table, Create Table)
    let ddl: Vec<u8> = row.try_get_unchecked(1).map_err(|e| {
        ObfuscatorError::batch_io(format!("Failed to decode DDL of table '{}'", table), e)
    })?;
    String::from_utf8(ddl).map_err(|e| {
        ObfuscatorError::batch_io(format!("DDL of table '{}' is not valid UTF-8", table), e)
    })
}

/// Lists tables referenced by foreign keys of `table` within the same schema
pub(crate) async fn referenced_tables(pool: &MySqlPool, table: &str) -> Result<Vec<String>> {
    let fk_query = r#"
        SELECT DISTINCT CAST(REFERENCED_TABLE_NAME AS CHAR) as REFERENCED_TABLE_NAME
        FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = DATABASE()
        AND TABLE_NAME = ?
        AND REFERENCED_TABLE_SCHEMA = DATABASE()
        AND REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY REFERENCED_TABLE_NAME
    "#;

    let rows = sqlx::query(fk_query)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            ObfuscatorError::batch_io(
                format!("Failed to collect foreign keys for table '{}'", table),
                e,
            )
        })?;

    let mut referenced = Vec::with_capacity(rows.len());
    for row in &rows {
        let name: String = row
            .try_get("REFERENCED_TABLE_NAME")
            .map_err(|e| ObfuscatorError::batch_io("Failed to parse referenced table name", e))?;
        referenced.push(name);
    }
    Ok(referenced)
}
