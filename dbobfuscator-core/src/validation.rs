//! Obfuscation plan validation against the live schema.
//!
//! The live schema is first reduced to the same shape as a plan
//! ([`collect_schema_model`]), where `needs_obfuscation` means "may be
//! masked". A submitted plan is then compared against it structurally.
//!
//! # Example
//! ```rust
//! use dbobfuscator_core::models::{Column, ObfuscationPlan};
//! use dbobfuscator_core::validation::compare_plan;
//!
//! let mut live = ObfuscationPlan::new();
//! live.insert("users".into(), vec![
//!     Column::new("id", "int").primary_key(),
//!     Column::new("email", "varchar(255)").obfuscated(),
//! ]);
//!
//! let mut plan = live.clone();
//! plan.get_mut("users").unwrap()[0].needs_obfuscation = true;
//!
//! assert!(compare_plan(&plan, &live).is_err());
//! ```

use crate::Result;
use crate::adapters::DatabaseAdapter;
use crate::catalog::is_obfuscatable_type;
use crate::error::ObfuscatorError;
use crate::models::{Column, KeyRole, ObfuscationPlan, RawColumn};
use std::collections::HashMap;

#[cfg(test)]
mod tests;

/// Whether a live column may be masked.
///
/// Columns taking part in any key or index are never masked so primary,
/// unique and foreign-key constraints survive the copy.
pub fn can_obfuscate(column: &RawColumn) -> bool {
    !column.key.is_key() && is_obfuscatable_type(&column.sql_type)
}

/// Converts a table's raw columns into plan columns.
///
/// # Errors
/// Returns [`ObfuscatorError::TableStructure`] if the table has no primary key.
pub fn plan_columns(table: &str, raw_columns: &[RawColumn]) -> Result<Vec<Column>> {
    let columns: Vec<Column> = raw_columns
        .iter()
        .map(|raw| Column {
            name: raw.field.clone(),
            sql_type: raw.sql_type.clone(),
            needs_obfuscation: can_obfuscate(raw),
            is_primary_key: raw.key == KeyRole::Primary,
        })
        .collect();

    if !columns.iter().any(|c| c.is_primary_key) {
        return Err(ObfuscatorError::table_structure(table, "table has no primary key"));
    }
    Ok(columns)
}

/// Reads the live schema as a plan template.
///
/// # Errors
/// Propagates introspection failures and [`plan_columns`] errors.
pub async fn collect_schema_model(adapter: &dyn DatabaseAdapter) -> Result<ObfuscationPlan> {
    let tables = adapter.list_tables().await?;
    let mut model = ObfuscationPlan::new();

    for table in tables {
        let raw_columns = adapter.describe_table(&table).await?;
        let columns = plan_columns(&table, &raw_columns)?;
        tracing::debug!(
            table = %table,
            columns = columns.len(),
            maskable = columns.iter().filter(|c| c.needs_obfuscation).count(),
            "Collected table model"
        );
        model.insert(table, columns);
    }

    Ok(model)
}

/// Compares a submitted plan with the live schema model.
///
/// Tables are checked in name order and columns in plan order; the first
/// difference is reported.
///
/// # Errors
/// Returns [`ObfuscatorError::SchemaMismatch`] describing the first difference.
pub fn compare_plan(plan: &ObfuscationPlan, live: &ObfuscationPlan) -> Result<()> {
    if plan.len() != live.len() {
        return Err(ObfuscatorError::schema_mismatch(format!(
            "the plan has {} tables but the schema has {}",
            plan.len(),
            live.len()
        )));
    }

    for (table, planned_columns) in plan {
        let Some(live_columns) = live.get(table) else {
            return Err(ObfuscatorError::schema_mismatch(format!(
                "the schema has no table '{}'",
                table
            )));
        };

        if planned_columns.len() != live_columns.len() {
            return Err(ObfuscatorError::schema_mismatch(format!(
                "table '{}' has {} columns in the plan but {} in the schema",
                table,
                planned_columns.len(),
                live_columns.len()
            )));
        }

        let live_by_name: HashMap<&str, &Column> =
            live_columns.iter().map(|c| (c.name.as_str(), c)).collect();

        for planned in planned_columns {
            compare_column(table, planned, live_by_name.get(planned.name.as_str()).copied())?;
        }
    }

    Ok(())
}

fn compare_column(table: &str, planned: &Column, live: Option<&Column>) -> Result<()> {
    let Some(live) = live else {
        return Err(ObfuscatorError::schema_mismatch(format!(
            "table '{}' has no column '{}'",
            table, planned.name
        )));
    };

    if planned.sql_type != live.sql_type {
        return Err(ObfuscatorError::schema_mismatch(format!(
            "column '{}' of table '{}' is {} in the plan but {} in the schema",
            planned.name, table, planned.sql_type, live.sql_type
        )));
    }

    if planned.needs_obfuscation && !live.needs_obfuscation {
        return Err(ObfuscatorError::schema_mismatch(format!(
            "column '{}' of table '{}' ({}) cannot be obfuscated",
            live.name, table, live.sql_type
        )));
    }

    if planned.is_primary_key != live.is_primary_key {
        return Err(ObfuscatorError::schema_mismatch(format!(
            "primary key flag of column '{}' in table '{}' differs from the schema",
            live.name, table
        )));
    }

    Ok(())
}

/// Validates `plan` against the database behind `adapter`.
///
/// # Errors
/// Returns introspection errors, [`ObfuscatorError::TableStructure`] for live
/// tables without a primary key, or [`ObfuscatorError::SchemaMismatch`].
pub async fn validate_plan(plan: &ObfuscationPlan, adapter: &dyn DatabaseAdapter) -> Result<()> {
    let live = collect_schema_model(adapter).await?;
    compare_plan(plan, &live)?;
    tracing::debug!(tables = plan.len(), "Obfuscation plan matches the schema");
    Ok(())
}
