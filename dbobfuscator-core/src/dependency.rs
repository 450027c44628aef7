//! Foreign-key insertion ordering.
//!
//! Tables are emitted in layers: first every table with no outstanding
//! references, then every table whose references were all emitted, and so on.
//! Names within a layer are sorted, so the order is deterministic.

use crate::Result;
use crate::adapters::DatabaseAdapter;
use crate::error::ObfuscatorError;
use std::collections::{BTreeMap, BTreeSet};

/// Table → tables it references. Self-references are removed on build.
pub type DependencyGraph = BTreeMap<String, BTreeSet<String>>;

/// Reads the foreign-key graph of `tables` from the source database.
///
/// # Errors
/// Propagates introspection failures.
pub async fn build_dependency_graph(
    adapter: &dyn DatabaseAdapter,
    tables: &[String],
) -> Result<DependencyGraph> {
    let mut graph = DependencyGraph::new();
    for table in tables {
        let referenced = adapter.referenced_tables(table).await?;
        graph.insert(
            table.clone(),
            referenced.into_iter().filter(|r| r != table).collect(),
        );
    }
    Ok(graph)
}

/// Orders tables so that every table comes after the tables it references.
///
/// A reference to a table outside the graph can never be satisfied and is
/// reported like a cycle.
///
/// # Errors
/// Returns [`ObfuscatorError::CyclicDependency`] naming every table that could
/// not be placed.
///
/// # Example
/// ```rust
/// use dbobfuscator_core::dependency::{DependencyGraph, resolve_insertion_order};
///
/// let mut graph = DependencyGraph::new();
/// graph.insert("orders".into(), ["users".to_string()].into());
/// graph.insert("users".into(), Default::default());
///
/// assert_eq!(resolve_insertion_order(graph).unwrap(), vec!["users", "orders"]);
/// ```
pub fn resolve_insertion_order(mut graph: DependencyGraph) -> Result<Vec<String>> {
    for (table, references) in &mut graph {
        references.remove(table);
    }

    let mut order = Vec::with_capacity(graph.len());
    while !graph.is_empty() {
        let ready: Vec<String> = graph
            .iter()
            .filter(|(_, references)| references.is_empty())
            .map(|(table, _)| table.clone())
            .collect();

        if ready.is_empty() {
            return Err(ObfuscatorError::CyclicDependency {
                tables: graph.into_keys().collect(),
            });
        }

        for table in &ready {
            graph.remove(table);
        }
        for references in graph.values_mut() {
            for table in &ready {
                references.remove(table);
            }
        }
        order.extend(ready);
    }

    Ok(order)
}
