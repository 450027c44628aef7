//! Process-wide registry of obfuscation runs.
//!
//! Entries are created when a run is submitted, updated by the copy pipeline
//! once per finished table (or once on a fatal error), and kept until
//! [`ProgressTracker::clear_all`]. No operation blocks on I/O.

use crate::models::RunProgress;
use dashmap::DashMap;
use std::sync::Arc;

/// Cloneable handle to the shared run registry.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    runs: Arc<DashMap<String, RunProgress>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a run over `total_count` tables, replacing any entry with the
    /// same id.
    pub fn register(&self, run_id: &str, total_count: usize) {
        self.runs
            .insert(run_id.to_string(), RunProgress::new(run_id, total_count));
    }

    /// Snapshot of a run's progress.
    pub fn get(&self, run_id: &str) -> Option<RunProgress> {
        self.runs.get(run_id).map(|entry| entry.value().clone())
    }

    /// Counts one more finished table, never exceeding the total.
    ///
    /// Returns `false` if the run is unknown.
    pub fn advance(&self, run_id: &str) -> bool {
        match self.runs.get_mut(run_id) {
            Some(mut entry) => {
                if entry.finished_count < entry.total_count {
                    entry.finished_count = entry.finished_count.saturating_add(1);
                }
                true
            }
            None => false,
        }
    }

    /// Records the run's terminal error.
    ///
    /// Returns `false` if the run is unknown.
    pub fn record_error(&self, run_id: &str, message: impl Into<String>) -> bool {
        match self.runs.get_mut(run_id) {
            Some(mut entry) => {
                entry.last_error = Some(message.into());
                true
            }
            None => false,
        }
    }

    /// Forgets every run, running or not.
    ///
    /// A run still in flight keeps working; its later updates are dropped.
    pub fn clear_all(&self) {
        let cleared = self.runs.len();
        self.runs.clear();
        tracing::info!(cleared, "Cleared run progress");
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
