//! Core library for dbobfuscator.
//!
//! This crate copies a MySQL schema from one server to another while
//! irreversibly masking selected columns, so production data can be shared
//! with non-production environments.
//!
//! # Data Handling Guarantees
//! - Source tables are only read, under a table read lock
//! - Masked text is replaced by a truncated MD5 hash; masked numbers by bounded noise
//! - Key and index columns are never masked
//! - Credentials are zeroized on drop and never logged
//!
//! # Architecture
//! - `catalog` and `obfuscation` decide how one value is masked
//! - `dependency` and `validation` check a plan against the live schema
//! - `copy` drives a run table by table; `progress` tracks it
//! - `service` ties these together for the CLI and HTTP surface
//! - `adapters` hide the database behind object-safe traits

pub mod adapters;
pub mod catalog;
pub mod config;
pub mod copy;
pub mod dependency;
pub mod error;
pub mod logging;
pub mod models;
pub mod obfuscation;
pub mod progress;
pub mod service;
pub mod validation;

// Re-export commonly used types
pub use adapters::{Connector, DatabaseAdapter, LockedTable, RowBatch};
pub use config::{AppConfig, ConnectionInfo, DbConfig, ObfuscatorConfig};
pub use copy::{CopyOrchestrator, RunEndpoints, RunState, TableMask};
pub use error::{ObfuscatorError, Result};
pub use models::{CellValue, Column, ObfuscationPlan, RunProgress, RunStatus};
pub use obfuscation::ValueObfuscator;
pub use progress::ProgressTracker;
pub use service::{ObfuscationService, RunHandle, RunRequest};
