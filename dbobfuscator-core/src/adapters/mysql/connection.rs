//! MySQL connection pool management and validation.
//!
//! # Security Features
//! - Validates connection string format and parameters
//! - Enforces connection limits to prevent resource exhaustion
//! - Never includes the password in errors or logs

use super::MySqlAdapter;
use crate::Result;
use crate::config::{ConnectionInfo, MAX_OPEN_CONNECTIONS_LIMIT};
use crate::error::{ObfuscatorError, redact_database_url};
use crate::adapters::DatabaseAdapter;
use sqlx::MySqlPool;
use std::time::Duration;
use url::Url;

/// How long to wait for a pooled connection before failing
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

impl MySqlAdapter {
    /// Opens a pool for `info` and verifies the server is reachable.
    ///
    /// # Errors
    /// Returns a configuration error for invalid connection info and a
    /// connection error if the server cannot be reached.
    pub async fn connect(info: &ConnectionInfo, max_connections: u32) -> Result<Self> {
        let url = info.to_url()?;
        let adapter = Self::from_url(&url, max_connections)?;
        adapter.test_connection().await?;

        tracing::debug!(
            url = %adapter.redacted_url,
            max_connections = adapter.max_connections,
            "Opened MySQL connection pool"
        );
        Ok(adapter)
    }

    /// Creates a lazily connecting adapter from a `mysql://` URL.
    ///
    /// # Errors
    /// Returns a configuration error if the URL is invalid.
    pub fn from_url(connection_string: &str, max_connections: u32) -> Result<Self> {
        validate_mysql_connection_string(connection_string)?;
        let max_connections = max_connections.clamp(1, MAX_OPEN_CONNECTIONS_LIMIT);
        let pool = create_mysql_connection_pool(connection_string, max_connections)?;

        Ok(Self {
            pool,
            max_connections,
            redacted_url: redact_database_url(connection_string),
        })
    }
}

/// Validates MySQL connection string format
///
/// # Errors
/// Returns error if the scheme is not `mysql` or no host is present
pub fn validate_mysql_connection_string(connection_string: &str) -> Result<()> {
    let url = Url::parse(connection_string).map_err(|e| {
        ObfuscatorError::configuration(format!("Invalid MySQL connection string format: {}", e))
    })?;

    if url.scheme() != "mysql" {
        return Err(ObfuscatorError::configuration(
            "Connection string must use mysql:// scheme",
        ));
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(ObfuscatorError::configuration(
            "Connection string must specify a host",
        ));
    }

    if url.path().trim_start_matches('/').is_empty() {
        return Err(ObfuscatorError::configuration(
            "Connection string must specify a schema",
        ));
    }

    Ok(())
}

/// Creates a MySQL connection pool.
///
/// Every session runs in UTC so temporal values read from the origin are
/// written back unchanged on the destination.
fn create_mysql_connection_pool(connection_string: &str, max_connections: u32) -> Result<MySqlPool> {
    use sqlx::Executor;

    sqlx::mysql::MySqlPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .test_before_acquire(true)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET time_zone = '+00:00'").await?;
                Ok(())
            })
        })
        .connect_lazy(connection_string)
        .map_err(|e| {
            ObfuscatorError::connection_failed(
                format!(
                    "Failed to create MySQL connection pool to {}",
                    redact_database_url(connection_string)
                ),
                e,
            )
        })
}
