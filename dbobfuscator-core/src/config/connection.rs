//! Database connection parameters as submitted by clients.
//!
//! # Security
//! The password is cleared from memory on drop and never appears in `Debug`
//! or `Display` output.

use crate::Result;
use crate::error::ObfuscatorError;
use serde::Deserialize;
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// MySQL limits schema names to 64 characters
const MAX_SCHEMA_NAME_LEN: usize = 64;

/// Where to connect: `Host` may carry a port (`db.internal:3307`).
#[derive(Clone, PartialEq, Eq, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ConnectionInfo {
    #[serde(rename = "User")]
    pub user: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "Schema")]
    pub schema: String,
}

impl std::fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("user", &self.user)
            .field("password", &"****")
            .field("host", &self.host)
            .field("schema", &self.schema)
            .finish()
    }
}

impl std::fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}/{}", self.user, self.host, self.schema)
    }
}

impl ConnectionInfo {
    /// Creates connection info from its parts.
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            host: host.into(),
            schema: schema.into(),
        }
    }

    /// Validates that every field is usable.
    ///
    /// # Errors
    /// Returns a configuration error for an empty host, user or schema, or a
    /// schema name MySQL would reject.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ObfuscatorError::configuration("Host cannot be empty"));
        }

        if self.user.is_empty() {
            return Err(ObfuscatorError::configuration("User cannot be empty"));
        }

        if self.schema.is_empty() || self.schema.len() > MAX_SCHEMA_NAME_LEN {
            return Err(ObfuscatorError::configuration(format!(
                "Invalid schema name length: must be 1-{} characters, got {}",
                MAX_SCHEMA_NAME_LEN,
                self.schema.len()
            )));
        }

        if self.schema.contains(['/', '\\', '.', '`', ';', '\'', '"']) {
            return Err(ObfuscatorError::configuration(
                "Schema name contains invalid characters",
            ));
        }

        Ok(())
    }

    /// Builds a `mysql://` connection URL.
    ///
    /// The returned string holds the password and is cleared on drop.
    ///
    /// # Errors
    /// Returns a configuration error if the fields do not form a valid URL.
    pub fn to_url(&self) -> Result<Zeroizing<String>> {
        self.validate()?;

        let mut url = Url::parse(&format!("mysql://{}", self.host.trim())).map_err(|e| {
            ObfuscatorError::configuration(format!("Invalid host '{}': {}", self.host, e))
        })?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(ObfuscatorError::configuration(format!(
                "Invalid host '{}'",
                self.host
            )));
        }

        url.set_username(&self.user)
            .map_err(|()| ObfuscatorError::configuration("Cannot set user on connection URL"))?;
        if !self.password.is_empty() {
            url.set_password(Some(&self.password)).map_err(|()| {
                ObfuscatorError::configuration("Cannot set password on connection URL")
            })?;
        }
        url.set_path(&format!("/{}", self.schema));

        Ok(Zeroizing::new(url.to_string()))
    }

    /// The connection URL with the password masked, for logs.
    pub fn redacted_url(&self) -> String {
        match self.to_url() {
            Ok(url) => crate::error::redact_database_url(&url),
            Err(_) => "<redacted>".to_string(),
        }
    }
}
