//! Service configuration loaded from `config.yaml`.
//!
//! ```yaml
//! db:
//!   maxOpenConnections: 10
//! obfuscator:
//!   sliceSize: 1000
//!   dispersionPercent: 10
//! ```

use crate::Result;
use crate::error::ObfuscatorError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Upper limit on pooled connections per database
pub const MAX_OPEN_CONNECTIONS_LIMIT: u32 = 100;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub db: DbConfig,
    pub obfuscator: ObfuscatorConfig,
}

/// Connection pool settings applied to both origin and destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DbConfig {
    /// Maximum open connections per pool
    pub max_open_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            max_open_connections: 10,
        }
    }
}

/// Copy and masking settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObfuscatorConfig {
    /// Rows read and inserted per batch
    pub slice_size: usize,
    /// Maximum numeric perturbation, in percent of the value
    pub dispersion_percent: u8,
}

impl Default for ObfuscatorConfig {
    fn default() -> Self {
        Self {
            slice_size: 1000,
            dispersion_percent: 10,
        }
    }
}

impl AppConfig {
    /// Parses and validates configuration from YAML text.
    ///
    /// # Errors
    /// Returns a configuration error for malformed YAML or invalid values.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text).map_err(|e| {
            ObfuscatorError::configuration(format!("Invalid configuration file: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read, otherwise the same
    /// errors as [`AppConfig::from_yaml`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ObfuscatorError::Io {
            context: format!("Failed to read configuration file {}", path.display()),
            source,
        })?;
        let config = Self::from_yaml(&text)?;
        tracing::debug!(
            path = %path.display(),
            slice_size = config.obfuscator.slice_size,
            dispersion_percent = config.obfuscator.dispersion_percent,
            max_open_connections = config.db.max_open_connections,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Validates configuration values.
    ///
    /// # Errors
    /// Returns a configuration error naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.obfuscator.slice_size == 0 {
            return Err(ObfuscatorError::configuration(
                "obfuscator.sliceSize must be greater than 0",
            ));
        }

        if self.obfuscator.dispersion_percent > crate::obfuscation::MAX_DISPERSION_PERCENT {
            return Err(ObfuscatorError::configuration(format!(
                "obfuscator.dispersionPercent must not exceed {}",
                crate::obfuscation::MAX_DISPERSION_PERCENT
            )));
        }

        if self.db.max_open_connections == 0 {
            return Err(ObfuscatorError::configuration(
                "db.maxOpenConnections must be greater than 0",
            ));
        }

        if self.db.max_open_connections > MAX_OPEN_CONNECTIONS_LIMIT {
            return Err(ObfuscatorError::configuration(format!(
                "db.maxOpenConnections should not exceed {} for safety",
                MAX_OPEN_CONNECTIONS_LIMIT
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.obfuscator.slice_size, 1000);
        assert_eq!(config.obfuscator.dispersion_percent, 10);
        assert_eq!(config.db.max_open_connections, 10);
    }

    #[test]
    fn test_parse_yaml() {
        let config = AppConfig::from_yaml(
            "db:\n  maxOpenConnections: 4\nobfuscator:\n  sliceSize: 250\n  dispersionPercent: 30\n",
        )
        .unwrap();

        assert_eq!(config.db.max_open_connections, 4);
        assert_eq!(config.obfuscator.slice_size, 250);
        assert_eq!(config.obfuscator.dispersion_percent, 30);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = AppConfig::from_yaml("obfuscator:\n  sliceSize: 5\n").unwrap();
        assert_eq!(config.obfuscator.slice_size, 5);
        assert_eq!(config.obfuscator.dispersion_percent, 10);
        assert_eq!(config.db, DbConfig::default());
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            "obfuscator:\n  sliceSize: 0\n",
            "obfuscator:\n  dispersionPercent: 101\n",
            "db:\n  maxOpenConnections: 0\n",
            "db:\n  maxOpenConnections: 101\n",
            "obfuscator: [not, a, map]\n",
        ];

        for yaml in cases {
            let error = AppConfig::from_yaml(yaml).unwrap_err();
            assert!(
                matches!(error, ObfuscatorError::Configuration { .. }),
                "{}: {}",
                yaml,
                error
            );
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_PATH);
        std::fs::write(&path, "obfuscator:\n  dispersionPercent: 25\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.obfuscator.dispersion_percent, 25);
        assert_eq!(config.obfuscator.slice_size, 1000);
    }

    #[test]
    fn test_load_missing_file() {
        let error = AppConfig::load("/nonexistent/dbobfuscator/config.yaml").unwrap_err();
        assert!(matches!(error, ObfuscatorError::Io { .. }));
    }
}
