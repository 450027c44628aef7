//! Configuration types.
//!
//! - `AppConfig`: service settings read from `config.yaml`
//! - `ConnectionInfo`: per-request database coordinates and credentials

mod app;
mod connection;

pub use app::{AppConfig, DEFAULT_CONFIG_PATH, DbConfig, MAX_OPEN_CONNECTIONS_LIMIT, ObfuscatorConfig};
pub use connection::ConnectionInfo;
