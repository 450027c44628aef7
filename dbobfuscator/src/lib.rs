//! Library module for dbobfuscator
//!
//! This module exposes the CLI definition and the HTTP surface for testing
//! purposes. The main binary functionality is in main.rs.

pub mod server;

use clap::{Args, Parser, Subcommand};
use dbobfuscator_core::config::DEFAULT_CONFIG_PATH;
use dbobfuscator_core::{ConnectionInfo, ObfuscatorError, Result};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Address the HTTP server binds to by default
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// CLI argument structure
#[derive(Debug, Parser)]
#[command(name = "dbobfuscator")]
#[command(about = "Copy a MySQL schema to another server with masked columns")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "
dbobfuscator - Obfuscate-and-copy for MySQL schemas

Copies every table of a source schema into a destination schema, in
foreign-key order, while masking the columns an obfuscation plan selects:
- Numbers get bounded random noise that stays within the column type
- Text is replaced by a truncated MD5 hash
- Key and index columns are never masked

EXAMPLES:
  dbobfuscator serve --listen 127.0.0.1:8080
  dbobfuscator schema-info --host db:3306 --user app --schema shop > plan.json
  dbobfuscator check-config --config ./config.yaml
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP obfuscation service
    Serve(ServeArgs),
    /// Print the live schema of a database as an obfuscation plan
    SchemaInfo(SchemaInfoArgs),
    /// Validate the configuration file and print the effective settings
    CheckConfig,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "DBOBFUSCATOR_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: SocketAddr,
}

#[derive(Debug, Args)]
pub struct SchemaInfoArgs {
    /// Server address as host[:port]
    #[arg(long)]
    pub host: String,

    /// Database user
    #[arg(long)]
    pub user: String,

    /// Schema to describe
    #[arg(long)]
    pub schema: String,

    /// Database password (prompted for when not set)
    #[arg(
        long,
        env = "DBOBFUSCATOR_DB_PASSWORD",
        hide_env_values = true,
        help = "Database password (prompted for when not set; never logged)"
    )]
    pub password: Option<String>,

    /// Write the plan to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl SchemaInfoArgs {
    /// Builds connection info, prompting for the password if needed.
    ///
    /// # Errors
    /// Returns a configuration error if the password cannot be read.
    pub fn connection_info(&self) -> Result<ConnectionInfo> {
        let password = match &self.password {
            Some(password) => password.clone(),
            None => prompt_password(&format!("Password for {}@{}: ", self.user, self.host))?,
        };
        let info = ConnectionInfo::new(&self.user, password, &self.host, &self.schema);
        info.validate()?;
        Ok(info)
    }
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "DBOBFUSCATOR_CONFIG",
        default_value = DEFAULT_CONFIG_PATH
    )]
    pub config: PathBuf,

    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,
}

fn prompt_password(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush().map_err(|e| {
        ObfuscatorError::configuration(format!(
            "Failed to flush stdout before reading password: {}",
            e
        ))
    })?;
    rpassword::read_password()
        .map_err(|e| ObfuscatorError::configuration(format!("Failed to read password: {}", e)))
}
