//! MySQL obfuscate-and-copy service.
//!
//! This binary runs the HTTP obfuscation service, or performs one-off
//! tasks from the command line.
//!
//! # Data Handling Guarantees
//! - Source tables are read under a read lock and never written
//! - Masked columns never leave the process unmasked
//! - Database credentials are never logged

use anyhow::Context;
use clap::Parser;
use dbobfuscator::server::{self, AdminCredentials, AppState};
use dbobfuscator::{Cli, Command, SchemaInfoArgs, ServeArgs};
use dbobfuscator_core::adapters::MySqlConnector;
use dbobfuscator_core::logging::init_logging;
use dbobfuscator_core::{AppConfig, ObfuscationService};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.global.verbose, cli.global.quiet)?;

    let config = AppConfig::load(&cli.global.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    match cli.command {
        Command::Serve(args) => serve(args, config).await,
        Command::SchemaInfo(args) => schema_info(args, config).await,
        Command::CheckConfig => {
            check_config(&cli.global.config, &config);
            Ok(())
        }
    }
}

fn build_service(config: &AppConfig) -> anyhow::Result<ObfuscationService> {
    let connector = Arc::new(MySqlConnector::from_config(&config.db));
    ObfuscationService::new(connector, &config.obfuscator)
        .context("Failed to create obfuscation service")
}

/// Runs the HTTP service until Ctrl-C, then cancels in-flight runs.
async fn serve(args: ServeArgs, config: AppConfig) -> anyhow::Result<()> {
    info!("Initializing http-server");
    let service = build_service(&config)?;
    let credentials = AdminCredentials::generate();
    info!(
        "Admin user: {}, password: {}",
        credentials.user(),
        credentials.password()
    );

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;

    let state = AppState::new(service.clone(), credentials);
    server::serve(listener, state, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    service.shutdown().await;
    info!("✓ Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Prints the live schema as a JSON obfuscation plan.
async fn schema_info(args: SchemaInfoArgs, config: AppConfig) -> anyhow::Result<()> {
    let info = args.connection_info()?;
    info!("Collecting schema info from {}", info);

    let service = build_service(&config)?;
    let plan = service.schema_info(&info).await.map_err(|e| {
        error!("Schema info failed: {}", e);
        e
    })?;

    let json = serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("✓ Plan for {} tables saved to {}", plan.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn check_config(path: &Path, config: &AppConfig) {
    info!("✓ Configuration is valid");
    println!("Configuration: {}", path.display());
    println!("db.maxOpenConnections: {}", config.db.max_open_connections);
    println!("obfuscator.sliceSize: {}", config.obfuscator.slice_size);
    println!(
        "obfuscator.dispersionPercent: {}",
        config.obfuscator.dispersion_percent
    );
}
