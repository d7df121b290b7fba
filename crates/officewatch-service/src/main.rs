//! CLI entry point for OfficeWatch.
//!
//! This binary provides the `officewatch` command: `serve` runs the
//! assembled service until interrupted, `status` reports on the local
//! deployment.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use officewatch_service::{Config, OfficeWatch};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// OfficeWatch — shadow-IT subscription tracking.
#[derive(Parser)]
#[command(
    name = "officewatch",
    version,
    about = "OfficeWatch — shadow-IT subscription tracking",
    long_about = "Tracks software subscriptions per user, routes employee requests through \
                  an admin approval workflow, and detects unsanctioned tools in uploaded \
                  invoices and simulated billing feeds."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "config/officewatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the service and run until interrupted.
    Serve,

    /// Show the state of the local deployment.
    Status,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up a local .env before anything reads the environment.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load(&cli.config).context("failed to load configuration")?;

    match cli.command {
        Commands::Serve => cmd_serve(config).await,
        Commands::Status => cmd_status(config).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: serve
// ---------------------------------------------------------------------------

async fn cmd_serve(config: Config) -> Result<()> {
    init_tracing("info");
    info!("starting OfficeWatch");

    let service = OfficeWatch::open(&config)
        .await
        .context("failed to start service")?;
    info!("service ready; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    service.shutdown().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: status
// ---------------------------------------------------------------------------

async fn cmd_status(config: Config) -> Result<()> {
    let db_path = config.db_path();

    println!("OfficeWatch v{}", env!("CARGO_PKG_VERSION"));
    println!("  database:   {}", db_path.display());
    println!("  upload dir: {}", config.upload_dir().display());

    if !db_path.exists() {
        println!("  state:      not initialized (run `officewatch serve` first)");
        return Ok(());
    }

    let db = officewatch_store::Database::open_and_migrate(db_path)
        .await
        .context("failed to open database")?;
    let (users, subscriptions, requests) = db
        .execute(|conn| {
            let count = |sql: &str| -> Result<i64, officewatch_store::StoreError> {
                Ok(conn.query_row(sql, [], |row| row.get(0))?)
            };
            Ok((
                count("SELECT COUNT(*) FROM users")?,
                count("SELECT COUNT(*) FROM subscriptions")?,
                count("SELECT COUNT(*) FROM requests")?,
            ))
        })
        .await
        .context("failed to query database")?;

    println!("  users:         {users}");
    println!("  subscriptions: {subscriptions}");
    println!("  requests:      {requests}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
