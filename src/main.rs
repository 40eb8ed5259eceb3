//! # Campaigns Entry Point
//!
//! `serve` runs the HTTP API with the background scheduler, `run-due` performs
//! a single scheduler pass for an external cron, `migrate` applies migrations.

use std::sync::Arc;

use anyhow::{Context, Result};
use campaigns::{
    config::ConfigLoader,
    db,
    gateway::{HttpGateway, MessageGateway},
    migration::{Migrator, MigratorTrait},
    server::{AppState, run_server},
    telemetry,
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "campaigns", version, about = "Scheduled campaign messaging dispatcher")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy, Default)]
enum Command {
    /// Apply migrations, then serve HTTP and run the scheduler
    #[default]
    Serve,
    /// Dispatch every due campaign once and exit
    RunDue,
    /// Apply pending database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing telemetry")?;

    tracing::info!(profile = %config.profile, "Configuration loaded");
    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(config = %redacted, "Effective configuration");
    }

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;

    match cli.command.unwrap_or_default() {
        Command::Migrate => {
            Migrator::up(&db, None).await.context("applying migrations")?;
            tracing::info!("Migrations applied");
            Ok(())
        }
        Command::RunDue => {
            config.gateway.validate().context("gateway configuration")?;
            let gateway: Arc<dyn MessageGateway> = Arc::new(HttpGateway::new(&config.gateway)?);
            let state = AppState::new(Arc::new(config), db, gateway);

            let report = state
                .scheduler
                .tick()
                .await
                .context("running due campaigns")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Serve => {
            Migrator::up(&db, None).await.context("applying migrations")?;
            config.gateway.validate().context("gateway configuration")?;
            let gateway: Arc<dyn MessageGateway> = Arc::new(HttpGateway::new(&config.gateway)?);
            let state = AppState::new(Arc::new(config), db, gateway);

            let shutdown = CancellationToken::new();
            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Shutdown signal received");
                }
                signal_token.cancel();
            });

            run_server(state, shutdown).await
        }
    }
}
