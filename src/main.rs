//! # showsync Entry Point
//!
//! `serve` (the default) runs the HTTP API and the daily update timer;
//! `ingest` and `update` drive a single run in the foreground.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use showsync::{
    config::{AppConfig, ConfigLoader},
    db,
    server::{AppState, run_server},
    telemetry,
    update_timer::UpdateTimer,
    upstream::{TvMazeClient, UpdatePeriod},
    workflows::{SHOW_INGEST, SHOW_UPDATE, ShowIngestInput, ShowUpdateInput},
};

#[derive(Debug, Parser)]
#[command(name = "showsync", version, about = "TV catalog ingestion service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply migrations, resume incomplete runs and serve the API
    Serve,
    /// Run a full catalog ingest to completion
    Ingest {
        #[arg(long)]
        concurrency_limit: Option<usize>,
        #[arg(long)]
        batch_delay_ms: Option<u64>,
    },
    /// Run a delta sync to completion
    Update {
        #[arg(long, default_value = "day")]
        period: UpdatePeriod,
    },
    /// Apply pending migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load().context("loading configuration")?;
    config.validate().context("validating configuration")?;
    telemetry::init_tracing(&config).context("initializing telemetry")?;

    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Loaded configuration");
    }
    tracing::info!(profile = %config.profile, "Configuration loaded");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Ingest {
            concurrency_limit,
            batch_delay_ms,
        } => {
            let input = ShowIngestInput {
                concurrency_limit,
                batch_delay_ms,
            };
            run_once(config, SHOW_INGEST, serde_json::to_value(input)?).await
        }
        Command::Update { period } => {
            run_once(config, SHOW_UPDATE, serde_json::to_value(ShowUpdateInput { period })?).await
        }
        Command::Migrate => {
            let db = db::init_pool(&config).await?;
            db::run_migrations(&db).await?;
            tracing::info!("Migrations applied");
            Ok(())
        }
    }
}

async fn build_state(config: AppConfig) -> Result<AppState> {
    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    db::run_migrations(&db).await?;

    let source = TvMazeClient::new(&config.upstream).context("building catalog client")?;
    Ok(AppState::new(config, db, Arc::new(source)))
}

async fn serve(config: AppConfig) -> Result<()> {
    let state = build_state(config).await?;
    let shutdown = CancellationToken::new();

    state
        .engine
        .resume_incomplete()
        .await
        .context("resuming incomplete runs")?;

    let timer = UpdateTimer::new(state.config.update_timer.clone(), Arc::clone(&state.engine));
    let timer_handle = tokio::spawn(timer.run(shutdown.clone()));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
        signal_token.cancel();
    });

    let served = run_server(state, shutdown.clone()).await;
    shutdown.cancel();
    if let Err(err) = timer_handle.await {
        tracing::warn!(error = %err, "Update timer task ended abnormally");
    }
    served
}

async fn run_once(config: AppConfig, definition: &str, input: Value) -> Result<()> {
    let state = build_state(config).await?;
    let snapshot = state
        .engine
        .run_to_completion(definition, input)
        .await
        .with_context(|| format!("running {}", definition))?;

    tracing::info!(run_id = %snapshot.id, status = %snapshot.status, "Run finished");
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
