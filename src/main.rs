#![forbid(unsafe_code)]

//! `rapport-scheduler`: standalone scheduling daemon.
//!
//! Loads configuration, opens the store, runs the in-process notification
//! gateway, re-registers pending actions left over from a previous run and
//! applies fire events until shut down.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use rapport_scheduler::config::GlobalConfig;
use rapport_scheduler::gateway::local::LocalGateway;
use rapport_scheduler::gateway::NotificationGateway;
use rapport_scheduler::persistence::db;
use rapport_scheduler::scheduling::consumer::spawn_fire_consumer;
use rapport_scheduler::scheduling::service::{SchedulingPolicy, SchedulingService};
use rapport_scheduler::time::clock::SystemClock;
use rapport_scheduler::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "rapport-scheduler",
    about = "Reminder and text scheduling daemon",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("rapport-scheduler bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = GlobalConfig::load_from_path(&args.config)?;
    info!(timezone = %config.timezone, "configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.db_path).await?);
    info!(db_path = %config.db_path.display(), "database connected");

    // ── Build the scheduling service ────────────────────
    let (gateway, events) = LocalGateway::new(config.scheduling.event_buffer);
    let gateway = Arc::new(gateway);
    let service = Arc::new(SchedulingService::new(
        db,
        Arc::clone(&gateway) as Arc<dyn NotificationGateway>,
        Arc::new(SystemClock),
        SchedulingPolicy::from(&config),
    ));

    // ── Re-register actions armed by a previous run ─────
    let report = service.resync_pending().await?;
    info!(
        rearmed = report.rearmed,
        missed = report.missed,
        failed = report.failed,
        "startup resync complete"
    );

    // ── Apply fire events ───────────────────────────────
    let ct = CancellationToken::new();
    let consumer = spawn_fire_consumer(events, Arc::clone(&service), ct.clone());
    info!("scheduler ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();
    gateway.shutdown();

    if let Err(err) = consumer.await {
        error!(%err, "fire consumer task failed");
    }
    info!("rapport-scheduler shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
