//! Roast Sync - demo driver
//!
//! Runs the sync controller against a simulated roaster and an in-memory
//! slider surface, with a REPL for playing both sides.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, ValueEnum};
use colored::*;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use roast_sync::{
    ConnectionStatus, SimulatedRoaster, SliderSurface, SyncConfig, SyncController, SyncEvent,
};

/// Roast Sync - keep a roaster and its control surface in agreement
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "roast-sync.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the poll interval from the config file
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    dump_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level, args.log_format)?;

    let mut config = SyncConfig::load_or_default(&args.config).await?;
    if let Some(interval) = args.poll_interval_ms {
        config.poll_interval_ms = interval;
        config
            .validate()
            .context("Invalid --poll-interval-ms override")?;
    }

    if args.dump_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    info!("Starting Roast Sync...");
    info!(
        "Poll interval {}ms, {} retr{} per command",
        config.poll_interval_ms,
        config.command_retry_count,
        if config.command_retry_count == 1 { "y" } else { "ies" }
    );

    let roaster = Arc::new(SimulatedRoaster::new(config.channels));
    let surface = Arc::new(SliderSurface::new(config.channels));
    let controller = SyncController::new(config, roaster.clone(), surface.clone());
    let handle = controller.handle();

    handle.subscribe_status(Arc::new(|status: ConnectionStatus| {
        let label = match &status {
            ConnectionStatus::Connected => status.to_string().green(),
            ConnectionStatus::Disconnected => status.to_string().red(),
            ConnectionStatus::Reconnecting { .. } => status.to_string().yellow(),
        };
        println!("[{}] roaster {}", Local::now().format("%H:%M:%S"), label);
    }));
    handle.subscribe_events(Arc::new(|event: &SyncEvent| {
        if let SyncEvent::CommandFailed { channel, value, error, .. } = event {
            println!(
                "[{}] {} {}={} not applied: {}",
                Local::now().format("%H:%M:%S"),
                "⚠".yellow(),
                channel,
                value,
                error
            );
        }
    }));

    let (quit_tx, quit_rx) = oneshot::channel::<()>();
    let controller_task = tokio::spawn(controller.run(async move {
        let _ = quit_rx.await;
    }));

    let repl = cli::Repl {
        roaster,
        surface,
        handle,
    };
    let mut repl_task = tokio::task::spawn_blocking(move || repl.run());

    tokio::select! {
        result = &mut repl_task => match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("REPL failed: {}", e),
            Err(e) => warn!("REPL task panicked: {}", e),
        },
        _ = shutdown_signal() => {}
    }

    let _ = quit_tx.send(());
    controller_task
        .await
        .context("Sync controller task failed")?;

    info!("Roast Sync shutdown complete");
    // A REPL still blocked on stdin is abandoned with the process
    std::process::exit(0);
}

fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_target(false),
            )
            .init(),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
