//! Lanwatch daemon - Main entry point
//!
//! Runs the discovery scanner and presence monitor, forwarding their events
//! to stdout as JSON lines for whatever consumes them.

mod config;
mod state;

use anyhow::Result;
use clap::Parser;
use lanwatch_core::DeviceRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "lanwatch")]
#[command(about = "Local network discovery and presence tracking daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "lanwatch.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Run a single scan, print the results, and exit
    #[arg(long)]
    scan_once: bool,

    /// Write a default configuration file and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("lanwatch v{}", env!("CARGO_PKG_VERSION"));

    if args.init_config {
        config::save_default_config(&args.config)?;
        info!(path = %args.config.display(), "Wrote default configuration");
        return Ok(());
    }

    let config = config::load_config(&args.config)?;
    let state = AppState::new(config.clone()).await?;

    if args.scan_once {
        state.orchestrator.run_scan().await;
        let mut devices = state.registry.list_all()?;
        devices.sort_by_key(|d| d.id);
        println!("Discovered {} devices:", devices.len());
        for device in devices {
            println!(
                "  - {} at {} ({}, {})",
                device.mac_address,
                device.ip_address,
                device.hostname.as_deref().unwrap_or("no hostname"),
                device.vendor.as_deref().unwrap_or("no vendor"),
            );
        }
        return Ok(());
    }

    // Event sink: one JSON line per event on stdout
    let mut events = state.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        println!("{json}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Event sink lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    state.monitor.start();
    spawn_scan_scheduler(state.clone());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    state.monitor.stop();

    Ok(())
}

/// Schedule discovery scans on a fixed cadence.
///
/// An interval tick that lands while a scan is still running gets rejected
/// by the orchestrator; the schedule simply tries again next time.
fn spawn_scan_scheduler(state: Arc<AppState>) {
    let scan_interval = Duration::from_secs(state.config.daemon.scan_interval_secs);
    let scan_on_start = state.config.daemon.scan_on_start;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(scan_interval);
        if !scan_on_start {
            // Consume the immediate first tick
            ticker.tick().await;
        }
        loop {
            ticker.tick().await;
            state.orchestrator.run_scan().await;
        }
    });
}
