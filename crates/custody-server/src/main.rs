//! `custodyd` - the central auditing service daemon.
//!
//! Loads configuration, starts the consumer and the query API, and runs
//! until Ctrl+C or SIGTERM.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use custody_config::ServiceConfig;
use custody_server::{AppContext, Service};
use custody_telemetry::{LogConfig, LogFormat};
use tracing::info;

/// Central auditing service: verifies, re-signs and stores audit entries.
#[derive(Parser)]
#[command(name = "custodyd")]
#[command(author, version, about)]
struct Args {
    /// Configuration file layered over the built-in defaults.
    #[arg(short, long, env = "CUSTODY_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level regardless of configuration.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolved = ServiceConfig::load(args.config.as_deref()).context("loading configuration")?;
    let config = resolved.config;

    let level = if args.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let format: LogFormat = config.logging.format.parse()?;
    let mut log_config = LogConfig::new(level).with_format(format);
    for directive in &config.logging.directives {
        log_config = log_config.with_directive(directive.clone());
    }
    if let Err(e) = custody_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    if let Some(path) = &resolved.loaded_file {
        info!(path = %path.display(), "Using config file");
    }

    let ctx = AppContext::from_config(&config)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http.port));
    let service = Service::start(ctx, addr).await?;
    info!(addr = %service.local_addr(), "custodyd running");

    shutdown_signal().await;

    service.shutdown().await?;
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = term.recv() => {},
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable; waiting for Ctrl+C");
            let _ = tokio::signal::ctrl_c().await;
        },
    }
    info!("Shutdown signal received");
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
