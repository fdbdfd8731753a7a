//! PXE Pilot
//!
//! Daemon managing a fleet of network-booted machines:
//! - Serves the HTTP API for catalog listing, deployments and power control
//! - Reloads its configuration file on SIGHUP
//! - Optionally refreshes cached power states on a fixed interval

mod controller;
mod error;
mod watcher;

use anyhow::Context;
use controller::Controller;
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "/etc/pxe-pilot/pxe-pilot.yml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting PXE Pilot");

    // Load configuration from environment variables
    let config_path = env::var("PXE_PILOT_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);

    info!("Configuration:");
    info!("  Config file: {}", config_path.display());

    let controller = Controller::new(config_path)
        .await
        .context("failed to initialize PXE Pilot")?;
    controller.run().await.context("PXE Pilot stopped with an error")?;

    Ok(())
}
