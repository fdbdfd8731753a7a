//! Main controller implementation.
//!
//! Owns the [`PxeServer`], serves its API and runs the background watchers
//! until a shutdown signal arrives.

use crate::error::ControllerError;
use crate::watcher::Watcher;
use pxe_server::{AppConfig, PxeServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

pub struct Controller {
    server: Arc<PxeServer>,
    watcher: Arc<Watcher>,
}

impl Controller {
    /// Loads the configuration file and builds the server.
    pub async fn new(config_path: PathBuf) -> Result<Self, ControllerError> {
        info!("Initializing PXE Pilot");

        let config = AppConfig::load(&config_path).await?;
        let server = Arc::new(PxeServer::from_config(config).await?);
        let watcher = Arc::new(Watcher::new(Arc::clone(&server), config_path));

        Ok(Self { server, watcher })
    }

    /// Serves the API until SIGINT or SIGTERM.
    pub async fn run(&self) -> Result<(), ControllerError> {
        let listener = self.server.bind().await?;

        let reload_watcher = {
            let watcher = Arc::clone(&self.watcher);
            tokio::spawn(async move {
                if let Err(e) = watcher.watch_reload_signal().await {
                    error!("Reload watcher stopped: {}", e);
                }
            })
        };

        let refresh_watcher = self.server.config().refresh_interval().map(|period| {
            info!("Refreshing power states every {:?}", period);
            let watcher = Arc::clone(&self.watcher);
            tokio::spawn(async move { watcher.refresh_periodically(period).await })
        });

        let result = self.server.serve(listener, shutdown_signal()).await;

        reload_watcher.abort();
        if let Some(handle) = refresh_watcher {
            handle.abort();
        }
        result?;

        info!("PXE Pilot stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => info!("SIGINT received, shutting down"),
        () = terminate => info!("SIGTERM received, shutting down"),
    }
}
