//! Server wiring.
//!
//! Builds the catalog, the registry, the orchestrator and the refresh engine
//! from an [`AppConfig`] and serves the HTTP API.

use crate::api::{self, ApiState};
use crate::catalog::CatalogHandle;
use crate::config::AppConfig;
use crate::deploy::Orchestrator;
use crate::error::PxeError;
use crate::refresh::{RefreshEngine, RefreshReport};
use crate::registry::Registry;
use crate::tftp::{BootFiles, NoBootFiles, TftpBootFiles};
use axum::Router;
use power_client::PowerAdapter;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Summary of a configuration reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub configurations: usize,
    pub hosts: usize,
    /// Hosts whose configuration disappeared
    pub unassigned: Vec<String>,
    /// Hosts that could not be registered
    pub rejected: Vec<String>,
}

/// PXE Pilot server: catalog, registry, orchestrator and API.
pub struct PxeServer {
    config: AppConfig,
    orchestrator: Orchestrator,
    refresh: RefreshEngine,
}

impl PxeServer {
    /// Builds a server with the ipmitool and HTTP agent drivers.
    pub async fn from_config(config: AppConfig) -> Result<Self, PxeError> {
        let power = PowerAdapter::with_default_drivers(config.backend_timeout())?;
        Self::with_power(config, power).await
    }

    /// Builds a server over the given power adapter.
    pub async fn with_power(config: AppConfig, power: PowerAdapter) -> Result<Self, PxeError> {
        let catalog = config.build_catalog().await?;
        let boot_files: Arc<dyn BootFiles> = match &config.tftp {
            Some(tftp) => Arc::new(TftpBootFiles::new(&tftp.root)),
            None => {
                warn!("No TFTP root configured, boot files will not be written");
                Arc::new(NoBootFiles)
            }
        };

        let registry = Arc::new(Registry::new());
        for (name, identity, management) in config.host_parts()? {
            registry.upsert(&name, identity, management).await?;
        }

        let orchestrator = Orchestrator::new(
            Arc::clone(&registry),
            Arc::new(CatalogHandle::new(catalog)),
            power.clone(),
            boot_files,
            config.server.max_concurrency,
        );
        let refresh = RefreshEngine::new(registry, power, Arc::clone(orchestrator.permits()));

        info!(
            hosts = config.hosts.len(),
            configurations = config.configurations.len(),
            "PXE server initialized"
        );
        Ok(Self {
            config,
            orchestrator,
            refresh,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.orchestrator.registry()
    }

    pub async fn refresh_all(&self) -> RefreshReport {
        self.refresh.refresh_all().await
    }

    /// Applies a new configuration document.
    ///
    /// The whole document is validated first; an invalid one changes
    /// nothing. Then the catalog is replaced atomically, hosts whose
    /// configuration is gone are unassigned, and declared hosts are
    /// upserted. Hosts missing from the document are kept. Server and TFTP
    /// settings only take effect on restart.
    pub async fn reload(&self, config: AppConfig) -> Result<ReloadSummary, PxeError> {
        let catalog = config.build_catalog().await?;
        let hosts = config.host_parts()?;
        let configurations = config.configurations.len();

        let previous = self.orchestrator.catalog().swap(catalog);
        let unassigned = self.orchestrator.unassign_missing(&previous).await;

        let mut rejected = Vec::new();
        let declared = hosts.len();
        for (name, identity, management) in hosts {
            if let Err(e) = self.registry().upsert(&name, identity, management).await {
                warn!(host = %name, error = %e, "Host rejected on reload");
                rejected.push(name);
            }
        }

        let summary = ReloadSummary {
            configurations,
            hosts: declared - rejected.len(),
            unassigned,
            rejected,
        };
        info!(
            configurations = summary.configurations,
            hosts = summary.hosts,
            unassigned = summary.unassigned.len(),
            "Configuration reloaded"
        );
        Ok(summary)
    }

    pub fn router(&self) -> Router {
        api::router(ApiState {
            orchestrator: self.orchestrator.clone(),
            refresh: self.refresh.clone(),
            api_key: self.config.server.api_key.as_deref().map(Arc::from),
        })
    }

    /// Binds the API listener on all interfaces at the configured port.
    pub async fn bind(&self) -> Result<TcpListener, PxeError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.server.port));
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %addr, "API listening");
        Ok(listener)
    }

    /// Serves the API until `shutdown` resolves.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), PxeError> {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("API server stopped");
        Ok(())
    }
}
