//! Power state refresh
//!
//! Re-reads the live power state of every managed host and caches it in the
//! registry.

use crate::deploy::backend_permit;
use crate::registry::Registry;
use power_client::PowerAdapter;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Hosts refreshed and hosts whose backend failed, both ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub refreshed: Vec<String>,
    pub failed: Vec<String>,
}

/// Re-reads live power states into the registry.
#[derive(Clone)]
pub struct RefreshEngine {
    registry: Arc<Registry>,
    power: PowerAdapter,
    permits: Arc<Semaphore>,
}

impl RefreshEngine {
    /// Creates an engine whose backend calls take `permits`.
    pub fn new(registry: Arc<Registry>, power: PowerAdapter, permits: Arc<Semaphore>) -> Self {
        Self {
            registry,
            power,
            permits,
        }
    }

    /// Queries every managed host concurrently. A failed query leaves the
    /// cached state untouched and lists the host under `failed`.
    pub async fn refresh_all(&self) -> RefreshReport {
        let hosts: Vec<_> = self
            .registry
            .list()
            .await
            .into_iter()
            .filter(|h| h.management.is_managed())
            .collect();

        let handles: Vec<_> = hosts
            .into_iter()
            .map(|host| {
                let this = self.clone();
                let name = host.name.clone();
                let handle = tokio::spawn(async move {
                    let state = {
                        let _permit = backend_permit(&this.permits).await?;
                        this.power.query_state(&host).await?
                    };
                    if this.registry.set_power_state(&host.name, state).await.is_err() {
                        warn!(host = %host.name, "Host vanished during refresh");
                    }
                    Ok::<_, power_client::PowerError>(())
                });
                (name, handle)
            })
            .collect();

        let mut report = RefreshReport::default();
        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(())) => report.refreshed.push(name),
                Ok(Err(e)) => {
                    warn!(host = %name, error = %e, "Failed to refresh power state");
                    report.failed.push(name);
                }
                Err(e) => {
                    error!(host = %name, error = %e, "Refresh task failed");
                    report.failed.push(name);
                }
            }
        }

        info!(
            refreshed = report.refreshed.len(),
            failed = report.failed.len(),
            "Power states refreshed"
        );
        report
    }
}
