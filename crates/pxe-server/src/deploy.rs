//! Deployment orchestrator
//!
//! Pushes one configuration to a batch of hosts. Every host entry runs as its
//! own task so that a slow or failing backend only affects its own entry.
//! Results are collected in request order.

use crate::catalog::{Catalog, CatalogHandle};
use crate::error::{DeployError, HostPowerError};
use crate::registry::Registry;
use crate::tftp::BootFiles;
use models::{
    Bootloader, Configuration, DeploymentRequest, DeploymentResult, FailureReason, Host,
    HostOutcome, HostRequest, Outcome, PowerState,
};
use power_client::{PowerAdapter, PowerError};
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, error, info, warn};

/// Waits for a backend call slot.
pub(crate) async fn backend_permit(permits: &Semaphore) -> Result<SemaphorePermit<'_>, PowerError> {
    permits
        .acquire()
        .await
        .map_err(|_closed| PowerError::Refused("backend call limiter closed".to_string()))
}

/// A configuration together with the bootloader it is written for.
struct Target {
    configuration: Configuration,
    bootloader: Bootloader,
}

impl Target {
    fn resolve(catalog: &Catalog, name: &str) -> Result<Self, DeployError> {
        let configuration = catalog
            .resolve(name)
            .cloned()
            .ok_or_else(|| DeployError::ConfigurationNotFound(name.to_string()))?;
        let bootloader = catalog
            .bootloader(&configuration.bootloader)
            .cloned()
            .ok_or_else(|| DeployError::BootloaderMissing {
                configuration: configuration.name.clone(),
                bootloader: configuration.bootloader.clone(),
            })?;
        Ok(Self {
            configuration,
            bootloader,
        })
    }
}

#[derive(Clone, Copy, Debug)]
enum HostPowerOp {
    On,
    Off,
    Reboot,
}

impl HostPowerOp {
    fn resulting_state(self) -> PowerState {
        match self {
            Self::On | Self::Reboot => PowerState::On,
            Self::Off => PowerState::Off,
        }
    }
}

/// Assigns configurations and drives host power.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<Registry>,
    catalog: Arc<CatalogHandle>,
    power: PowerAdapter,
    boot_files: Arc<dyn BootFiles>,
    permits: Arc<Semaphore>,
}

impl Orchestrator {
    /// Creates an orchestrator allowing at most `max_concurrency` backend
    /// calls at once.
    pub fn new(
        registry: Arc<Registry>,
        catalog: Arc<CatalogHandle>,
        power: PowerAdapter,
        boot_files: Arc<dyn BootFiles>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            registry,
            catalog,
            power,
            boot_files,
            permits: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn catalog(&self) -> &Arc<CatalogHandle> {
        &self.catalog
    }

    pub fn power(&self) -> &PowerAdapter {
        &self.power
    }

    /// Backend call limiter, shared with the refresh engine.
    pub fn permits(&self) -> &Arc<Semaphore> {
        &self.permits
    }

    /// Assigns the requested configuration to every host entry and reboots
    /// the entries that ask for it.
    ///
    /// An unknown configuration fails the whole request before anything is
    /// mutated. Every other failure is reported in the entry's outcome.
    pub async fn deploy(&self, request: DeploymentRequest) -> Result<DeploymentResult, DeployError> {
        Target::resolve(&self.catalog.snapshot(), &request.configuration)?;

        info!(
            configuration = %request.configuration,
            hosts = request.hosts.len(),
            "Deploying configuration"
        );

        let handles: Vec<_> = request
            .hosts
            .iter()
            .cloned()
            .map(|entry| {
                let this = self.clone();
                let configuration = request.configuration.clone();
                tokio::spawn(async move { this.deploy_host(&configuration, &entry).await })
            })
            .collect();

        let mut hosts = Vec::with_capacity(handles.len());
        for (entry, handle) in request.hosts.into_iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(host = %entry.name, error = %e, "Deployment task failed");
                    Outcome::Failed(FailureReason::Internal)
                }
            };
            hosts.push(HostOutcome {
                name: entry.name,
                outcome,
            });
        }

        let failed = hosts.iter().filter(|h| h.outcome.failure().is_some()).count();
        info!(
            configuration = %request.configuration,
            hosts = hosts.len(),
            failed,
            "Deployment finished"
        );

        Ok(DeploymentResult {
            configuration: request.configuration,
            hosts,
        })
    }

    async fn deploy_host(&self, configuration: &str, entry: &HostRequest) -> Outcome {
        let Some(mut host) = self.registry.lock(&entry.name).await else {
            warn!(host = %entry.name, "Deployment target is not registered");
            return Outcome::Failed(FailureReason::HostUnknown);
        };

        // Resolved again under the lock: a reload swaps the catalog before it
        // unassigns hosts, so a configuration seen here is either still
        // current or will be unassigned once the lock is released.
        let target = match Target::resolve(&self.catalog.snapshot(), configuration) {
            Ok(target) => target,
            Err(e) => {
                warn!(host = %entry.name, error = %e, "Configuration removed during deployment");
                return Outcome::Failed(FailureReason::ConfigurationRemoved);
            }
        };

        if let Err(e) = self
            .boot_files
            .write(
                &target.bootloader,
                host.mac_addresses.macs(),
                &target.configuration.content,
            )
            .await
        {
            warn!(host = %entry.name, error = %e, "Failed to write boot file");
            return Outcome::Failed(FailureReason::BootFile);
        }
        host.set_configuration(Some(target.configuration.name.clone()));
        let snapshot = Host::clone(&host);
        drop(host);
        debug!(host = %entry.name, configuration = %target.configuration.name, "Configuration assigned");

        if !entry.reboot {
            return Outcome::ConfigApplied;
        }

        match self.run_power(&snapshot, HostPowerOp::Reboot).await {
            Ok(()) => Outcome::Rebooted,
            Err(e) => {
                warn!(host = %entry.name, error = %e, "Reboot failed");
                Outcome::Failed(e.reason())
            }
        }
    }

    /// Runs a power operation on an already resolved host. Only managed hosts
    /// take a backend permit.
    async fn run_power(&self, host: &Host, op: HostPowerOp) -> Result<(), PowerError> {
        if !host.management.is_managed() {
            return Err(PowerError::NoManagementEndpoint);
        }

        {
            let _permit = backend_permit(&self.permits).await?;
            match op {
                HostPowerOp::On => self.power.power_on(host).await?,
                HostPowerOp::Off => self.power.power_off(host).await?,
                HostPowerOp::Reboot => self.power.reboot(host).await?,
            }
        }

        // The host may have been renamed or removed meanwhile
        if self
            .registry
            .set_power_state(&host.name, op.resulting_state())
            .await
            .is_err()
        {
            debug!(host = %host.name, "Host vanished before its power state was recorded");
        }
        Ok(())
    }

    async fn host_power(&self, name: &str, op: HostPowerOp) -> Result<(), HostPowerError> {
        let host = self
            .registry
            .lookup(name)
            .await
            .ok_or_else(|| HostPowerError::HostUnknown(name.to_string()))?;
        self.run_power(&host, op).await?;
        Ok(())
    }

    pub async fn power_on(&self, name: &str) -> Result<(), HostPowerError> {
        self.host_power(name, HostPowerOp::On).await
    }

    pub async fn power_off(&self, name: &str) -> Result<(), HostPowerError> {
        self.host_power(name, HostPowerOp::Off).await
    }

    /// Reboots one host: power-cycle when on, power-on otherwise.
    pub async fn reboot(&self, name: &str) -> Result<(), HostPowerError> {
        self.host_power(name, HostPowerOp::Reboot).await
    }

    /// Unassigns every host whose configuration is no longer in the current
    /// catalog and removes its boot files. `previous` is the catalog the
    /// assignments were made against.
    ///
    /// Returns the unassigned host names, ordered.
    pub async fn unassign_missing(&self, previous: &Catalog) -> Vec<String> {
        let current = self.catalog.snapshot();
        let mut unassigned = Vec::new();

        for name in self.registry.names().await {
            let Some(mut host) = self.registry.lock(&name).await else {
                continue;
            };
            let Some(configuration) = host.configuration.clone() else {
                continue;
            };
            if current.resolve(&configuration).is_some() {
                continue;
            }

            if let Some(bootloader) = previous.bootloader_for(&configuration) {
                if let Err(e) = self
                    .boot_files
                    .clear(bootloader, host.mac_addresses.macs())
                    .await
                {
                    warn!(host = %name, error = %e, "Failed to remove boot file");
                }
            }
            host.set_configuration(None);
            info!(host = %name, configuration = %configuration, "Configuration removed, host unassigned");
            unassigned.push(name);
        }

        unassigned
    }
}
