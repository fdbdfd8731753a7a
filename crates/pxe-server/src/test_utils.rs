//! Test utilities
//!
//! Builders for hosts, catalogs and an orchestrator wired to mock power
//! drivers.

use crate::catalog::{Catalog, CatalogHandle};
use crate::deploy::Orchestrator;
use crate::refresh::RefreshEngine;
use crate::registry::Registry;
use crate::tftp::{BootFiles, NoBootFiles};
use models::{Bootloader, Configuration, HostIdentity, MacAddress, ManagementEndpoint};
use power_client::{MockPowerDriver, PowerAdapter};
use std::sync::Arc;
use std::time::Duration;

pub fn mac(text: &str) -> MacAddress {
    MacAddress::parse(text).unwrap()
}

pub fn identity(host: &str, macs: &[&str]) -> HostIdentity {
    HostIdentity::new(host, macs.iter().map(|m| mac(m)).collect()).unwrap()
}

pub fn agent_endpoint(address: &str) -> ManagementEndpoint {
    ManagementEndpoint::GenericAgent {
        mac_address: mac("fe:00"),
        address: address.to_string(),
    }
}

pub fn bmc_endpoint(address: &str) -> ManagementEndpoint {
    ManagementEndpoint::VendorRemote {
        mac_address: mac("fe:01"),
        address: address.to_string(),
        username: Some("admin".to_string()),
        password: Some("secret".to_string()),
        interface: None,
    }
}

pub fn pxelinux() -> Bootloader {
    Bootloader {
        name: "pxelinux".to_string(),
        file: "pxelinux.0".to_string(),
        config_path: "pxelinux.cfg".to_string(),
    }
}

pub fn configuration(name: &str) -> Configuration {
    Configuration {
        name: name.to_string(),
        bootloader: "pxelinux".to_string(),
        content: format!("DEFAULT {name}\n"),
    }
}

/// Catalog with the pxelinux bootloader and one configuration per name.
pub fn create_test_catalog(names: &[&str]) -> Catalog {
    Catalog::new(vec![pxelinux()], names.iter().map(|n| configuration(n)).collect()).unwrap()
}

/// An orchestrator over an empty registry, with mock drivers kept at hand.
pub struct TestBed {
    pub orchestrator: Orchestrator,
    pub registry: Arc<Registry>,
    pub catalog: Arc<CatalogHandle>,
    pub vendor: MockPowerDriver,
    pub agent: MockPowerDriver,
}

impl TestBed {
    pub fn new(catalog: Catalog) -> Self {
        Self::with_boot_files(catalog, Arc::new(NoBootFiles))
    }

    pub fn with_boot_files(catalog: Catalog, boot_files: Arc<dyn BootFiles>) -> Self {
        Self::build(catalog, boot_files, 32)
    }

    /// Same as [`TestBed::new`] with a custom backend call limit.
    pub fn with_max_concurrency(catalog: Catalog, max_concurrency: usize) -> Self {
        Self::build(catalog, Arc::new(NoBootFiles), max_concurrency)
    }

    fn build(catalog: Catalog, boot_files: Arc<dyn BootFiles>, max_concurrency: usize) -> Self {
        let registry = Arc::new(Registry::new());
        let catalog = Arc::new(CatalogHandle::new(catalog));
        let vendor = MockPowerDriver::new();
        let agent = MockPowerDriver::new();
        let power = PowerAdapter::new(Arc::new(vendor.clone()), Arc::new(agent.clone()))
            .with_timeout(Duration::from_millis(500));
        let orchestrator = Orchestrator::new(
            Arc::clone(&registry),
            Arc::clone(&catalog),
            power,
            boot_files,
            max_concurrency,
        );
        Self {
            orchestrator,
            registry,
            catalog,
            vendor,
            agent,
        }
    }

    /// A refresh engine sharing the orchestrator's registry and backend
    /// call limit.
    pub fn refresh_engine(&self) -> RefreshEngine {
        RefreshEngine::new(
            Arc::clone(&self.registry),
            self.orchestrator.power().clone(),
            Arc::clone(self.orchestrator.permits()),
        )
    }

    /// Registers a host with a single MAC.
    pub async fn add_host(&self, name: &str, mac_address: &str, management: ManagementEndpoint) {
        self.registry
            .upsert(name, identity(name, &[mac_address]), management)
            .await
            .unwrap();
    }
}
