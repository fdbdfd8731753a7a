//! PXE server errors

use models::{FailureReason, MacAddress, ModelError};
use power_client::PowerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PxeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Invalid host definition: {0}")]
    Model(#[from] ModelError),

    #[error("Power backend error: {0}")]
    Power(#[from] PowerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Inconsistencies in the boot catalog.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Duplicate bootloader: {0}")]
    DuplicateBootloader(String),

    #[error("Duplicate configuration: {0}")]
    DuplicateConfiguration(String),

    #[error("Configuration {configuration} references unknown bootloader {bootloader}")]
    UnknownBootloader {
        configuration: String,
        bootloader: String,
    },
}

/// Host registry failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Host not found: {0}")]
    NotFound(String),

    /// The MACs of one upsert belong to two different hosts
    #[error("MAC address {mac} already belongs to host {owner}")]
    MacConflict { mac: MacAddress, owner: String },

    /// The requested name belongs to a host with other MACs
    #[error("Host name {0} is already taken")]
    NameConflict(String),
}

/// Batch-fatal deployment errors. Per-host failures are outcomes, not errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeployError {
    #[error("Configuration not found: {0}")]
    ConfigurationNotFound(String),

    /// The catalog lost track of a configuration's bootloader
    #[error("Bootloader {bootloader} of configuration {configuration} is missing")]
    BootloaderMissing {
        configuration: String,
        bootloader: String,
    },
}

/// Failure of a single-host power operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostPowerError {
    #[error("Host not found: {0}")]
    HostUnknown(String),

    #[error(transparent)]
    Power(#[from] PowerError),
}

impl HostPowerError {
    /// Reason code, shared with deployment outcomes.
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::HostUnknown(_) => FailureReason::HostUnknown,
            Self::Power(error) => error.reason(),
        }
    }
}

/// Boot file write or removal failure.
#[derive(Debug, Error)]
#[error("Boot file {path}: {source}")]
pub struct BootFileError {
    pub path: String,
    #[source]
    pub source: std::io::Error,
}
