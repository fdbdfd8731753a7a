//! PXE Pilot server
//!
//! Tracks the machines of a network-booted fleet, assigns them boot
//! configurations and drives their power through IPMI or a management
//! agent.
//!
//! - [`Registry`]: hosts keyed by MAC identity, one lock per host
//! - [`Catalog`]: bootloaders and configurations, swapped atomically on reload
//! - [`Orchestrator`]: batch deployments and single-host power operations
//! - [`RefreshEngine`]: cached power state refresh
//! - [`PxeServer`]: wiring and the HTTP API
//!
//! Boot files are written into the TFTP root; DHCP and TFTP themselves are
//! served by external daemons.

pub mod api;
pub mod catalog;
pub mod config;
pub mod deploy;
#[cfg(test)]
mod deploy_test;
pub mod error;
pub mod refresh;
pub mod registry;
pub mod server;
#[cfg(test)]
mod test_utils;
pub mod tftp;

pub use catalog::{Catalog, CatalogHandle};
pub use config::AppConfig;
pub use deploy::Orchestrator;
pub use error::*;
pub use refresh::{RefreshEngine, RefreshReport};
pub use registry::{HostGuard, Registry, Upsert};
pub use server::{PxeServer, ReloadSummary};
pub use tftp::{BootFiles, NoBootFiles, TftpBootFiles};
