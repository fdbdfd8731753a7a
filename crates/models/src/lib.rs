//! PXE Pilot data model
//!
//! Types shared by the power client, the server and the daemon:
//! - `MacAddress`: normalised hardware address, the unit of host identity
//! - `Host` and `ManagementEndpoint`: registry records and their out-of-band channel
//! - `Bootloader` and `Configuration`: the boot catalog
//! - `DeploymentRequest` and `DeploymentResult`: one orchestration call

pub mod configuration;
pub mod deployment;
pub mod error;
pub mod host;
pub mod mac;

pub use configuration::*;
pub use deployment::*;
pub use error::*;
pub use host::*;
pub use mac::*;
