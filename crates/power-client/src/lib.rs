//! Host Power Client
//!
//! Drives power operations against a host's management endpoint:
//! - **IPMI**: vendor BMCs, through the `ipmitool` binary
//! - **Agent**: a generic management agent speaking JSON over HTTP
//!
//! `PowerAdapter` picks the driver from the host's `ManagementEndpoint`,
//! bounds every backend call with a timeout and implements the operator
//! "(re)boot" semantics on top of the raw driver actions.
//!
//! # Example
//!
//! ```no_run
//! use power_client::{DEFAULT_BACKEND_TIMEOUT, PowerAdapter};
//! use models::{Host, HostIdentity, MacAddress, ManagementEndpoint};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let adapter = PowerAdapter::with_default_drivers(DEFAULT_BACKEND_TIMEOUT)?;
//! let mac = MacAddress::parse("aa:bb:cc:dd:ee:ff")?;
//! let host = Host::new(
//!     "node1",
//!     HostIdentity::new("node1", vec![mac.clone()])?,
//!     ManagementEndpoint::GenericAgent { mac_address: mac, address: "10.0.0.11".to_string() },
//! );
//! adapter.reboot(&host).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod agent;
pub mod driver;
pub mod error;
pub mod ipmi;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use adapter::{DEFAULT_BACKEND_TIMEOUT, PowerAdapter};
pub use agent::AgentDriver;
pub use driver::{PowerAction, PowerDriver};
pub use error::PowerError;
pub use ipmi::IpmiToolDriver;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockCall, MockPowerDriver};
