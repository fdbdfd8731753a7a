//! Power adapter
//!
//! Routes abstract power operations to the driver matching a host's
//! management endpoint and bounds each backend call with its own timeout.

use crate::agent::AgentDriver;
use crate::driver::{PowerAction, PowerDriver};
use crate::error::PowerError;
use crate::ipmi::IpmiToolDriver;
use models::{Host, ManagementEndpoint, PowerState};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Per-call timeout applied to every backend call.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Power operations over heterogeneous management backends.
#[derive(Clone)]
pub struct PowerAdapter {
    vendor: Arc<dyn PowerDriver>,
    agent: Arc<dyn PowerDriver>,
    timeout: Duration,
}

impl PowerAdapter {
    /// Creates an adapter from one driver per endpoint variant.
    pub fn new(vendor: Arc<dyn PowerDriver>, agent: Arc<dyn PowerDriver>) -> Self {
        Self {
            vendor,
            agent,
            timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }

    /// ipmitool for BMCs and the HTTP agent driver. `timeout` bounds every
    /// call and is also the agent's dial and request timeout.
    pub fn with_default_drivers(timeout: Duration) -> Result<Self, PowerError> {
        let adapter = Self::new(
            Arc::new(IpmiToolDriver::default()),
            Arc::new(AgentDriver::with_timeout(timeout)?),
        );
        Ok(adapter.with_timeout(timeout))
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn driver_for(&self, endpoint: &ManagementEndpoint) -> Result<&dyn PowerDriver, PowerError> {
        match endpoint {
            ManagementEndpoint::VendorRemote { .. } => Ok(self.vendor.as_ref()),
            ManagementEndpoint::GenericAgent { .. } => Ok(self.agent.as_ref()),
            ManagementEndpoint::None => Err(PowerError::NoManagementEndpoint),
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, PowerError>>,
    ) -> Result<T, PowerError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_elapsed| PowerError::Timeout(self.timeout))?
    }

    /// Query the live power state.
    pub async fn query_state(&self, host: &Host) -> Result<PowerState, PowerError> {
        let driver = self.driver_for(&host.management)?;
        let state = self.bounded(driver.status(&host.management)).await?;
        debug!(host = %host.name, backend = host.management.kind(), state = %state, "Queried power state");
        Ok(state)
    }

    async fn act(&self, host: &Host, action: PowerAction) -> Result<(), PowerError> {
        let driver = self.driver_for(&host.management)?;
        self.bounded(driver.execute(&host.management, action)).await?;
        info!(host = %host.name, backend = host.management.kind(), action = %action, "Power action sent");
        Ok(())
    }

    /// Power the host on.
    pub async fn power_on(&self, host: &Host) -> Result<(), PowerError> {
        self.act(host, PowerAction::On).await
    }

    /// Power the host off.
    pub async fn power_off(&self, host: &Host) -> Result<(), PowerError> {
        self.act(host, PowerAction::Off).await
    }

    /// (Re)boot the host: power-cycle it if it is on, power it on otherwise.
    ///
    /// The decision uses the live state, not the cached one. `Unknown` is
    /// treated like `Off`. Each of the two backend calls gets its own timeout.
    pub async fn reboot(&self, host: &Host) -> Result<(), PowerError> {
        let action = match self.query_state(host).await? {
            PowerState::On => PowerAction::Cycle,
            PowerState::Off | PowerState::Unknown => PowerAction::On,
        };
        self.act(host, action).await
    }
}
