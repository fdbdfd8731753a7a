//! PowerDriver trait
//!
//! One implementation per management backend. Drivers perform a single raw
//! action per call; reboot semantics and timeouts live in `PowerAdapter`.

use crate::error::PowerError;
use models::{ManagementEndpoint, PowerState};
use std::fmt;

/// Raw power action understood by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerAction {
    /// Power the host on
    On,
    /// Power the host off (hard)
    Off,
    /// Power-cycle a running host
    Cycle,
}

impl PowerAction {
    /// Wire name used by both ipmitool and the agent API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Cycle => "cycle",
        }
    }

    /// Power state expected once the action succeeded.
    pub fn resulting_state(&self) -> PowerState {
        match self {
            Self::On | Self::Cycle => PowerState::On,
            Self::Off => PowerState::Off,
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend driver for power operations.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// A driver only receives endpoints of the variant it was registered for and
/// reports any other variant as a protocol error.
#[async_trait::async_trait]
pub trait PowerDriver: Send + Sync {
    /// Query the live power state.
    async fn status(&self, endpoint: &ManagementEndpoint) -> Result<PowerState, PowerError>;

    /// Perform a power action.
    async fn execute(
        &self,
        endpoint: &ManagementEndpoint,
        action: PowerAction,
    ) -> Result<(), PowerError>;
}

pub(crate) fn misrouted(driver: &str, endpoint: &ManagementEndpoint) -> PowerError {
    PowerError::Protocol(format!(
        "{driver} driver cannot drive a {} endpoint",
        endpoint.kind()
    ))
}
