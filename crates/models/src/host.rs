//! Host records
//!
//! A host is identified by its MAC addresses and addressed by a mutable,
//! human-assigned name. Its out-of-band management channel is a sum type so
//! that at most one backend can ever be configured for a host.

use crate::error::ModelError;
use crate::mac::MacAddress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Last observed power state of a host.
///
/// This is cached telemetry, never authoritative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    /// Host reported as running
    On,
    /// Host reported as stopped
    Off,
    /// Never observed, or the backend could not tell
    #[default]
    Unknown,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Out-of-band channel used to control a host's power.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ManagementEndpoint {
    /// Vendor remote-management controller (IPMI BMC)
    #[serde(rename_all = "camelCase")]
    VendorRemote {
        /// MAC address of the BMC interface
        mac_address: MacAddress,
        /// BMC hostname or IP address
        address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing)]
        password: Option<String>,
        /// ipmitool interface (`lanplus` when unset)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interface: Option<String>,
    },

    /// Generic management agent reachable over HTTP
    #[serde(rename_all = "camelCase")]
    GenericAgent {
        /// MAC address the agent answers on
        mac_address: MacAddress,
        /// Agent address, `host` or `host:port`
        address: String,
    },

    /// No management channel; power operations cannot be attempted
    #[default]
    None,
}

impl ManagementEndpoint {
    /// Whether power operations can be attempted at all.
    pub fn is_managed(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// The management address, if any.
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::VendorRemote { address, .. } | Self::GenericAgent { address, .. } => {
                Some(address)
            }
            Self::None => None,
        }
    }

    /// Short backend label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VendorRemote { .. } => "ipmi",
            Self::GenericAgent { .. } => "agent",
            Self::None => "none",
        }
    }
}

/// Stable identity of a physical machine: its ordered, duplicate-free MAC set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct HostIdentity(Vec<MacAddress>);

impl HostIdentity {
    /// Builds an identity, rejecting empty or duplicated MAC sets.
    ///
    /// `host` only labels the error.
    pub fn new(host: &str, macs: Vec<MacAddress>) -> Result<Self, ModelError> {
        if macs.is_empty() {
            return Err(ModelError::EmptyIdentity(host.to_string()));
        }
        for (i, mac) in macs.iter().enumerate() {
            if macs[..i].contains(mac) {
                return Err(ModelError::DuplicateMac {
                    host: host.to_string(),
                    mac: mac.to_string(),
                });
            }
        }
        Ok(Self(macs))
    }

    /// The MAC addresses, in declaration order.
    pub fn macs(&self) -> &[MacAddress] {
        &self.0
    }

    /// Whether any address is shared with `other`.
    pub fn overlaps(&self, other: &HostIdentity) -> bool {
        self.0.iter().any(|mac| other.0.contains(mac))
    }
}

/// A host known to the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    /// Human-assigned, unique name
    pub name: String,

    /// MAC addresses identifying the machine
    pub mac_addresses: HostIdentity,

    /// Name of the assigned configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,

    /// Power management channel
    #[serde(default)]
    pub management: ManagementEndpoint,

    /// Cached power state
    #[serde(default)]
    pub power_state: PowerState,

    /// When `power_state` was last observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_state_observed_at: Option<DateTime<Utc>>,
}

impl Host {
    /// A new host with no configuration and an unknown power state.
    pub fn new(name: impl Into<String>, identity: HostIdentity, management: ManagementEndpoint) -> Self {
        Self {
            name: name.into(),
            mac_addresses: identity,
            configuration: None,
            management,
            power_state: PowerState::Unknown,
            power_state_observed_at: None,
        }
    }
}
