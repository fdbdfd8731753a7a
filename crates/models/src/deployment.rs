//! Deployment requests and results
//!
//! A deployment assigns one configuration to a batch of hosts and optionally
//! reboots them. Results keep the request order and report each host's
//! outcome with a reason code that callers can match on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One host entry of a deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostRequest {
    /// Host name as known to the registry
    pub name: String,

    /// Reboot the host once its configuration is in place
    #[serde(default)]
    pub reboot: bool,
}

impl HostRequest {
    /// Creates a host entry.
    pub fn new(name: impl Into<String>, reboot: bool) -> Self {
        Self {
            name: name.into(),
            reboot,
        }
    }
}

/// A configuration to push to an ordered list of hosts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    /// Target configuration name
    pub configuration: String,

    /// Hosts, in the order results are reported
    pub hosts: Vec<HostRequest>,
}

/// Why a host entry failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// No host with that name is registered
    HostUnknown,
    /// The host has no management endpoint to reboot through
    NoManagementEndpoint,
    /// The management backend did not answer in time
    BackendTimeout,
    /// The management backend refused the connection or the credentials
    BackendRefused,
    /// The management backend answered with something unexpected
    BackendProtocolError,
    /// The host's boot file could not be written
    BootFile,
    /// The configuration was removed by a reload before it reached the host
    ConfigurationRemoved,
    /// The worker handling this host failed
    Internal,
}

impl FailureReason {
    /// Stable snake_case reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::HostUnknown => "host_unknown",
            Self::NoManagementEndpoint => "no_management_endpoint",
            Self::BackendTimeout => "backend_timeout",
            Self::BackendRefused => "backend_refused",
            Self::BackendProtocolError => "backend_protocol_error",
            Self::BootFile => "boot_file",
            Self::ConfigurationRemoved => "configuration_removed",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Final state of one host entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    /// Configuration assigned and reboot triggered
    Rebooted,
    /// Configuration assigned, no reboot requested
    ConfigApplied,
    /// The entry failed; see the reason
    Failed(FailureReason),
}

impl Outcome {
    /// The failure reason, if the entry failed.
    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            Self::Failed(reason) => Some(reason),
            Self::Rebooted | Self::ConfigApplied => None,
        }
    }
}

/// Outcome for one requested host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostOutcome {
    /// Host name as requested
    pub name: String,
    /// What happened to it
    pub outcome: Outcome,
}

/// Per-host outcomes of a deployment, in request order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    /// Configuration that was deployed
    pub configuration: String,
    /// One entry per requested host
    pub hosts: Vec<HostOutcome>,
}

impl DeploymentResult {
    /// Outcomes only, in request order.
    pub fn outcomes(&self) -> Vec<&Outcome> {
        self.hosts.iter().map(|h| &h.outcome).collect()
    }

    /// Whether every entry succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.hosts.iter().all(|h| h.outcome.failure().is_none())
    }
}
