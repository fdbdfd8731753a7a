//! IPMI driver
//!
//! Controls vendor BMCs by running `ipmitool chassis power ...`. The IPMI wire
//! protocol itself is left to ipmitool.

use crate::driver::{PowerAction, PowerDriver, misrouted};
use crate::error::PowerError;
use models::{ManagementEndpoint, PowerState};
use std::process::Stdio;
use tracing::debug;

/// Interface passed to `ipmitool -I` when the endpoint does not name one.
const DEFAULT_INTERFACE: &str = "lanplus";

/// Drives `VendorRemote` endpoints through ipmitool.
#[derive(Debug, Clone)]
pub struct IpmiToolDriver {
    program: String,
}

impl Default for IpmiToolDriver {
    fn default() -> Self {
        Self::new("ipmitool")
    }
}

impl IpmiToolDriver {
    /// Creates a driver running the given ipmitool executable.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Builds the ipmitool argument list for a `chassis power` sub-command.
    fn arguments(endpoint: &ManagementEndpoint, command: &str) -> Result<Vec<String>, PowerError> {
        let ManagementEndpoint::VendorRemote {
            address,
            username,
            password,
            interface,
            ..
        } = endpoint
        else {
            return Err(misrouted("ipmitool", endpoint));
        };

        let mut args = vec![
            "-I".to_string(),
            interface.as_deref().unwrap_or(DEFAULT_INTERFACE).to_string(),
            "-H".to_string(),
            address.clone(),
        ];
        if let Some(username) = username {
            args.extend(["-U".to_string(), username.clone()]);
        }
        if let Some(password) = password {
            args.extend(["-P".to_string(), password.clone()]);
        }
        args.extend(["chassis".to_string(), "power".to_string(), command.to_string()]);
        Ok(args)
    }

    /// Runs ipmitool and returns its stdout.
    ///
    /// The child is killed if the returned future is dropped, so an outer
    /// timeout never leaves ipmitool processes behind.
    async fn run(&self, endpoint: &ManagementEndpoint, command: &str) -> Result<String, PowerError> {
        let args = Self::arguments(endpoint, command)?;

        debug!(
            bmc_address = endpoint.address().unwrap_or_default(),
            command = %command,
            "Executing IPMI command"
        );

        let output = tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PowerError::Refused(format!("Failed to execute {}: {e}", self.program)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(PowerError::Refused(format!(
                "IPMI command failed: {}",
                stderr.trim()
            )))
        }
    }
}

/// Parses `ipmitool chassis power status` output.
pub(crate) fn parse_power_status(stdout: &str) -> Result<PowerState, PowerError> {
    let normalized = stdout.trim().to_ascii_lowercase();
    match normalized.strip_prefix("chassis power is ") {
        Some("on") => Ok(PowerState::On),
        Some("off") => Ok(PowerState::Off),
        _ => Err(PowerError::Protocol(format!(
            "Unexpected ipmitool output: {:?}",
            stdout.trim()
        ))),
    }
}

#[async_trait::async_trait]
impl PowerDriver for IpmiToolDriver {
    async fn status(&self, endpoint: &ManagementEndpoint) -> Result<PowerState, PowerError> {
        let stdout = self.run(endpoint, "status").await?;
        parse_power_status(&stdout)
    }

    async fn execute(
        &self,
        endpoint: &ManagementEndpoint,
        action: PowerAction,
    ) -> Result<(), PowerError> {
        self.run(endpoint, action.as_str()).await?;
        Ok(())
    }
}
