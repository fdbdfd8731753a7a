//! Management agent driver
//!
//! Talks to a generic management agent over HTTP:
//! - `GET  /v1/power`          returns `{"state": "on" | "off" | "unknown"}`
//! - `PUT  /v1/power/{action}` with action `on`, `off` or `cycle`

use crate::driver::{PowerAction, PowerDriver, misrouted};
use crate::error::PowerError;
use models::{ManagementEndpoint, PowerState};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::debug;

/// Port used when the endpoint address does not carry one.
pub const DEFAULT_AGENT_PORT: u16 = 3479;

/// Dial and request timeout for agent calls.
const AGENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Body of `GET /v1/power`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPowerStatus {
    pub state: PowerState,
}

/// Drives `GenericAgent` endpoints over HTTP.
#[derive(Debug, Clone)]
pub struct AgentDriver {
    client: Client,
    timeout: Duration,
}

impl AgentDriver {
    /// Create a new agent driver with the default 5 second timeouts.
    pub fn new() -> Result<Self, PowerError> {
        Self::with_timeout(AGENT_TIMEOUT)
    }

    /// Create a new agent driver with custom dial and request timeouts.
    pub fn with_timeout(timeout: Duration) -> Result<Self, PowerError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| PowerError::Refused(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    /// Base URL of the agent behind an endpoint address.
    ///
    /// Accepts full URLs, `host`, `host:port`, bare IPv4/IPv6 addresses and
    /// socket addresses; the default port is appended when none is given.
    pub fn base_url(address: &str) -> String {
        let address = address.trim().trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            return address.to_string();
        }
        if address.parse::<SocketAddr>().is_ok() {
            return format!("http://{address}");
        }
        if let Ok(ip) = address.parse::<IpAddr>() {
            return format!("http://{}", SocketAddr::new(ip, DEFAULT_AGENT_PORT));
        }
        match address.rsplit_once(':') {
            Some((_, port)) if port.parse::<u16>().is_ok() => format!("http://{address}"),
            _ => format!("http://{address}:{DEFAULT_AGENT_PORT}"),
        }
    }

    fn endpoint_url(endpoint: &ManagementEndpoint, path: &str) -> Result<String, PowerError> {
        let ManagementEndpoint::GenericAgent { address, .. } = endpoint else {
            return Err(misrouted("agent", endpoint));
        };
        Ok(format!("{}{}", Self::base_url(address), path))
    }

    fn map_transport_error(&self, error: &reqwest::Error) -> PowerError {
        if error.is_timeout() {
            PowerError::Timeout(self.timeout)
        } else if error.is_decode() {
            PowerError::Protocol(format!("Failed to decode agent response: {error}"))
        } else {
            PowerError::Refused(error.to_string())
        }
    }

    fn check_status(status: StatusCode, body: &str) -> Result<(), PowerError> {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PowerError::Refused(format!("Agent rejected credentials: {status}")));
        }
        if !status.is_success() {
            return Err(PowerError::Protocol(format!(
                "Agent returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PowerDriver for AgentDriver {
    async fn status(&self, endpoint: &ManagementEndpoint) -> Result<PowerState, PowerError> {
        let url = Self::endpoint_url(endpoint, "/v1/power")?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_transport_error(&e))?;
        Self::check_status(status, &body)?;

        let parsed: AgentPowerStatus = serde_json::from_str(&body).map_err(|e| {
            PowerError::Protocol(format!(
                "error decoding agent response: {e} - Response (first 200 chars): {}",
                body.chars().take(200).collect::<String>()
            ))
        })?;
        Ok(parsed.state)
    }

    async fn execute(
        &self,
        endpoint: &ManagementEndpoint,
        action: PowerAction,
    ) -> Result<(), PowerError> {
        let url = Self::endpoint_url(endpoint, &format!("/v1/power/{action}"))?;
        debug!("PUT {}", url);

        let response = self
            .client
            .put(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_transport_error(&e))?;
        Self::check_status(status, &body)
    }
}
