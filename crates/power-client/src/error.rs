//! Power client errors

use models::FailureReason;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when driving a host's power.
///
/// None of these are retried by the client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PowerError {
    /// The host has no management endpoint; nothing was attempted
    #[error("No management endpoint configured")]
    NoManagementEndpoint,

    /// The backend did not answer within the call timeout
    #[error("Backend timed out after {0:?}")]
    Timeout(Duration),

    /// Connection or authentication failure
    #[error("Backend refused: {0}")]
    Refused(String),

    /// The backend answered with something we could not interpret
    #[error("Backend protocol error: {0}")]
    Protocol(String),
}

impl PowerError {
    /// Reason code reported in deployment results.
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::NoManagementEndpoint => FailureReason::NoManagementEndpoint,
            Self::Timeout(_) => FailureReason::BackendTimeout,
            Self::Refused(_) => FailureReason::BackendRefused,
            Self::Protocol(_) => FailureReason::BackendProtocolError,
        }
    }
}
