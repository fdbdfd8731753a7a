//! Model validation errors

use thiserror::Error;

/// Errors raised while building model values from untrusted input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// The MAC address is empty or contains a segment that is not a hex octet
    #[error("Invalid MAC address: {0:?}")]
    InvalidMac(String),

    /// A host identity needs at least one MAC address
    #[error("Host {0:?} has no MAC address")]
    EmptyIdentity(String),

    /// The same MAC address appears twice in one identity
    #[error("Duplicate MAC address {mac} for host {host:?}")]
    DuplicateMac { host: String, mac: String },
}
