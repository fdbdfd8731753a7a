//! Controller-specific error types.

use pxe_server::PxeError;
use thiserror::Error;

/// Errors that can occur in the PXE Pilot daemon.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Server setup, reload or serving failed
    #[error("PXE server error: {0}")]
    Server(#[from] PxeError),

    /// Signal handler registration failed
    #[error("Signal handler error: {0}")]
    Signal(#[from] std::io::Error),
}
