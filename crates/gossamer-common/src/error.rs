//! Common error types for Gossamer mesh components.

use thiserror::Error;

/// Common errors across mesh components
#[derive(Debug, Error)]
pub enum MeshError {
    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Socket or connection failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed payload on one of the wire protocols
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Delegation named a runtime this node does not carry
    #[error("Unknown runtime: {0}")]
    UnknownRuntime(String),

    /// Remote execution exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl MeshError {
    /// True for the deadline case; the router reports timeouts distinctly
    /// from other delegation failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
