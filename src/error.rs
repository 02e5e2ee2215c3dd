//! Error types for postage-gate.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the gateway and its collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O failure (config files, listener bind).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller-supplied value could not be parsed (address, batch id).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Signature was malformed or recovery failed.
    #[error("Signature error: {0}")]
    Signature(String),

    /// The batch registry could not be read (RPC, network or contract failure).
    #[error("Registry error: {0}")]
    Registry(String),

    /// Forwarding to the upstream storage node failed.
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// HTTP server failure.
    #[error("Server error: {0}")]
    Server(String),
}

impl Error {
    /// Returns true if this error means the verifier infrastructure is
    /// unavailable, as opposed to the caller sending bad input.
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Registry(_))
    }
}
