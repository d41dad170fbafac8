//! Error types for parity-gen

use thiserror::Error;

/// Result type alias for parity-gen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while describing or sampling an input domain
#[derive(Debug, Error)]
pub enum Error {
    /// The input domain cannot be sampled (empty range, bad type, ...)
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    /// Unknown output kind tag
    #[error("Unknown output kind: {0}")]
    UnknownOutputKind(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Build an `InvalidDomain` error from a YAML parse failure
    pub(crate) fn from_yaml(err: &serde_yaml::Error) -> Self {
        Self::InvalidDomain(format!("malformed domain description: {err}"))
    }
}
