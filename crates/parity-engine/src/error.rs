//! Error types for parity-engine

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal validation errors
///
/// Only configuration, domain, and reference-side problems are fatal;
/// candidate failures degrade the verdict instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generator error (includes `InvalidDomain`)
    #[error(transparent)]
    Generator(#[from] parity_gen::Error),

    /// Execution error (includes `ReferenceUnavailable` and `RunTimedOut`)
    #[error(transparent)]
    Runner(#[from] parity_runner::Error),

    /// Report rendering error
    #[error(transparent)]
    Report(#[from] parity_report::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Stable name of the error kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::Generator(parity_gen::Error::InvalidDomain(_)) => "InvalidDomain",
            Self::Generator(_) => "Generator",
            Self::Runner(parity_runner::Error::ReferenceUnavailable { .. }) => {
                "ReferenceUnavailable"
            }
            Self::Runner(parity_runner::Error::RunTimedOut { .. }) => "RunTimedOut",
            Self::Runner(parity_runner::Error::Cancelled { .. }) => "Cancelled",
            Self::Runner(_) => "Runner",
            Self::Report(_) => "Report",
            Self::IoError(_) => "Io",
        }
    }

    /// Whether the reference artifact caused the failure
    #[must_use]
    pub fn is_reference_failure(&self) -> bool {
        matches!(self, Self::Runner(err) if err.is_reference_failure())
    }
}
