//! Error types for parity-runner

use crate::artifact::ExecutionStatus;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors that abort a validation run
///
/// Candidate-side failures are never errors; they become forced-failure
/// deviation records.
#[derive(Debug, Error)]
pub enum Error {
    /// The reference crashed, timed out, or produced unusable output
    #[error("Reference unavailable at test case {index}: {status} ({detail})")]
    ReferenceUnavailable {
        /// Test case index that broke the reference
        index: usize,
        /// Reference execution status
        status: ExecutionStatus,
        /// Stderr excerpt or parse failure description
        detail: String,
    },

    /// The overall validation deadline expired
    #[error("Run timed out after {timeout_ms}ms ({completed}/{total} test cases completed)")]
    RunTimedOut {
        /// Overall deadline in milliseconds
        timeout_ms: u64,
        /// Test cases completed before the deadline
        completed: usize,
        /// Test cases in the run
        total: usize,
    },

    /// The run was cancelled by its caller
    #[error("Run cancelled ({completed}/{total} test cases completed)")]
    Cancelled {
        /// Test cases completed before cancellation
        completed: usize,
        /// Test cases in the run
        total: usize,
    },

    /// Output extraction pattern is unusable
    #[error("Invalid output pattern: {0}")]
    InvalidPattern(String),

    /// Worker pool could not be built
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

impl Error {
    /// Whether the error was caused by the reference artifact
    #[must_use]
    pub const fn is_reference_failure(&self) -> bool {
        matches!(self, Self::ReferenceUnavailable { .. })
    }
}
