//! Parity Runner
//!
//! Dual execution harness and deviation analysis for parity validation.
//! Runs the reference and candidate artifacts on every test case in
//! isolation, under per-invocation timeouts, across a bounded worker pool,
//! and reduces each pair of results to a deviation record.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
// Allow common patterns
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::module_name_repetitions)]
// Allow common patterns in test code
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::float_cmp))]
#![cfg_attr(test, allow(clippy::uninlined_format_args))]

pub mod analyzer;
pub mod artifact;
pub mod cancel;
pub mod error;
pub mod harness;
pub mod parallel;
pub mod process;

pub use analyzer::{
    DeviationAnalyzer, DeviationRecord, FailureReason, OutputDetail, OutputExtractor,
};
pub use artifact::{Artifact, ExecutionResult, ExecutionStatus, FnArtifact, InvocationContext};
pub use cancel::{CancellationToken, RunDeadline};
pub use error::{Error, Result};
pub use harness::{DualHarness, ExecutionPair};
pub use parallel::{ParallelConfig, ParallelExecutor, ParallelResult};
pub use process::{InputMode, ProcessArtifact, ProcessGuard};
