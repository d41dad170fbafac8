//! Parity Validation
//!
//! Statistical parity validation between a reference implementation and a
//! candidate implementation of the same function.
//!
//! - [`generator`]: input domains, reproducible test cases, tolerance profiles
//! - [`runner`]: isolated dual execution and deviation analysis
//! - [`report`]: certification statistics and verdict reports
//! - [`engine`]: configuration and end-to-end orchestration

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use parity_engine as engine;
pub use parity_gen as generator;
pub use parity_report as report;
pub use parity_runner as runner;

pub use parity_engine::{Error, ParityEngine, Result, ValidationConfig};
pub use parity_gen::{InputDomain, OutputKind, ParamType, ToleranceProfile};
pub use parity_report::{DistributionVerdict, ParityReport, ReportFormat, Verdict, VerdictReporter};
pub use parity_runner::{Artifact, FnArtifact, InputMode, ProcessArtifact};
