//! Parity Report
//!
//! Reduces a run's deviation records to a certification verdict and renders
//! it. The reduction is pure: records are ordered by test case index first,
//! so the same records always produce the same report.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
// Allow common patterns
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::format_push_string)]
#![allow(clippy::needless_raw_string_hashes)]
#![allow(clippy::suboptimal_flops)]
#![allow(clippy::uninlined_format_args)]
// Allow common patterns in test code
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod certifier;
pub mod error;
pub mod reporter;
pub mod stats;

pub use certifier::{
    CertificationPolicy, Certifier, DistributionVerdict, FailureDetail, ParityReport, Verdict,
};
pub use error::{Error, Result};
pub use reporter::{ReportDocument, ReportFormat, VerdictReporter};
pub use stats::{KsResult, confidence_score, ks_two_sample, wilson_lower_bound};
