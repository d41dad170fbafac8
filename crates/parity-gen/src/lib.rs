//! Parity Test Case Generator
//!
//! Reproducible input generation for reference/candidate parity validation.
//! A run is a finite sample: a deterministic prefix of boundary values
//! followed by seeded pseudo-random draws from the declared input domain.
//!
//! Also home to the tolerance profile, the read-only comparison rules shared
//! by every stage of a validation run.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
// Allow common patterns
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
// Allow common patterns in test code
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::redundant_closure_for_method_calls))]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod domain;
pub mod error;
pub mod generator;
pub mod profile;
pub mod proptest_impl;

pub use domain::{
    InputDomain, InputVector, MAX_COLLECTION_LEN, ParamType, ParameterSpec, Value,
};
pub use error::{Error, Result};
pub use generator::{
    CaseTag, DEFAULT_SAMPLE_SIZE, DEFAULT_SEED, FUZZ_SAMPLE_SIZE, TestCase, TestCaseGenerator,
    TestCases,
};
pub use profile::{ComparisonRule, OutputKind, ToleranceProfile};
