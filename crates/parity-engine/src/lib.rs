//! Parity Validation Engine
//!
//! Proves, to a stated statistical confidence, that a candidate
//! implementation behaves like a reference implementation within tolerance.
//!
//! ```text
//! TestCaseGenerator → DualHarness × N (worker pool) → DeviationAnalyzer
//!                   → Certifier → VerdictReporter
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
// Allow common patterns
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::module_name_repetitions)]
// Allow common patterns in test code
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod config;
pub mod error;

pub use config::{MAX_SAMPLE_SIZE, ValidationConfig};
pub use error::{Error, Result};

use parity_gen::{InputDomain, TestCase, TestCaseGenerator};
use parity_report::{Certifier, ParityReport, VerdictReporter};
use parity_runner::{
    Artifact, CancellationToken, DeviationAnalyzer, DualHarness, ParallelExecutor,
};

/// Runs complete validations under one configuration
#[derive(Debug, Clone)]
pub struct ParityEngine {
    config: ValidationConfig,
    cancel: Option<CancellationToken>,
}

impl ParityEngine {
    /// Engine for a validated configuration
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `config` fails validation.
    pub fn new(config: ValidationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: None,
        })
    }

    /// Cancel runs through an external token
    ///
    /// Without one, each run gets a private token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Reporter configured with this engine's failure detail cap
    #[must_use]
    pub fn reporter(&self) -> VerdictReporter {
        VerdictReporter::new(self.config.max_failure_details)
    }

    /// Test cases a run over `domain` would execute
    ///
    /// # Errors
    ///
    /// Returns `InvalidDomain` if the domain cannot be sampled.
    pub fn test_cases(&self, domain: &InputDomain) -> Result<Vec<TestCase>> {
        let generator =
            TestCaseGenerator::new(domain.clone(), self.config.sample_size, self.config.seed)?;
        Ok(generator.iter().collect())
    }

    /// Validate `candidate` against `reference` over `domain`
    ///
    /// # Errors
    ///
    /// - `InvalidDomain` before anything executes
    /// - `ReferenceUnavailable` if the reference fails on any case
    /// - `RunTimedOut` if the overall deadline expires
    ///
    /// Candidate failures are not errors; they appear in the report.
    pub fn validate(
        &self,
        reference: &dyn Artifact,
        candidate: &dyn Artifact,
        domain: &InputDomain,
    ) -> Result<ParityReport> {
        let kind = self.config.output_kind;
        let cases = self.test_cases(domain)?;
        if cases.is_empty() {
            log::info!("empty sample for '{}': verdict INCONCLUSIVE", candidate.name());
            return Ok(ParityReport::inconclusive(kind));
        }

        let profile = self.config.profile();
        let analyzer = DeviationAnalyzer::new(kind, &profile, self.config.extractor()?);
        let harness = DualHarness::new(reference, candidate);
        let executor = ParallelExecutor::new(self.config.parallel())
            .with_cancellation(self.cancel.clone().unwrap_or_default());

        log::info!(
            "validating '{}' against '{}': {} {} cases, seed {}",
            candidate.name(),
            reference.name(),
            cases.len(),
            kind,
            self.config.seed
        );

        let result = executor.execute(&harness, &analyzer, &cases).inspect_err(|e| {
            log::warn!("validation of '{}' aborted: {e}", candidate.name());
        })?;
        debug_assert_eq!(result.records.len(), cases.len());

        let report = Certifier::from_profile(&profile).certify(kind, &result.records);
        log::info!(
            "'{}': {} ({} / {} failures, max deviation {:e}, {}ms)",
            candidate.name(),
            report.status,
            report.failures,
            report.test_cases,
            report.max_deviation,
            result.duration_ms
        );
        Ok(report)
    }
}
