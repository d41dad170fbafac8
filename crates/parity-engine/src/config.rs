//! Validation run configuration
//!
//! Every key is optional; missing keys take their defaults. Loadable from
//! YAML or JSON.

use crate::error::{Error, Result};
use parity_gen::profile::{
    DEFAULT_MAX_ALLOWED_DEVIATION, DEFAULT_MIN_CONFIDENCE, DEFAULT_TIMEOUT_MS,
};
use parity_gen::{
    ComparisonRule, DEFAULT_SAMPLE_SIZE, DEFAULT_SEED, FUZZ_SAMPLE_SIZE, OutputKind,
    ToleranceProfile,
};
use parity_report::reporter::DEFAULT_MAX_FAILURE_DETAILS;
use parity_runner::{OutputExtractor, ParallelConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Largest accepted sample size
pub const MAX_SAMPLE_SIZE: usize = 1_000_000;

/// Options for one validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Number of test cases
    pub sample_size: usize,
    /// Generator seed
    pub seed: u64,
    /// Per-invocation timeout in milliseconds
    pub timeout_ms: u64,
    /// Overall validation deadline in milliseconds
    pub run_timeout_ms: Option<u64>,
    /// Verdict cap on the maximum deviation
    pub max_allowed_deviation: f64,
    /// Verdict floor on confidence (fraction)
    pub min_confidence: f64,
    /// Worker pool size
    pub workers: usize,
    /// Comparison strategy
    pub output_kind: OutputKind,
    /// Regex whose first capture group extracts the value from stdout
    pub output_pattern: Option<String>,
    /// Per-kind epsilon overrides
    pub tolerances: BTreeMap<OutputKind, ComparisonRule>,
    /// Reporter cap on failure detail entries
    pub max_failure_details: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            seed: DEFAULT_SEED,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            run_timeout_ms: None,
            max_allowed_deviation: DEFAULT_MAX_ALLOWED_DEVIATION,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            workers: num_cpus::get(),
            output_kind: OutputKind::FloatRelative,
            output_pattern: None,
            tolerances: BTreeMap::new(),
            max_failure_details: DEFAULT_MAX_FAILURE_DETAILS,
        }
    }
}

impl ValidationConfig {
    /// Fuzz preset: defaults with a 10,000 case sample
    #[must_use]
    pub fn fuzz() -> Self {
        Self {
            sample_size: FUZZ_SAMPLE_SIZE,
            ..Self::default()
        }
    }

    /// Parse YAML configuration text
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the text is malformed or fails validation.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| Error::InvalidConfig(format!("malformed YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse JSON configuration text
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the text is malformed or fails validation.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| Error::InvalidConfig(format!("malformed JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, otherwise as the
    /// string parsers.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    /// Check every option is usable
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first offending option.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(invalid(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        if !is_non_negative(self.max_allowed_deviation) {
            return Err(invalid(format!(
                "max_allowed_deviation must be a non-negative number, got {}",
                self.max_allowed_deviation
            )));
        }
        if self.timeout_ms == 0 {
            return Err(invalid("timeout_ms must be positive"));
        }
        if self.run_timeout_ms == Some(0) {
            return Err(invalid("run_timeout_ms must be positive"));
        }
        if self.workers == 0 {
            return Err(invalid("workers must be at least 1"));
        }
        if self.sample_size > MAX_SAMPLE_SIZE {
            return Err(invalid(format!(
                "sample_size must be at most {MAX_SAMPLE_SIZE}, got {}",
                self.sample_size
            )));
        }
        for (kind, rule) in &self.tolerances {
            if !is_non_negative(rule.relative_epsilon) || !is_non_negative(rule.absolute_epsilon) {
                return Err(invalid(format!(
                    "tolerances for {kind} must be non-negative numbers"
                )));
            }
        }
        self.extractor()?;
        Ok(())
    }

    /// Tolerance profile for this run
    #[must_use]
    pub fn profile(&self) -> ToleranceProfile {
        self.tolerances.iter().fold(
            ToleranceProfile::default()
                .with_max_allowed_deviation(self.max_allowed_deviation)
                .with_min_confidence(self.min_confidence)
                .with_timeout_ms(self.timeout_ms),
            |profile, (kind, rule)| profile.with_rule(*kind, *rule),
        )
    }

    /// Output extractor for `output_pattern`
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the pattern does not compile or has no
    /// capture group.
    pub fn extractor(&self) -> Result<OutputExtractor> {
        OutputExtractor::from_option(self.output_pattern.as_deref())
            .map_err(|e| invalid(format!("output_pattern: {e}")))
    }

    /// Worker pool settings
    #[must_use]
    pub fn parallel(&self) -> ParallelConfig {
        ParallelConfig::default()
            .with_workers(self.workers)
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_run_timeout_ms(self.run_timeout_ms)
    }

    /// Set the sample size
    #[must_use]
    pub const fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Set the generator seed
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the output kind
    #[must_use]
    pub const fn with_output_kind(mut self, output_kind: OutputKind) -> Self {
        self.output_kind = output_kind;
        self
    }

    /// Set the output extraction pattern
    #[must_use]
    pub fn with_output_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.output_pattern = Some(pattern.into());
        self
    }

    /// Set the confidence floor
    #[must_use]
    pub const fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Set the maximum allowed deviation
    #[must_use]
    pub const fn with_max_allowed_deviation(mut self, deviation: f64) -> Self {
        self.max_allowed_deviation = deviation;
        self
    }

    /// Set the per-invocation timeout
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the overall deadline
    #[must_use]
    pub const fn with_run_timeout_ms(mut self, run_timeout_ms: u64) -> Self {
        self.run_timeout_ms = Some(run_timeout_ms);
        self
    }

    /// Set the worker count
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Override the rule for one output kind
    #[must_use]
    pub fn with_tolerance(mut self, kind: OutputKind, rule: ComparisonRule) -> Self {
        self.tolerances.insert(kind, rule);
        self
    }

    /// Set the reporter cap on failure details
    #[must_use]
    pub const fn with_max_failure_details(mut self, max: usize) -> Self {
        self.max_failure_details = max;
        self
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidConfig(message.into())
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}
