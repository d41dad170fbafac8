//! Tolerance profile
//!
//! Per-output-kind comparison rules plus the certification thresholds.
//! Built once per validation run and shared read-only by every worker.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Default relative epsilon for `float-relative` comparisons
pub const DEFAULT_RELATIVE_EPSILON: f64 = 1e-6;
/// Default absolute epsilon for `float-absolute` comparisons
pub const DEFAULT_ABSOLUTE_EPSILON: f64 = 1e-9;
/// Default cap on the maximum observed deviation
pub const DEFAULT_MAX_ALLOWED_DEVIATION: f64 = 1e-6;
/// Default confidence floor (fraction, 99.9%)
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.999;
/// Default per-invocation timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// How reference and candidate outputs are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    /// Byte-identical outputs (hashes, digests, serialized blobs)
    ExactHash,
    /// Numeric, compared by relative deviation
    FloatRelative,
    /// Numeric, compared by absolute deviation
    FloatAbsolute,
    /// Categorical labels, equality only
    Categorical,
    /// Free text, equality only
    String,
}

impl OutputKind {
    /// Get all output kinds
    #[must_use]
    pub const fn all() -> [Self; 5] {
        [
            Self::ExactHash,
            Self::FloatRelative,
            Self::FloatAbsolute,
            Self::Categorical,
            Self::String,
        ]
    }

    /// Tag used in configuration and reports
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::ExactHash => "exact-hash",
            Self::FloatRelative => "float-relative",
            Self::FloatAbsolute => "float-absolute",
            Self::Categorical => "categorical",
            Self::String => "string",
        }
    }

    /// Whether outputs of this kind are numbers
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::FloatRelative | Self::FloatAbsolute)
    }
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for OutputKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|kind| kind.tag() == s)
            .ok_or_else(|| Error::UnknownOutputKind(s.to_string()))
    }
}

/// Comparison parameters for one output kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonRule {
    /// Maximum relative deviation for a match
    pub relative_epsilon: f64,
    /// Maximum absolute deviation for a match
    pub absolute_epsilon: f64,
}

impl Default for ComparisonRule {
    fn default() -> Self {
        Self {
            relative_epsilon: DEFAULT_RELATIVE_EPSILON,
            absolute_epsilon: DEFAULT_ABSOLUTE_EPSILON,
        }
    }
}

impl ComparisonRule {
    /// Rule with explicit epsilons
    #[must_use]
    pub const fn new(relative_epsilon: f64, absolute_epsilon: f64) -> Self {
        Self {
            relative_epsilon,
            absolute_epsilon,
        }
    }

    /// Epsilon governing `kind` (0 for equality-only kinds)
    #[must_use]
    pub fn epsilon_for(&self, kind: OutputKind) -> f64 {
        match kind {
            OutputKind::FloatRelative => self.relative_epsilon,
            OutputKind::FloatAbsolute => self.absolute_epsilon,
            OutputKind::ExactHash | OutputKind::Categorical | OutputKind::String => 0.0,
        }
    }
}

/// Immutable per-run comparison and certification rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToleranceProfile {
    /// Rules keyed by output kind; missing kinds use [`ComparisonRule::default`]
    pub rules: BTreeMap<OutputKind, ComparisonRule>,
    /// Largest deviation a certified candidate may show
    pub max_allowed_deviation: f64,
    /// Confidence floor for certification (fraction in `[0, 1]`)
    pub min_confidence: f64,
    /// Per-invocation timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ToleranceProfile {
    fn default() -> Self {
        Self {
            rules: BTreeMap::new(),
            max_allowed_deviation: DEFAULT_MAX_ALLOWED_DEVIATION,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl ToleranceProfile {
    /// Override the rule for one output kind
    #[must_use]
    pub fn with_rule(mut self, kind: OutputKind, rule: ComparisonRule) -> Self {
        self.rules.insert(kind, rule);
        self
    }

    /// Set the maximum allowed deviation
    #[must_use]
    pub const fn with_max_allowed_deviation(mut self, deviation: f64) -> Self {
        self.max_allowed_deviation = deviation;
        self
    }

    /// Set the confidence floor
    #[must_use]
    pub const fn with_min_confidence(mut self, confidence: f64) -> Self {
        self.min_confidence = confidence;
        self
    }

    /// Set the per-invocation timeout
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Rule for `kind`
    #[must_use]
    pub fn rule(&self, kind: OutputKind) -> ComparisonRule {
        self.rules.get(&kind).copied().unwrap_or_default()
    }

    /// Epsilon governing `kind`
    #[must_use]
    pub fn epsilon(&self, kind: OutputKind) -> f64 {
        self.rule(kind).epsilon_for(kind)
    }

    /// Per-invocation timeout
    #[must_use]
    pub const fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}
