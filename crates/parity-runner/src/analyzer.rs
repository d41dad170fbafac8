//! Deviation analysis
//!
//! Compares one reference/candidate result pair under the tolerance profile.
//! The output kind selects a single comparison strategy; any non-ok status
//! on either side forces a failed record with deviation 1.0.

use crate::artifact::ExecutionStatus;
use crate::error::{Error, Result};
use crate::harness::ExecutionPair;
use parity_gen::{OutputKind, ToleranceProfile};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Deviation assigned to forced failures
pub const FORCED_DEVIATION: f64 = 1.0;
/// Longest output excerpt kept in failure details
const EXCERPT_LIMIT: usize = 120;

/// Why a test case failed to match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FailureReason {
    /// Candidate exceeded its timeout
    CandidateTimeout,
    /// Candidate terminated abnormally
    CandidateCrashed,
    /// Candidate exited with a non-zero status
    CandidateNonZeroExit {
        /// Exit code
        code: i32,
    },
    /// Candidate output could not be read as the expected kind
    CandidateUnparseable,
    /// Reference did not complete normally
    ReferenceFailed {
        /// Reference status
        status: ExecutionStatus,
    },
    /// Reference output could not be read as the expected kind
    ReferenceUnparseable,
    /// Outputs have different numbers of values
    ShapeMismatch {
        /// Values produced by the reference
        reference_len: usize,
        /// Values produced by the candidate
        candidate_len: usize,
    },
    /// Numeric deviation above the configured epsilon
    OutOfTolerance,
    /// Exact, categorical or string outputs differ
    Mismatch,
    /// Invocation interrupted by run cancellation
    Cancelled,
}

impl FailureReason {
    /// Whether the failure lies with the reference, not the candidate
    #[must_use]
    pub const fn is_reference_side(&self) -> bool {
        matches!(
            self,
            Self::ReferenceFailed { .. } | Self::ReferenceUnparseable
        )
    }

    fn from_candidate_status(status: ExecutionStatus) -> Option<Self> {
        match status {
            ExecutionStatus::Ok => None,
            ExecutionStatus::Timeout => Some(Self::CandidateTimeout),
            ExecutionStatus::Crashed => Some(Self::CandidateCrashed),
            ExecutionStatus::NonZeroExit(code) => Some(Self::CandidateNonZeroExit { code }),
            ExecutionStatus::Cancelled => Some(Self::Cancelled),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CandidateTimeout => write!(f, "candidate timeout"),
            Self::CandidateCrashed => write!(f, "candidate crashed"),
            Self::CandidateNonZeroExit { code } => write!(f, "candidate exited with {code}"),
            Self::CandidateUnparseable => write!(f, "candidate output unparseable"),
            Self::ReferenceFailed { status } => write!(f, "reference {status}"),
            Self::ReferenceUnparseable => write!(f, "reference output unparseable"),
            Self::ShapeMismatch {
                reference_len,
                candidate_len,
            } => write!(
                f,
                "shape mismatch: reference {reference_len} values, candidate {candidate_len}"
            ),
            Self::OutOfTolerance => write!(f, "deviation out of tolerance"),
            Self::Mismatch => write!(f, "outputs differ"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Output excerpts kept for failed test cases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDetail {
    /// Reference output (truncated)
    pub reference: String,
    /// Candidate output (truncated)
    pub candidate: String,
    /// SHA-256 of the full reference output (exact-hash runs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_digest: Option<String>,
    /// SHA-256 of the full candidate output (exact-hash runs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_digest: Option<String>,
}

/// Comparison outcome for one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationRecord {
    /// Test case index
    pub index: usize,
    /// Largest absolute deviation
    pub absolute_deviation: f64,
    /// Largest relative deviation
    pub relative_deviation: f64,
    /// Deviation governing the output kind (what the certifier aggregates)
    pub deviation: f64,
    /// Whether the outputs agree within tolerance
    pub matched: bool,
    /// Failure reason, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    /// Parsed reference values (numeric kinds)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_values: Vec<f64>,
    /// Parsed candidate values (numeric kinds)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidate_values: Vec<f64>,
    /// Output excerpts for failed cases
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<OutputDetail>,
}

impl DeviationRecord {
    /// Matching record with zero deviation
    #[must_use]
    pub fn exact_match(index: usize) -> Self {
        Self {
            index,
            absolute_deviation: 0.0,
            relative_deviation: 0.0,
            deviation: 0.0,
            matched: true,
            reason: None,
            reference_values: Vec::new(),
            candidate_values: Vec::new(),
            detail: None,
        }
    }

    /// Failed record with the forced deviation of 1.0
    #[must_use]
    pub fn forced_failure(index: usize, reason: FailureReason) -> Self {
        Self {
            index,
            absolute_deviation: FORCED_DEVIATION,
            relative_deviation: FORCED_DEVIATION,
            deviation: FORCED_DEVIATION,
            matched: false,
            reason: Some(reason),
            reference_values: Vec::new(),
            candidate_values: Vec::new(),
            detail: None,
        }
    }

    fn with_detail(mut self, detail: OutputDetail) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Pulls the compared value out of raw stdout
#[derive(Debug, Clone, Default)]
pub struct OutputExtractor {
    pattern: Option<Regex>,
}

impl OutputExtractor {
    /// Whole trimmed stdout
    #[must_use]
    pub fn whole_output() -> Self {
        Self::default()
    }

    /// Extractor using the first capture group of `pattern`; the last match wins
    ///
    /// # Errors
    ///
    /// Returns `InvalidPattern` if the regex fails to compile or has no
    /// capture group.
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| Error::InvalidPattern(e.to_string()))?;
        if regex.captures_len() < 2 {
            return Err(Error::InvalidPattern(format!(
                "'{pattern}' has no capture group"
            )));
        }
        Ok(Self {
            pattern: Some(regex),
        })
    }

    /// Extractor from an optional pattern
    ///
    /// # Errors
    ///
    /// Same as [`OutputExtractor::with_pattern`].
    pub fn from_option(pattern: Option<&str>) -> Result<Self> {
        pattern.map_or_else(|| Ok(Self::whole_output()), Self::with_pattern)
    }

    /// Extract the compared text, or `None` if the pattern does not match
    #[must_use]
    pub fn extract<'a>(&self, stdout: &'a str) -> Option<&'a str> {
        match &self.pattern {
            None => Some(stdout.trim()),
            Some(regex) => regex
                .captures_iter(stdout)
                .filter_map(|caps| caps.get(1))
                .last()
                .map(|m| m.as_str().trim()),
        }
    }
}

/// Parse a scalar or list of numbers
///
/// Accepts `1.5`, `[1, 2.5]`, `1 2 3`, `1,2,3`, and `nan`/`inf` spellings.
#[must_use]
pub fn parse_numbers(text: &str) -> Option<Vec<f64>> {
    let trimmed = text.trim();
    let bracketed = trimmed.starts_with('[') && trimmed.ends_with(']');
    let inner = if bracketed {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };
    let tokens: Vec<&str> = inner
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() && !bracketed {
        return None;
    }
    tokens.iter().map(|t| t.parse::<f64>().ok()).collect()
}

/// Per-element deviation; `None` marks an incomparable pair (NaN vs number,
/// mismatched infinities)
fn element_deviation(reference: f64, candidate: f64) -> Option<(f64, f64)> {
    if reference.is_nan() && candidate.is_nan() {
        return Some((0.0, 0.0));
    }
    if reference == candidate {
        return Some((0.0, 0.0));
    }
    if !reference.is_finite() || !candidate.is_finite() {
        return None;
    }
    let absolute = (reference - candidate).abs();
    let relative = absolute / reference.abs().max(f64::EPSILON);
    Some((absolute, relative))
}

pub(crate) fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= EXCERPT_LIMIT {
        trimmed.to_string()
    } else {
        let mut cut: String = trimmed.chars().take(EXCERPT_LIMIT).collect();
        cut.push('…');
        cut
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Compares result pairs for one output kind
#[derive(Debug, Clone)]
pub struct DeviationAnalyzer {
    kind: OutputKind,
    epsilon: f64,
    extractor: OutputExtractor,
}

impl DeviationAnalyzer {
    /// Analyzer for `kind` under `profile`
    #[must_use]
    pub fn new(kind: OutputKind, profile: &ToleranceProfile, extractor: OutputExtractor) -> Self {
        Self {
            kind,
            epsilon: profile.epsilon(kind),
            extractor,
        }
    }

    /// Output kind being compared
    #[must_use]
    pub const fn kind(&self) -> OutputKind {
        self.kind
    }

    /// Produce the deviation record for one pair
    #[must_use]
    pub fn analyze(&self, pair: &ExecutionPair) -> DeviationRecord {
        let index = pair.reference.index;
        if !pair.reference.status.is_ok() {
            return DeviationRecord::forced_failure(
                index,
                FailureReason::ReferenceFailed {
                    status: pair.reference.status,
                },
            )
            .with_detail(self.detail(&pair.reference.stderr, &pair.candidate.stdout, false));
        }
        if let Some(reason) = FailureReason::from_candidate_status(pair.candidate.status) {
            return DeviationRecord::forced_failure(index, reason)
                .with_detail(self.detail(&pair.reference.stdout, &pair.candidate.stderr, false));
        }

        let Some(reference) = self.extractor.extract(&pair.reference.stdout) else {
            return self.unparseable(pair, FailureReason::ReferenceUnparseable);
        };
        let Some(candidate) = self.extractor.extract(&pair.candidate.stdout) else {
            return self.unparseable(pair, FailureReason::CandidateUnparseable);
        };

        match self.kind {
            OutputKind::ExactHash => {
                if reference.as_bytes() == candidate.as_bytes() {
                    DeviationRecord::exact_match(index)
                } else {
                    DeviationRecord::forced_failure(index, FailureReason::Mismatch)
                        .with_detail(self.detail(reference, candidate, true))
                }
            }
            OutputKind::Categorical | OutputKind::String => {
                if reference == candidate {
                    DeviationRecord::exact_match(index)
                } else {
                    DeviationRecord::forced_failure(index, FailureReason::Mismatch)
                        .with_detail(self.detail(reference, candidate, false))
                }
            }
            OutputKind::FloatRelative | OutputKind::FloatAbsolute => {
                self.compare_numeric(index, reference, candidate, pair)
            }
        }
    }

    fn compare_numeric(
        &self,
        index: usize,
        reference: &str,
        candidate: &str,
        pair: &ExecutionPair,
    ) -> DeviationRecord {
        let Some(reference_values) = parse_numbers(reference) else {
            return self.unparseable(pair, FailureReason::ReferenceUnparseable);
        };
        let Some(candidate_values) = parse_numbers(candidate) else {
            return self.unparseable(pair, FailureReason::CandidateUnparseable);
        };
        if reference_values.len() != candidate_values.len() {
            return DeviationRecord::forced_failure(
                index,
                FailureReason::ShapeMismatch {
                    reference_len: reference_values.len(),
                    candidate_len: candidate_values.len(),
                },
            )
            .with_detail(self.detail(reference, candidate, false));
        }

        let mut absolute_deviation: f64 = 0.0;
        let mut relative_deviation: f64 = 0.0;
        let mut comparable = true;
        for (&r, &c) in reference_values.iter().zip(&candidate_values) {
            match element_deviation(r, c) {
                Some((abs, rel)) => {
                    absolute_deviation = absolute_deviation.max(abs);
                    relative_deviation = relative_deviation.max(rel);
                }
                None => comparable = false,
            }
        }

        let mut record = if comparable {
            let deviation = match self.kind {
                OutputKind::FloatAbsolute => absolute_deviation,
                _ => relative_deviation,
            };
            let matched = deviation <= self.epsilon;
            DeviationRecord {
                index,
                absolute_deviation,
                relative_deviation,
                deviation,
                matched,
                reason: (!matched).then_some(FailureReason::OutOfTolerance),
                reference_values: Vec::new(),
                candidate_values: Vec::new(),
                detail: None,
            }
        } else {
            DeviationRecord::forced_failure(index, FailureReason::OutOfTolerance)
        };
        if !record.matched {
            record.detail = Some(self.detail(reference, candidate, false));
        }
        record.reference_values = reference_values;
        record.candidate_values = candidate_values;
        record
    }

    fn unparseable(&self, pair: &ExecutionPair, reason: FailureReason) -> DeviationRecord {
        DeviationRecord::forced_failure(pair.reference.index, reason).with_detail(self.detail(
            &pair.reference.stdout,
            &pair.candidate.stdout,
            false,
        ))
    }

    fn detail(&self, reference: &str, candidate: &str, digests: bool) -> OutputDetail {
        OutputDetail {
            reference: excerpt(reference),
            candidate: excerpt(candidate),
            reference_digest: digests.then(|| sha256_hex(reference.as_bytes())),
            candidate_digest: digests.then(|| sha256_hex(candidate.as_bytes())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ExecutionResult;
    use parity_gen::ComparisonRule;

    fn analyze_results(
        analyzer: &DeviationAnalyzer,
        reference: ExecutionResult,
        candidate: ExecutionResult,
    ) -> DeviationRecord {
        analyzer.analyze(&ExecutionPair {
            reference,
            candidate,
        })
    }

    fn analyzer(kind: OutputKind) -> DeviationAnalyzer {
        DeviationAnalyzer::new(kind, &ToleranceProfile::default(), OutputExtractor::default())
    }

    fn ok(stdout: &str) -> ExecutionResult {
        ExecutionResult::ok(0, stdout, 1)
    }

    fn run(kind: OutputKind, reference: &str, candidate: &str) -> DeviationRecord {
        analyze_results(&analyzer(kind), ok(reference), ok(candidate))
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_numbers("1.5"), Some(vec![1.5]));
        assert_eq!(parse_numbers(" [1, 2.5] "), Some(vec![1.0, 2.5]));
        assert_eq!(parse_numbers("1 2\n3"), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(parse_numbers("[]"), Some(vec![]));
        assert_eq!(parse_numbers(""), None);
        assert_eq!(parse_numbers("abc"), None);
        assert!(parse_numbers("nan").unwrap()[0].is_nan());
        assert_eq!(parse_numbers("-inf"), Some(vec![f64::NEG_INFINITY]));
    }

    #[test]
    fn test_extractor_whole_output() {
        let extractor = OutputExtractor::whole_output();
        assert_eq!(extractor.extract("  42\n"), Some("42"));
    }

    #[test]
    fn test_extractor_pattern_last_match() {
        let extractor = OutputExtractor::with_pattern(r"Result: (\S+)").unwrap();
        let stdout = "Result: 1.0\nprogress...\nResult: 2.5\nTime: 10ms\n";
        assert_eq!(extractor.extract(stdout), Some("2.5"));
        assert_eq!(extractor.extract("no result here"), None);
    }

    #[test]
    fn test_extractor_rejects_bad_patterns() {
        assert!(matches!(
            OutputExtractor::with_pattern("Result: \\S+"),
            Err(Error::InvalidPattern(_))
        ));
        assert!(matches!(
            OutputExtractor::with_pattern("(unclosed"),
            Err(Error::InvalidPattern(_))
        ));
        assert!(OutputExtractor::from_option(None).is_ok());
    }

    #[test]
    fn test_exact_hash_match() {
        let record = run(OutputKind::ExactHash, "deadbeef", "deadbeef");
        assert!(record.matched);
        assert_eq!(record.deviation, 0.0);
        assert!(record.detail.is_none());
    }

    #[test]
    fn test_exact_hash_mismatch_reports_digests() {
        let record = run(OutputKind::ExactHash, "deadbeef", "deadbeee");
        assert!(!record.matched);
        assert_eq!(record.deviation, 1.0);
        assert_eq!(record.reason, Some(FailureReason::Mismatch));
        let detail = record.detail.unwrap();
        assert_eq!(detail.reference_digest.as_ref().map(String::len), Some(64));
        assert_ne!(detail.reference_digest, detail.candidate_digest);
    }

    #[test]
    fn test_float_relative_within_epsilon() {
        let record = run(OutputKind::FloatRelative, "1000.0", "1000.0000005");
        assert!(record.matched);
        assert!(record.deviation < 1e-6);
        assert!(record.absolute_deviation > record.relative_deviation);
        assert_eq!(record.reference_values, vec![1000.0]);
    }

    #[test]
    fn test_float_relative_out_of_tolerance() {
        let record = run(OutputKind::FloatRelative, "1.0", "1.01");
        assert!(!record.matched);
        assert_eq!(record.reason, Some(FailureReason::OutOfTolerance));
        assert!((record.deviation - 0.01).abs() < 1e-12);
        assert!(record.detail.is_some());
    }

    #[test]
    fn test_float_relative_zero_reference() {
        let record = run(OutputKind::FloatRelative, "0.0", "0.0");
        assert!(record.matched);
        let record = run(OutputKind::FloatRelative, "0.0", "1e-3");
        assert!(!record.matched);
    }

    #[test]
    fn test_float_absolute_uses_absolute_epsilon() {
        let profile = ToleranceProfile::default()
            .with_rule(OutputKind::FloatAbsolute, ComparisonRule::new(1e-6, 1e-3));
        let analyzer = DeviationAnalyzer::new(
            OutputKind::FloatAbsolute,
            &profile,
            OutputExtractor::default(),
        );
        let record = analyze_results(&analyzer, ok("0.0001"), ok("0.0005"));
        assert!(record.matched);
        assert!((record.deviation - 0.0004).abs() < 1e-12);
        let record = analyze_results(&analyzer, ok("1.0"), ok("1.01"));
        assert!(!record.matched);
    }

    #[test]
    fn test_float_vector_max_deviation() {
        let record = run(OutputKind::FloatAbsolute, "[1.0, 2.0, 3.0]", "[1.0, 2.5, 3.0]");
        assert!(!record.matched);
        assert!((record.absolute_deviation - 0.5).abs() < 1e-12);
        assert_eq!(record.candidate_values.len(), 3);
    }

    #[test]
    fn test_float_shape_mismatch() {
        let record = run(OutputKind::FloatRelative, "1 2 3", "1 2");
        assert_eq!(
            record.reason,
            Some(FailureReason::ShapeMismatch {
                reference_len: 3,
                candidate_len: 2
            })
        );
        assert_eq!(record.deviation, 1.0);
    }

    #[test]
    fn test_float_nan_handling() {
        assert!(run(OutputKind::FloatRelative, "nan", "NaN").matched);
        let record = run(OutputKind::FloatRelative, "nan", "1.0");
        assert!(!record.matched);
        assert_eq!(record.deviation, 1.0);
        assert!(run(OutputKind::FloatRelative, "inf", "inf").matched);
        assert!(!run(OutputKind::FloatRelative, "inf", "-inf").matched);
    }

    #[test]
    fn test_candidate_unparseable() {
        let record = run(OutputKind::FloatRelative, "1.0", "oops");
        assert_eq!(record.reason, Some(FailureReason::CandidateUnparseable));
        assert!(!record.reason.unwrap().is_reference_side());
    }

    #[test]
    fn test_reference_unparseable() {
        let record = run(OutputKind::FloatRelative, "oops", "1.0");
        assert_eq!(record.reason, Some(FailureReason::ReferenceUnparseable));
        assert!(record.reason.unwrap().is_reference_side());
    }

    #[test]
    fn test_categorical_and_string() {
        assert!(run(OutputKind::Categorical, "cat", "cat").matched);
        let record = run(OutputKind::Categorical, "cat", "dog");
        assert!(!record.matched);
        assert_eq!(record.deviation, 1.0);
        assert!(!run(OutputKind::String, "Hello", "hello").matched);
    }

    #[test]
    fn test_candidate_failure_statuses_are_forced_failures() {
        let analyzer = analyzer(OutputKind::FloatRelative);
        let cases = [
            (ExecutionStatus::Timeout, FailureReason::CandidateTimeout),
            (ExecutionStatus::Crashed, FailureReason::CandidateCrashed),
            (
                ExecutionStatus::NonZeroExit(2),
                FailureReason::CandidateNonZeroExit { code: 2 },
            ),
        ];
        for (status, expected) in cases {
            let candidate = ExecutionResult::failed(0, status, "err", 5);
            let record = analyze_results(&analyzer, ok("1.0"), candidate);
            assert!(!record.matched);
            assert_eq!(record.deviation, 1.0);
            assert_eq!(record.reason, Some(expected));
        }
    }

    #[test]
    fn test_reference_failure_recorded() {
        let reference = ExecutionResult::failed(0, ExecutionStatus::Crashed, "segv", 5);
        let record = analyze_results(&analyzer(OutputKind::String), reference, ok("x"));
        assert!(record.reason.as_ref().unwrap().is_reference_side());
    }

    #[test]
    fn test_pattern_extraction_in_analysis() {
        let analyzer = DeviationAnalyzer::new(
            OutputKind::FloatRelative,
            &ToleranceProfile::default(),
            OutputExtractor::with_pattern(r"Result: ([-0-9.eE+]+)").unwrap(),
        );
        let record = analyze_results(
            &analyzer,
            ok("Result: 4999.50\nTime: 900ms\n"),
            ok("Result: 4999.50\nTime: 3ms\n"),
        );
        assert!(record.matched);
    }

    #[test]
    fn test_excerpt_truncates() {
        let long = "x".repeat(500);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), EXCERPT_LIMIT + 1);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn test_failure_reason_display_and_serde() {
        let reason = FailureReason::CandidateNonZeroExit { code: 7 };
        assert_eq!(reason.to_string(), "candidate exited with 7");
        let json = serde_json::to_string(&reason).unwrap();
        assert!(json.contains("candidate-non-zero-exit"));
    }
}
