//! Statistical certification
//!
//! Reduces the ordered deviation records of a completed run to a
//! [`ParityReport`]: failure count, deviation summary, Wilson confidence,
//! distribution test, and the overall verdict.

use crate::stats::{self, CONFIDENCE_Z, KS_MIN_SAMPLES, KS_SIGNIFICANCE};
use parity_gen::{OutputKind, ToleranceProfile};
use parity_runner::{DeviationRecord, FailureReason, OutputDetail};
use serde::{Deserialize, Serialize};

/// Overall verdict of a validation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Candidate matches with sufficient confidence
    Certified,
    /// At least one certification criterion failed
    Failed,
    /// Empty sample; nothing was proven
    Inconclusive,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Certified => write!(f, "CERTIFIED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Inconclusive => write!(f, "INCONCLUSIVE"),
        }
    }
}

/// Outcome of the distribution-similarity test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistributionVerdict {
    /// Distributions are compatible
    Pass,
    /// Distributions differ significantly
    Fail,
    /// Non-numeric output or sample too small
    NotApplicable,
}

impl std::fmt::Display for DistributionVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
            Self::NotApplicable => write!(f, "not-applicable"),
        }
    }
}

/// One failed test case as it appears in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Test case index
    pub index: usize,
    /// Why it failed
    pub reason: FailureReason,
    /// Governing deviation
    pub deviation: f64,
    /// Output excerpts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<OutputDetail>,
}

impl FailureDetail {
    fn from_record(record: &DeviationRecord) -> Self {
        Self {
            index: record.index,
            reason: record
                .reason
                .clone()
                .unwrap_or(FailureReason::OutOfTolerance),
            deviation: record.deviation,
            outputs: record.detail.clone(),
        }
    }
}

/// Aggregate result of a validation run
///
/// Created once by [`Certifier::certify`] and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityReport {
    /// Overall verdict
    pub status: Verdict,
    /// Comparison strategy used
    pub output_kind: OutputKind,
    /// Number of test cases
    pub test_cases: usize,
    /// Test cases that did not match
    pub failures: usize,
    /// Largest deviation over all records
    pub max_deviation: f64,
    /// Mean deviation over all records
    pub mean_deviation: f64,
    /// Wilson lower bound of the pass rate (fraction)
    pub confidence: f64,
    /// Distribution-similarity verdict
    pub distribution_test: DistributionVerdict,
    /// Kolmogorov–Smirnov statistic, when the test ran
    pub ks_statistic: Option<f64>,
    /// Kolmogorov–Smirnov p-value, when the test ran
    pub ks_p_value: Option<f64>,
    /// Every failed test case, ordered by index
    pub failure_details: Vec<FailureDetail>,
}

impl ParityReport {
    /// Report for an empty sample
    #[must_use]
    pub fn inconclusive(output_kind: OutputKind) -> Self {
        Self {
            status: Verdict::Inconclusive,
            output_kind,
            test_cases: 0,
            failures: 0,
            max_deviation: 0.0,
            mean_deviation: 0.0,
            confidence: 0.0,
            distribution_test: DistributionVerdict::NotApplicable,
            ks_statistic: None,
            ks_p_value: None,
            failure_details: Vec::new(),
        }
    }

    /// Confidence as a percentage
    #[must_use]
    pub fn confidence_percent(&self) -> f64 {
        self.confidence * 100.0
    }

    /// Observed pass rate (0 for an empty sample)
    #[must_use]
    pub fn pass_rate(&self) -> f64 {
        if self.test_cases == 0 {
            0.0
        } else {
            (self.test_cases - self.failures) as f64 / self.test_cases as f64
        }
    }

    /// Whether the candidate was certified
    #[must_use]
    pub fn is_certified(&self) -> bool {
        self.status == Verdict::Certified
    }
}

/// Thresholds the verdict is decided against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CertificationPolicy {
    /// Largest deviation a certified candidate may show
    pub max_allowed_deviation: f64,
    /// Confidence floor (fraction)
    pub min_confidence: f64,
    /// z-score of the confidence interval
    pub z: f64,
    /// Minimum N (and values per side) for the distribution test
    pub ks_min_samples: usize,
    /// Significance level of the distribution test
    pub ks_significance: f64,
}

impl Default for CertificationPolicy {
    fn default() -> Self {
        Self::from_profile(&ToleranceProfile::default())
    }
}

impl CertificationPolicy {
    /// Policy using the profile's thresholds
    #[must_use]
    pub fn from_profile(profile: &ToleranceProfile) -> Self {
        Self {
            max_allowed_deviation: profile.max_allowed_deviation,
            min_confidence: profile.min_confidence,
            z: CONFIDENCE_Z,
            ks_min_samples: KS_MIN_SAMPLES,
            ks_significance: KS_SIGNIFICANCE,
        }
    }
}

/// Reduces deviation records to a report
#[derive(Debug, Clone, Default)]
pub struct Certifier {
    policy: CertificationPolicy,
}

impl Certifier {
    /// Certifier with an explicit policy
    #[must_use]
    pub fn new(policy: CertificationPolicy) -> Self {
        Self { policy }
    }

    /// Certifier for `profile`
    #[must_use]
    pub fn from_profile(profile: &ToleranceProfile) -> Self {
        Self::new(CertificationPolicy::from_profile(profile))
    }

    /// Policy in use
    #[must_use]
    pub const fn policy(&self) -> &CertificationPolicy {
        &self.policy
    }

    /// Build the report for a completed run
    ///
    /// Records may arrive in any order; they are reduced in index order.
    #[must_use]
    pub fn certify(&self, output_kind: OutputKind, records: &[DeviationRecord]) -> ParityReport {
        let n = records.len();
        if n == 0 {
            return ParityReport::inconclusive(output_kind);
        }

        let mut ordered: Vec<&DeviationRecord> = records.iter().collect();
        ordered.sort_by_key(|r| r.index);

        let failures = ordered.iter().filter(|r| !r.matched).count();
        let max_deviation = ordered
            .iter()
            .map(|r| r.deviation)
            .fold(0.0_f64, f64::max);
        let mean_deviation = ordered.iter().map(|r| r.deviation).sum::<f64>() / n as f64;
        let confidence = stats::wilson_lower_bound(n - failures, n, self.policy.z);

        let ks = self.distribution_test(output_kind, &ordered);
        let distribution_test = match ks {
            None => DistributionVerdict::NotApplicable,
            Some(result) if result.passes(self.policy.ks_significance) => {
                DistributionVerdict::Pass
            }
            Some(_) => DistributionVerdict::Fail,
        };

        let certified = failures == 0
            && max_deviation <= self.policy.max_allowed_deviation
            && confidence >= self.policy.min_confidence
            && distribution_test != DistributionVerdict::Fail;
        let status = if certified {
            Verdict::Certified
        } else {
            Verdict::Failed
        };

        log::info!(
            "certified {n} {output_kind} cases: {status}, {failures} failures, confidence {:.4}%",
            confidence * 100.0
        );

        ParityReport {
            status,
            output_kind,
            test_cases: n,
            failures,
            max_deviation,
            mean_deviation,
            confidence,
            distribution_test,
            ks_statistic: ks.map(|r| r.statistic),
            ks_p_value: ks.map(|r| r.p_value),
            failure_details: ordered
                .iter()
                .filter(|r| !r.matched)
                .map(|r| FailureDetail::from_record(r))
                .collect(),
        }
    }

    fn distribution_test(
        &self,
        output_kind: OutputKind,
        ordered: &[&DeviationRecord],
    ) -> Option<stats::KsResult> {
        if !output_kind.is_numeric() || ordered.len() < self.policy.ks_min_samples {
            return None;
        }
        let reference: Vec<f64> = ordered
            .iter()
            .flat_map(|r| r.reference_values.iter().copied())
            .collect();
        let candidate: Vec<f64> = ordered
            .iter()
            .flat_map(|r| r.candidate_values.iter().copied())
            .collect();
        if reference.len() < self.policy.ks_min_samples
            || candidate.len() < self.policy.ks_min_samples
        {
            return None;
        }
        stats::ks_two_sample(&reference, &candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched(index: usize, value: f64) -> DeviationRecord {
        let mut record = DeviationRecord::exact_match(index);
        record.reference_values = vec![value];
        record.candidate_values = vec![value];
        record
    }

    fn lenient() -> Certifier {
        Certifier::new(CertificationPolicy {
            min_confidence: 0.9,
            ..CertificationPolicy::default()
        })
    }

    #[test]
    fn test_verdict_display_and_serde() {
        assert_eq!(Verdict::Certified.to_string(), "CERTIFIED");
        assert_eq!(Verdict::Inconclusive.to_string(), "INCONCLUSIVE");
        let json = serde_json::to_string(&Verdict::Failed).unwrap();
        assert_eq!(json, "\"FAILED\"");
        let json = serde_json::to_string(&DistributionVerdict::NotApplicable).unwrap();
        assert_eq!(json, "\"not-applicable\"");
        assert_eq!(DistributionVerdict::Pass.to_string(), "pass");
    }

    #[test]
    fn test_empty_sample_is_inconclusive() {
        let report = Certifier::default().certify(OutputKind::FloatRelative, &[]);
        assert_eq!(report.status, Verdict::Inconclusive);
        assert_eq!(report.confidence, 0.0);
        assert_eq!(report.test_cases, 0);
        assert_eq!(report.pass_rate(), 0.0);
    }

    #[test]
    fn test_all_match_certified_when_confident() {
        let records: Vec<_> = (0..100).map(|i| matched(i, i as f64)).collect();
        let report = lenient().certify(OutputKind::FloatRelative, &records);
        assert_eq!(report.status, Verdict::Certified);
        assert_eq!(report.failures, 0);
        assert_eq!(report.max_deviation, 0.0);
        assert!(report.confidence > 0.93);
        assert_eq!(report.distribution_test, DistributionVerdict::Pass);
        assert!(report.ks_statistic.is_some());
    }

    #[test]
    fn test_default_policy_needs_large_sample() {
        let records: Vec<_> = (0..100).map(|i| matched(i, 1.0)).collect();
        let report = Certifier::default().certify(OutputKind::FloatRelative, &records);
        // 100 clean cases bound the pass rate at ~93.8%, short of 99.9%
        assert_eq!(report.status, Verdict::Failed);
        assert_eq!(report.failures, 0);
    }

    #[test]
    fn test_single_failure_fails() {
        let mut records: Vec<_> = (0..100).map(|i| matched(i, 1.0)).collect();
        records[42] = DeviationRecord::forced_failure(42, FailureReason::CandidateCrashed);
        let report = lenient().certify(OutputKind::FloatRelative, &records);
        assert_eq!(report.status, Verdict::Failed);
        assert_eq!(report.failures, 1);
        assert_eq!(report.max_deviation, 1.0);
        assert!((report.mean_deviation - 0.01).abs() < 1e-12);
        assert_eq!(report.failure_details.len(), 1);
        assert_eq!(report.failure_details[0].index, 42);
        assert_eq!(report.failure_details[0].reason, FailureReason::CandidateCrashed);
    }

    #[test]
    fn test_max_allowed_deviation_enforced() {
        let records: Vec<_> = (0..50)
            .map(|i| {
                let mut record = matched(i, 1.0);
                record.deviation = 5e-7;
                record
            })
            .collect();
        let strict = Certifier::new(CertificationPolicy {
            min_confidence: 0.5,
            max_allowed_deviation: 1e-7,
            ..CertificationPolicy::default()
        });
        assert_eq!(
            strict.certify(OutputKind::FloatRelative, &records).status,
            Verdict::Failed
        );
        let loose = Certifier::new(CertificationPolicy {
            min_confidence: 0.5,
            ..CertificationPolicy::default()
        });
        assert_eq!(
            loose.certify(OutputKind::FloatRelative, &records).status,
            Verdict::Certified
        );
    }

    #[test]
    fn test_distribution_not_applicable_below_threshold() {
        let records: Vec<_> = (0..29).map(|i| matched(i, i as f64)).collect();
        let report = lenient().certify(OutputKind::FloatRelative, &records);
        assert_eq!(report.distribution_test, DistributionVerdict::NotApplicable);
        assert!(report.ks_p_value.is_none());
    }

    #[test]
    fn test_distribution_not_applicable_for_exact_hash() {
        let records: Vec<_> = (0..500).map(DeviationRecord::exact_match).collect();
        let report = Certifier::default().certify(OutputKind::ExactHash, &records);
        assert_eq!(report.distribution_test, DistributionVerdict::NotApplicable);
        assert_eq!(report.max_deviation, 0.0);
    }

    #[test]
    fn test_distribution_failure_blocks_certification() {
        // within tolerance per case, but the candidate's values are shifted
        let records: Vec<_> = (0..200)
            .map(|i| {
                let mut record = DeviationRecord::exact_match(i);
                record.reference_values = vec![i as f64];
                record.candidate_values = vec![i as f64 + 100.0];
                record
            })
            .collect();
        let policy = CertificationPolicy {
            min_confidence: 0.5,
            ..CertificationPolicy::default()
        };
        let report = Certifier::new(policy).certify(OutputKind::FloatAbsolute, &records);
        assert_eq!(report.distribution_test, DistributionVerdict::Fail);
        assert_eq!(report.status, Verdict::Failed);
    }

    #[test]
    fn test_order_independent() {
        let mut records: Vec<_> = (0..40).map(|i| matched(i, i as f64 * 0.5)).collect();
        records[7] = DeviationRecord::forced_failure(7, FailureReason::CandidateTimeout);
        let forward = lenient().certify(OutputKind::FloatRelative, &records);
        records.reverse();
        let backward = lenient().certify(OutputKind::FloatRelative, &records);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_confidence_percent() {
        let records: Vec<_> = (0..100).map(|i| matched(i, 1.0)).collect();
        let report = lenient().certify(OutputKind::FloatRelative, &records);
        assert!((report.confidence_percent() - report.confidence * 100.0).abs() < 1e-12);
        assert_eq!(report.pass_rate(), 1.0);
        assert!(report.is_certified());
    }
}
