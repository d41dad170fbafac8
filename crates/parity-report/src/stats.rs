//! Statistics for certification
//!
//! Wilson score lower bound for the pass rate and a two-sample
//! Kolmogorov–Smirnov test for output distributions.

/// z for a two-sided 99% interval
pub const CONFIDENCE_Z: f64 = 2.575_829_303_548_9;
/// Minimum sample per side before the distribution test applies
pub const KS_MIN_SAMPLES: usize = 30;
/// Significance level of the distribution test
pub const KS_SIGNIFICANCE: f64 = 0.01;

/// Lower bound of the Wilson score interval for `successes` out of `n`
///
/// Returns 0 for an empty sample. For a fixed pass rate the bound is
/// non-decreasing in `n`.
#[must_use]
pub fn wilson_lower_bound(successes: usize, n: usize, z: f64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n_f = n as f64;
    let ratio = successes.min(n) as f64 / n_f;
    let z2 = z * z;
    let denominator = 1.0 + z2 / n_f;
    let center = ratio + z2 / (2.0 * n_f);
    let spread = z * ((ratio * (1.0 - ratio) / n_f) + (z2 / (4.0 * n_f * n_f))).sqrt();

    ((center - spread) / denominator).clamp(0.0, 1.0)
}

/// Confidence that the candidate matches, as a fraction
#[must_use]
pub fn confidence_score(n: usize, failures: usize) -> f64 {
    wilson_lower_bound(n.saturating_sub(failures), n, CONFIDENCE_Z)
}

/// Two-sample Kolmogorov–Smirnov result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KsResult {
    /// Largest gap between the two empirical CDFs
    pub statistic: f64,
    /// Asymptotic p-value
    pub p_value: f64,
}

impl KsResult {
    /// Whether the samples are compatible at `alpha`
    #[must_use]
    pub fn passes(&self, alpha: f64) -> bool {
        self.p_value >= alpha
    }
}

/// Two-sample Kolmogorov–Smirnov test
///
/// NaN values are ignored. Returns `None` if either side is empty after
/// filtering.
#[must_use]
pub fn ks_two_sample(a: &[f64], b: &[f64]) -> Option<KsResult> {
    let mut a: Vec<f64> = a.iter().copied().filter(|x| !x.is_nan()).collect();
    let mut b: Vec<f64> = b.iter().copied().filter(|x| !x.is_nan()).collect();
    if a.is_empty() || b.is_empty() {
        return None;
    }
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);

    let (n1, n2) = (a.len(), b.len());
    let (mut i, mut j) = (0, 0);
    let mut statistic: f64 = 0.0;
    while i < n1 && j < n2 {
        let x = a[i].min(b[j]);
        while i < n1 && a[i] <= x {
            i += 1;
        }
        while j < n2 && b[j] <= x {
            j += 1;
        }
        let gap = (i as f64 / n1 as f64 - j as f64 / n2 as f64).abs();
        statistic = statistic.max(gap);
    }

    let ne = (n1 * n2) as f64 / (n1 + n2) as f64;
    let root = ne.sqrt();
    let lambda = (root + 0.12 + 0.11 / root) * statistic;
    Some(KsResult {
        statistic,
        p_value: kolmogorov_q(lambda),
    })
}

/// Survival function of the Kolmogorov distribution
fn kolmogorov_q(lambda: f64) -> f64 {
    let a2 = -2.0 * lambda * lambda;
    let mut sign = 2.0;
    let mut sum = 0.0;
    let mut previous: f64 = 0.0;
    for k in 1..=100 {
        let k = f64::from(k);
        let term = sign * (a2 * k * k).exp();
        sum += term;
        if term.abs() <= 0.001 * previous || term.abs() <= 1e-8 * sum {
            return sum.clamp(0.0, 1.0);
        }
        sign = -sign;
        previous = term.abs();
    }
    // no convergence: lambda is near zero
    1.0
}
