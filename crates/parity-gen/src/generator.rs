//! Test case generation
//!
//! A run's cases are a deterministic boundary prefix followed by seeded
//! random draws. Cases are produced lazily and can be regenerated by index.

use crate::domain::{InputDomain, InputVector};
use crate::error::Result;
use crate::proptest_impl::sample_input;
use serde::Serialize;

/// Default number of test cases per run
pub const DEFAULT_SAMPLE_SIZE: usize = 100;
/// Sample size used by fuzz-style runs
pub const FUZZ_SAMPLE_SIZE: usize = 10_000;
/// Default generator seed
pub const DEFAULT_SEED: u64 = 42;

/// Why a test case exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseTag {
    /// Deterministic boundary value (zero, min, max, typical)
    Boundary,
    /// Seeded pseudo-random draw
    Random,
}

impl std::fmt::Display for CaseTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boundary => write!(f, "boundary"),
            Self::Random => write!(f, "random"),
        }
    }
}

/// A single input to run against both implementations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCase {
    /// Position in the run, starting at 0
    pub index: usize,
    /// Named input values
    pub inputs: InputVector,
    /// Boundary or random
    pub tag: CaseTag,
}

/// Finite, reproducible test case source for one input domain
#[derive(Debug, Clone)]
pub struct TestCaseGenerator {
    domain: InputDomain,
    sample_size: usize,
    seed: u64,
    boundary_len: usize,
}

impl TestCaseGenerator {
    /// Create a generator producing `sample_size` cases
    ///
    /// # Errors
    ///
    /// Returns `InvalidDomain` if the domain cannot be sampled.
    pub fn new(domain: InputDomain, sample_size: usize, seed: u64) -> Result<Self> {
        domain.validate()?;
        let boundary_len = domain
            .parameters
            .iter()
            .map(|p| p.kind.boundary_values().len())
            .max()
            .unwrap_or(0);
        Ok(Self {
            domain,
            sample_size,
            seed,
            boundary_len,
        })
    }

    /// Generator with the default sample size and seed
    ///
    /// # Errors
    ///
    /// Returns `InvalidDomain` if the domain cannot be sampled.
    pub fn with_defaults(domain: InputDomain) -> Result<Self> {
        Self::new(domain, DEFAULT_SAMPLE_SIZE, DEFAULT_SEED)
    }

    /// Number of cases this generator yields
    #[must_use]
    pub fn len(&self) -> usize {
        self.sample_size
    }

    /// Whether the generator yields nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sample_size == 0
    }

    /// Number of leading boundary cases
    #[must_use]
    pub fn boundary_len(&self) -> usize {
        self.boundary_len.min(self.sample_size)
    }

    /// Seed driving the random suffix
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// The domain being sampled
    #[must_use]
    pub const fn domain(&self) -> &InputDomain {
        &self.domain
    }

    /// Case at `index`, or `None` past the end
    #[must_use]
    pub fn case(&self, index: usize) -> Option<TestCase> {
        if index >= self.sample_size {
            return None;
        }
        if index < self.boundary_len {
            let mut inputs = InputVector::new();
            for param in &self.domain.parameters {
                let values = param.kind.boundary_values();
                let value = values
                    .get(index % values.len().max(1))
                    .cloned()
                    .unwrap_or_else(|| param.kind.typical());
                inputs.push(param.name.clone(), value);
            }
            return Some(TestCase {
                index,
                inputs,
                tag: CaseTag::Boundary,
            });
        }
        Some(TestCase {
            index,
            inputs: sample_input(&self.domain, self.seed, index),
            tag: CaseTag::Random,
        })
    }

    /// Lazy iterator over all cases; call again to restart
    #[must_use]
    pub fn iter(&self) -> TestCases<'_> {
        TestCases {
            generator: self,
            next: 0,
        }
    }
}

impl<'a> IntoIterator for &'a TestCaseGenerator {
    type Item = TestCase;
    type IntoIter = TestCases<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a generator's cases
#[derive(Debug, Clone)]
pub struct TestCases<'a> {
    generator: &'a TestCaseGenerator,
    next: usize,
}

impl Iterator for TestCases<'_> {
    type Item = TestCase;

    fn next(&mut self) -> Option<Self::Item> {
        let case = self.generator.case(self.next)?;
        self.next += 1;
        Some(case)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.generator.sample_size.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TestCases<'_> {}
