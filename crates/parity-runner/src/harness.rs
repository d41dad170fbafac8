//! Dual execution harness
//!
//! Runs the reference and candidate on the same test case concurrently.
//! A reference that fails to complete cancels the whole run.

use crate::artifact::{Artifact, ExecutionResult, InvocationContext};
use parity_gen::TestCase;

/// Results of running both artifacts on one test case
#[derive(Debug, Clone)]
pub struct ExecutionPair {
    /// Reference (ground truth) result
    pub reference: ExecutionResult,
    /// Candidate result
    pub candidate: ExecutionResult,
}

impl ExecutionPair {
    /// Test case index
    #[must_use]
    pub fn index(&self) -> usize {
        self.reference.index
    }
}

/// Reference/candidate pair under test
pub struct DualHarness<'a> {
    reference: &'a dyn Artifact,
    candidate: &'a dyn Artifact,
}

impl<'a> DualHarness<'a> {
    /// Harness comparing `candidate` against `reference`
    #[must_use]
    pub fn new(reference: &'a dyn Artifact, candidate: &'a dyn Artifact) -> Self {
        Self {
            reference,
            candidate,
        }
    }

    /// Reference artifact name
    #[must_use]
    pub fn reference_name(&self) -> &str {
        self.reference.name()
    }

    /// Candidate artifact name
    #[must_use]
    pub fn candidate_name(&self) -> &str {
        self.candidate.name()
    }

    /// Run both artifacts on `case`
    ///
    /// The two invocations are independent processes or calls; neither sees
    /// the other's state.
    #[must_use]
    pub fn execute(&self, case: &TestCase, ctx: &InvocationContext) -> ExecutionPair {
        let (reference, candidate) = rayon::join(
            || {
                let result = self.reference.invoke(case, ctx);
                if !result.status.is_ok() {
                    log::warn!(
                        "reference '{}' failed on case {}: {}",
                        self.reference.name(),
                        case.index,
                        result.status
                    );
                    ctx.cancel.cancel();
                }
                result
            },
            || self.candidate.invoke(case, ctx),
        );
        ExecutionPair {
            reference,
            candidate,
        }
    }
}

impl std::fmt::Debug for DualHarness<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualHarness")
            .field("reference", &self.reference.name())
            .field("candidate", &self.candidate.name())
            .finish()
    }
}
