//! Parallel execution using Rayon
//!
//! Test cases are distributed over a bounded worker pool. Results come back
//! in whatever order workers finish and are re-sorted by test case index.

use crate::analyzer::{DeviationAnalyzer, DeviationRecord, FailureReason, excerpt};
use crate::artifact::{ExecutionStatus, InvocationContext};
use crate::cancel::{CancellationToken, RunDeadline};
use crate::error::{Error, Result};
use crate::harness::DualHarness;
use parity_gen::TestCase;
use rayon::prelude::*;
use std::time::{Duration, Instant};

/// Parallel executor configuration
#[derive(Debug, Clone)]
pub struct ParallelConfig {
    /// Number of worker threads
    pub num_workers: usize,
    /// Per-invocation timeout
    pub timeout: Duration,
    /// Overall run deadline in milliseconds
    pub run_timeout_ms: Option<u64>,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get(),
            timeout: Duration::from_millis(parity_gen::profile::DEFAULT_TIMEOUT_MS),
            run_timeout_ms: None,
        }
    }
}

impl ParallelConfig {
    /// Set the worker count (0 means one per CPU)
    #[must_use]
    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = if num_workers == 0 {
            num_cpus::get()
        } else {
            num_workers
        };
        self
    }

    /// Set the per-invocation timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the overall run deadline
    #[must_use]
    pub const fn with_run_timeout_ms(mut self, run_timeout_ms: Option<u64>) -> Self {
        self.run_timeout_ms = run_timeout_ms;
        self
    }
}

/// Records of a completed run
#[derive(Debug, Clone)]
pub struct ParallelResult {
    /// One record per test case, sorted by index
    pub records: Vec<DeviationRecord>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

/// What one worker produced for one test case
enum CaseOutcome {
    Record(DeviationRecord),
    ReferenceFailed {
        index: usize,
        status: ExecutionStatus,
        detail: String,
    },
    Interrupted,
}

/// Parallel test case executor
///
/// The executor's cancellation token is shared with its caller; once
/// cancelled (by the caller or by a reference failure) it stays cancelled.
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    config: ParallelConfig,
    cancel: CancellationToken,
}

impl ParallelExecutor {
    /// Create a new parallel executor
    #[must_use]
    pub fn new(config: ParallelConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this executor's runs
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &ParallelConfig {
        &self.config
    }

    /// Run every case through the harness and analyzer
    ///
    /// Either all cases produce a record or the run fails as a whole;
    /// partial results are dropped.
    ///
    /// # Errors
    ///
    /// - `ReferenceUnavailable` for the lowest-index reference failure
    /// - `RunTimedOut` if the run deadline expired first
    /// - `Cancelled` if the caller cancelled the run
    /// - `WorkerPool` if the thread pool cannot be built
    pub fn execute(
        &self,
        harness: &DualHarness<'_>,
        analyzer: &DeviationAnalyzer,
        cases: &[TestCase],
    ) -> Result<ParallelResult> {
        let start = Instant::now();
        let ctx = InvocationContext {
            timeout: self.config.timeout,
            cancel: self.cancel.clone(),
            deadline: RunDeadline::from_millis(self.config.run_timeout_ms),
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.num_workers.max(1))
            .build()
            .map_err(|e| Error::WorkerPool(e.to_string()))?;

        log::debug!(
            "executing {} test cases on {} workers",
            cases.len(),
            self.config.num_workers.max(1)
        );

        let outcomes: Vec<CaseOutcome> = pool.install(|| {
            cases
                .par_iter()
                .map(|case| Self::execute_single(harness, analyzer, case, &ctx))
                .collect()
        });

        let total = cases.len();
        let mut records = Vec::with_capacity(total);
        let mut reference_failure: Option<(usize, ExecutionStatus, String)> = None;
        let mut interrupted = false;
        for outcome in outcomes {
            match outcome {
                CaseOutcome::Record(record) => records.push(record),
                CaseOutcome::ReferenceFailed {
                    index,
                    status,
                    detail,
                } => {
                    if reference_failure.as_ref().is_none_or(|(i, _, _)| index < *i) {
                        reference_failure = Some((index, status, detail));
                    }
                }
                CaseOutcome::Interrupted => interrupted = true,
            }
        }

        if let Some((index, status, detail)) = reference_failure {
            return Err(Error::ReferenceUnavailable {
                index,
                status,
                detail,
            });
        }
        if interrupted {
            let completed = records.len();
            if ctx.deadline.expired() {
                return Err(Error::RunTimedOut {
                    timeout_ms: self.config.run_timeout_ms.unwrap_or_default(),
                    completed,
                    total,
                });
            }
            return Err(Error::Cancelled { completed, total });
        }

        records.sort_by_key(|r| r.index);
        Ok(ParallelResult {
            records,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn execute_single(
        harness: &DualHarness<'_>,
        analyzer: &DeviationAnalyzer,
        case: &TestCase,
        ctx: &InvocationContext,
    ) -> CaseOutcome {
        if ctx.interrupted() {
            return CaseOutcome::Interrupted;
        }
        let pair = harness.execute(case, ctx);
        if pair.reference.status == ExecutionStatus::Cancelled {
            return CaseOutcome::Interrupted;
        }
        if !pair.reference.status.is_ok() {
            return CaseOutcome::ReferenceFailed {
                index: case.index,
                status: pair.reference.status,
                detail: excerpt(&pair.reference.stderr),
            };
        }
        if pair.candidate.status == ExecutionStatus::Cancelled {
            return CaseOutcome::Interrupted;
        }

        let record = analyzer.analyze(&pair);
        if record.reason.as_ref().is_some_and(FailureReason::is_reference_side) {
            ctx.cancel.cancel();
            return CaseOutcome::ReferenceFailed {
                index: case.index,
                status: pair.reference.status,
                detail: format!("unparseable output: {}", excerpt(&pair.reference.stdout)),
            };
        }
        if !record.matched {
            log::debug!(
                "case {} mismatch: {}",
                record.index,
                record.reason.as_ref().map_or_else(String::new, ToString::to_string)
            );
        }
        CaseOutcome::Record(record)
    }
}
