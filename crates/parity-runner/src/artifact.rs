//! Runnable artifacts
//!
//! An artifact is anything that maps a test case's inputs to output text:
//! an external executable ([`crate::ProcessArtifact`]) or an in-process
//! function ([`FnArtifact`]). Every invocation gets a fresh context; artifacts
//! hold no mutable state between invocations.

use crate::cancel::{CancellationToken, RunDeadline};
use parity_gen::{InputVector, TestCase};
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

/// How often a waiting in-process invocation rechecks cancellation
const FN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Completion status of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStatus {
    /// Exited normally with status 0
    Ok,
    /// Killed after exceeding its timeout
    Timeout,
    /// Terminated abnormally (signal, panic, spawn failure)
    Crashed,
    /// Exited with a non-zero status code
    NonZeroExit(i32),
    /// Killed because the run was cancelled or hit its deadline
    Cancelled,
}

impl ExecutionStatus {
    /// Whether the invocation produced usable output
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Timeout => write!(f, "timeout"),
            Self::Crashed => write!(f, "crashed"),
            Self::NonZeroExit(code) => write!(f, "non-zero-exit({code})"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of running one artifact on one test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Test case index
    pub index: usize,
    /// Completion status
    pub status: ExecutionStatus,
    /// Captured standard output (the produced value)
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Successful result with `stdout`
    #[must_use]
    pub fn ok(index: usize, stdout: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            index,
            status: ExecutionStatus::Ok,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms,
        }
    }

    /// Failed result with `status` and `stderr`
    #[must_use]
    pub fn failed(
        index: usize,
        status: ExecutionStatus,
        stderr: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            index,
            status,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms,
        }
    }
}

/// Limits applied to a single invocation
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// Per-invocation timeout
    pub timeout: Duration,
    /// Run-wide cancellation
    pub cancel: CancellationToken,
    /// Run-wide deadline
    pub deadline: RunDeadline,
}

impl InvocationContext {
    /// Context with only a timeout
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
            deadline: RunDeadline::none(),
        }
    }

    /// Whether the run has been cancelled or has passed its deadline
    #[must_use]
    pub fn interrupted(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.expired()
    }
}

/// Something that can be run against a test case
pub trait Artifact: Send + Sync {
    /// Human-readable name for logs and reports
    fn name(&self) -> &str;

    /// Run on `case` within `ctx`'s limits
    ///
    /// Implementations never panic and never return errors: every failure
    /// mode is an [`ExecutionStatus`].
    fn invoke(&self, case: &TestCase, ctx: &InvocationContext) -> ExecutionResult;
}

/// In-process artifact backed by a function
///
/// `Err(message)` from the function is reported as `non-zero-exit(1)`, a
/// panic as `crashed`. Each call runs on its own thread; a call that
/// outlives its timeout or the run is abandoned and reported as `timeout`
/// or `cancelled`, while the thread is left to finish on its own.
pub struct FnArtifact<F> {
    name: String,
    func: Arc<F>,
}

impl<F> FnArtifact<F>
where
    F: Fn(&InputVector) -> std::result::Result<String, String> + Send + Sync + 'static,
{
    /// Wrap `func` as an artifact called `name`
    #[must_use]
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl<F> std::fmt::Debug for FnArtifact<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnArtifact").field("name", &self.name).finish()
    }
}

impl<F> Artifact for FnArtifact<F>
where
    F: Fn(&InputVector) -> std::result::Result<String, String> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, case: &TestCase, ctx: &InvocationContext) -> ExecutionResult {
        if ctx.interrupted() {
            return ExecutionResult::failed(case.index, ExecutionStatus::Cancelled, "", 0);
        }
        let start = Instant::now();
        let (tx, rx) = mpsc::channel();
        let func = Arc::clone(&self.func);
        let inputs = case.inputs.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("{}-case-{}", self.name, case.index))
            .spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| func(&inputs)));
                let _ = tx.send(outcome);
            });
        if let Err(e) = spawned {
            return ExecutionResult::failed(
                case.index,
                ExecutionStatus::Crashed,
                format!("failed to start {}: {e}", self.name),
                0,
            );
        }

        let outcome = loop {
            let wait = ctx.timeout.saturating_sub(start.elapsed()).min(FN_POLL_INTERVAL);
            match rx.recv_timeout(wait) {
                Ok(outcome) => break outcome,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return ExecutionResult::failed(
                        case.index,
                        ExecutionStatus::Crashed,
                        "no result",
                        start.elapsed().as_millis() as u64,
                    );
                }
            }
            if start.elapsed() >= ctx.timeout {
                return timed_out(case, ctx, start.elapsed());
            }
            if ctx.interrupted() {
                return ExecutionResult::failed(
                    case.index,
                    ExecutionStatus::Cancelled,
                    "",
                    start.elapsed().as_millis() as u64,
                );
            }
        };
        let elapsed = start.elapsed();
        let duration_ms = elapsed.as_millis() as u64;

        if elapsed >= ctx.timeout {
            return timed_out(case, ctx, elapsed);
        }

        match outcome {
            Ok(Ok(stdout)) => ExecutionResult::ok(case.index, stdout, duration_ms),
            Ok(Err(message)) => ExecutionResult::failed(
                case.index,
                ExecutionStatus::NonZeroExit(1),
                message,
                duration_ms,
            ),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic".to_string());
                ExecutionResult::failed(case.index, ExecutionStatus::Crashed, message, duration_ms)
            }
        }
    }
}

fn timed_out(case: &TestCase, ctx: &InvocationContext, elapsed: Duration) -> ExecutionResult {
    ExecutionResult::failed(
        case.index,
        ExecutionStatus::Timeout,
        format!("exceeded {}ms", ctx.timeout.as_millis()),
        elapsed.as_millis() as u64,
    )
}
