//! Run-wide cancellation
//!
//! Workers share a cancellation token and a deadline. Both are checked
//! before each test case starts and inside every process wait loop; the pool
//! itself is never torn down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared, clonable cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create an un-cancelled token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every holder of this token
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Optional overall deadline for a validation run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunDeadline {
    at: Option<Instant>,
}

impl RunDeadline {
    /// No deadline
    #[must_use]
    pub const fn none() -> Self {
        Self { at: None }
    }

    /// Deadline `budget` from now
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Some(Instant::now() + budget),
        }
    }

    /// Deadline `timeout_ms` from now, if any
    #[must_use]
    pub fn from_millis(timeout_ms: Option<u64>) -> Self {
        timeout_ms.map_or_else(Self::none, |ms| Self::after(Duration::from_millis(ms)))
    }

    /// Whether the deadline has passed
    #[must_use]
    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left, or `None` without a deadline
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }
}
