//! Reconnect policies and the retry context they consume.

use std::time::{Duration, Instant};

use crate::error::ClientError;

/// Inputs to a [`ReconnectPolicy`] decision.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Number of attempts that have already failed in this episode. The
    /// first attempt of an episode sees `0`.
    pub failed_attempts_count: u32,
    /// When the current reconnect episode began. Captured on the first
    /// failure of the episode and retained across all of its attempts.
    pub reconnect_start_time: Instant,
    /// The error that triggered the current attempt.
    pub error: ClientError,
}

/// Decides whether and when the next reconnect attempt happens.
pub trait ReconnectPolicy: Send + Sync {
    /// Returns the delay before the next attempt, or `None` to give up.
    fn next_attempt_interval(&self, context: &RetryContext) -> Option<Duration>;
}

/// Walks a fixed ladder of intervals, then gives up.
pub struct IntervalReconnectPolicy {
    intervals: Vec<Duration>,
}

impl IntervalReconnectPolicy {
    /// Creates a policy from an explicit ladder of intervals.
    pub fn new(intervals: Vec<Duration>) -> Self {
        Self { intervals }
    }
}

impl Default for IntervalReconnectPolicy {
    /// The stock ladder: retry immediately, then after 2, 10, and 30
    /// seconds, then give up.
    fn default() -> Self {
        Self::new(vec![
            Duration::ZERO,
            Duration::from_secs(2),
            Duration::from_secs(10),
            Duration::from_secs(30),
        ])
    }
}

impl ReconnectPolicy for IntervalReconnectPolicy {
    fn next_attempt_interval(&self, context: &RetryContext) -> Option<Duration> {
        self.intervals.get(context.failed_attempts_count as usize).copied()
    }
}

/// Never reconnects.
pub struct NoReconnectPolicy;

impl ReconnectPolicy for NoReconnectPolicy {
    fn next_attempt_interval(&self, _context: &RetryContext) -> Option<Duration> {
        None
    }
}
