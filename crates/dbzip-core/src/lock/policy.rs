//! Lock acquisition wait policies

use std::fmt;
use std::time::Duration;

/// How long `acquire` may block when the lock is held by someone else
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Try once and fail immediately if the lock is held
    FailFast,
    /// Block until the holder releases
    Forever,
    /// Block up to the given duration
    Bounded(Duration),
}

impl WaitPolicy {
    /// Map a millisecond timeout: negative waits forever, zero fails fast,
    /// positive waits up to that many milliseconds.
    pub fn from_millis(timeout_ms: i64) -> Self {
        match timeout_ms {
            t if t < 0 => WaitPolicy::Forever,
            0 => WaitPolicy::FailFast,
            t => WaitPolicy::Bounded(Duration::from_millis(t as u64)),
        }
    }

    /// Policy for a caller that either does not wait or waits with an optional bound
    pub fn for_wait(wait: bool, max_wait: Option<Duration>) -> Self {
        match (wait, max_wait) {
            (false, _) => WaitPolicy::FailFast,
            (true, None) => WaitPolicy::Forever,
            (true, Some(limit)) if limit.is_zero() => WaitPolicy::FailFast,
            (true, Some(limit)) => WaitPolicy::Bounded(limit),
        }
    }

    pub fn is_fail_fast(&self) -> bool {
        matches!(self, WaitPolicy::FailFast)
    }
}

impl fmt::Display for WaitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitPolicy::FailFast => f.write_str("fail-fast"),
            WaitPolicy::Forever => f.write_str("wait-forever"),
            WaitPolicy::Bounded(limit) => write!(f, "wait-up-to {}ms", limit.as_millis()),
        }
    }
}
