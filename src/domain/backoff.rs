//! Error backoff for periodic background cycles.
//!
//! Delay after the n-th consecutive failure is `min(cap, base * n)`:
//! with the default 2 s base and 30 s cap the sequence is
//! 2 s, 4 s, 6 s, ... 30 s, 30 s. One success resets the counter.

use std::time::Duration;

/// Consecutive-failure counter with a capped, linearly growing delay.
#[derive(Debug, Clone)]
pub struct ErrorBackoff {
    base: Duration,
    cap: Duration,
    errors: u32,
}

impl ErrorBackoff {
    /// Create a backoff with the given base step and ceiling.
    pub const fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            errors: 0,
        }
    }

    /// Record a failed cycle and return how long to wait before retrying.
    pub fn record_failure(&mut self) -> Duration {
        self.errors = self.errors.saturating_add(1);
        self.current_delay()
    }

    /// Record a successful cycle; the next failure starts from `base` again.
    pub const fn record_success(&mut self) {
        self.errors = 0;
    }

    /// Number of consecutive failures so far.
    pub const fn errors(&self) -> u32 {
        self.errors
    }

    /// Delay that corresponds to the current error count.
    pub fn current_delay(&self) -> Duration {
        self.base.saturating_mul(self.errors).min(self.cap)
    }
}

impl Default for ErrorBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(30))
    }
}
