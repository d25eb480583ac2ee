//! Exponential reconnect backoff for the remote.
//!
//! After a transport closes, the remote waits
//! `min(base × growth^(attempt − 1), cap)` before attempt number `attempt`.
//! With the default policy the schedule is
//! 1000, 1500, 2250, 3375, 5063, 7594, 10000, 10000, 10000, 10000 ms, after
//! which no further automatic attempt is made.
//!
//! The counter resets to zero after a successful connect.  A manual reconnect
//! requested by the user ignores the schedule entirely: callers call
//! [`ReconnectBackoff::reset`] and connect immediately.

use std::time::Duration;

/// Parameters of the backoff curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first attempt.
    pub base: Duration,
    /// Multiplier applied per attempt.
    pub growth: f64,
    /// Upper bound on any single delay.
    pub cap: Duration,
    /// Number of automatic attempts before giving up.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            growth: 1.5,
            cap: Duration::from_millis(10_000),
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    /// Delay before attempt number `attempt` (1-based), rounded to whole ms.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw_ms = self.base.as_millis() as f64 * self.growth.powi(exponent);
        let capped_ms = raw_ms.min(self.cap.as_millis() as f64);
        Duration::from_millis(capped_ms.round() as u64)
    }
}

/// Attempt counter driving a [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    policy: BackoffPolicy,
    attempts: u32,
}

impl ReconnectBackoff {
    /// Creates a counter at zero attempts.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Records one more attempt and returns how long to wait before it.
    ///
    /// Returns `None` once `max_attempts` attempts have been issued; the
    /// counter stays exhausted until [`reset`](Self::reset).
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.policy.delay_for(self.attempts))
    }

    /// Clears the attempt counter (successful connect or manual reconnect).
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Number of attempts issued since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns `true` once no automatic attempt remains.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
