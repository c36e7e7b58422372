//! # Retry Policy
//!
//! Bounded linear backoff for optimistic conflicts.
//!
//! ```text
//! attempt 1 ── conflict ── sleep 1 × base ──► attempt 2
//! attempt 2 ── conflict ── sleep 2 × base ──► attempt 3
//! ...
//! attempt max_retries + 1 ── conflict ──► schedule returns None
//!                                          └─► AllocationFailed { attempts }
//! ```
//!
//! There is no wall-clock timeout; the bound is the attempt count.

use std::time::Duration;

use backoff::backoff::Backoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration) -> Self {
        RetryPolicy {
            max_retries,
            base_backoff,
        }
    }

    /// Never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// A fresh schedule for one request.
    pub fn schedule(&self) -> LinearBackoff {
        LinearBackoff {
            policy: *self,
            retries: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

/// Yields `base × n` before retry `n`, then `None` once the budget is spent.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    policy: RetryPolicy,
    retries: u32,
}

impl LinearBackoff {
    /// Retries handed out so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }
}

impl Backoff for LinearBackoff {
    fn reset(&mut self) {
        self.retries = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries >= self.policy.max_retries {
            return None;
        }
        self.retries += 1;
        Some(self.policy.base_backoff.saturating_mul(self.retries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_schedule() {
        let mut schedule = RetryPolicy::default().schedule();
        assert_eq!(schedule.next_backoff(), Some(Duration::from_millis(50)));
        assert_eq!(schedule.next_backoff(), Some(Duration::from_millis(100)));
        assert_eq!(schedule.next_backoff(), Some(Duration::from_millis(150)));
        assert_eq!(schedule.next_backoff(), None);
        assert_eq!(schedule.retries(), 3);

        schedule.reset();
        assert_eq!(schedule.next_backoff(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_attempt_budget() {
        assert_eq!(RetryPolicy::default().max_attempts(), 4);
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
        assert_eq!(RetryPolicy::none().schedule().next_backoff(), None);
    }
}
