//! Per-chunk retry bound.
//!
//! A failed range is requeued until its retry counter reaches `max_retries`;
//! after that the whole job fails. The delay before requeueing defaults to
//! zero and can be turned into a capped exponential backoff via config.

use std::time::Duration;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry; escalate to a job-fatal error.
    NoRetry,
    /// Requeue the range after the given delay.
    RetryAfter(Duration),
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Number of failures a single range may accumulate before the job aborts.
    pub max_retries: u32,
    /// Base delay for backoff. Zero requeues immediately.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Decide what to do after a range failed for the `retries`-th time (1-based,
    /// already incremented). Non-retryable errors never reach this point.
    pub fn decide(&self, retries: u32) -> RetryDecision {
        if retries >= self.max_retries {
            return RetryDecision::NoRetry;
        }
        if self.base_delay.is_zero() {
            return RetryDecision::RetryAfter(Duration::ZERO);
        }
        // base * 2^(retries-1), capped.
        let exp = 1u32 << retries.saturating_sub(1).min(8);
        let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);
        RetryDecision::RetryAfter(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requeues_below_bound() {
        let p = RetryPolicy::with_max_retries(3);
        assert_eq!(p.decide(1), RetryDecision::RetryAfter(Duration::ZERO));
        assert_eq!(p.decide(2), RetryDecision::RetryAfter(Duration::ZERO));
        assert_eq!(p.decide(3), RetryDecision::NoRetry);
        assert_eq!(p.decide(4), RetryDecision::NoRetry);
    }

    #[test]
    fn zero_bound_never_retries() {
        let p = RetryPolicy::with_max_retries(0);
        assert_eq!(p.decide(1), RetryDecision::NoRetry);
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let p = RetryPolicy {
            max_retries: 20,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        let d = |n| match p.decide(n) {
            RetryDecision::RetryAfter(d) => d,
            RetryDecision::NoRetry => panic!("expected retry"),
        };
        assert_eq!(d(1), Duration::from_millis(100));
        assert_eq!(d(2), Duration::from_millis(200));
        assert_eq!(d(3), Duration::from_millis(400));
        assert_eq!(d(10), Duration::from_secs(1));
    }
}
