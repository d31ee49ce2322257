//! Retry policies and per-activity options.

use std::time::Duration;

/// How the runtime retries a failed activity attempt.
///
/// The delay after attempt `n` is `initial_interval * backoff_coefficient^(n-1)`,
/// capped at `maximum_interval`. `maximum_attempts == 0` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
    pub maximum_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(100),
            maximum_attempts: 0,
        }
    }
}

impl RetryPolicy {
    /// Default backoff, at most `attempts` attempts.
    pub fn limited(attempts: u32) -> Self {
        Self {
            maximum_attempts: attempts.max(1),
            ..Self::default()
        }
    }

    /// Retries forever with exponential backoff.
    pub fn unlimited(initial_interval: Duration, maximum_interval: Duration) -> Self {
        Self {
            initial_interval,
            maximum_interval,
            ..Self::default()
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.maximum_attempts == 0
    }

    /// Returns true once `attempt` (1-based) was the last one allowed.
    pub fn attempts_exhausted(&self, attempt: u32) -> bool {
        !self.is_unlimited() && attempt >= self.maximum_attempts
    }

    /// Delay to wait after the failed attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let factor = self.backoff_coefficient.max(1.0).powi(exponent);
        let delay = self.initial_interval.as_secs_f64() * factor;

        if !delay.is_finite() || delay >= self.maximum_interval.as_secs_f64() {
            self.maximum_interval
        } else {
            Duration::from_secs_f64(delay)
        }
    }
}

/// Options for a single activity invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityOptions {
    /// Upper bound of one attempt; an attempt running longer is a timeout.
    pub start_to_close_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl ActivityOptions {
    pub fn new(start_to_close_timeout: Duration, retry_policy: RetryPolicy) -> Self {
        Self {
            start_to_close_timeout,
            retry_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = RetryPolicy::unlimited(Duration::from_secs(1), Duration::from_secs(30));

        let delays: Vec<u64> = (1..=7)
            .map(|n| policy.delay_for_attempt(n).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
        assert_eq!(policy.delay_for_attempt(1000), Duration::from_secs(30));
    }

    #[test]
    fn test_limited_policy_exhausts() {
        let policy = RetryPolicy::limited(3);
        assert!(!policy.attempts_exhausted(1));
        assert!(!policy.attempts_exhausted(2));
        assert!(policy.attempts_exhausted(3));
    }

    #[test]
    fn test_unlimited_policy_never_exhausts() {
        let policy = RetryPolicy::default();
        assert!(policy.is_unlimited());
        assert!(!policy.attempts_exhausted(u32::MAX));
    }

    #[test]
    fn test_zero_limited_attempts_means_one() {
        assert_eq!(RetryPolicy::limited(0).maximum_attempts, 1);
    }
}
