//! Exponential backoff with jitter for retried outbound calls.

use std::time::Duration;

use rand::Rng;

/// Retry delay policy.
///
/// The deterministic component is `base * 2^attempt` clamped to `max_delay`.
/// A uniform jitter in `[0, max_jitter]` is added on top so concurrent callers
/// don't retry in lockstep, and the sum is clamped to `max_delay` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry, without jitter.
    pub base_delay: Duration,
    /// Upper bound for any returned delay.
    pub max_delay: Duration,
    /// Upper bound for the random jitter term.
    pub max_jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            max_jitter,
        }
    }

    /// Set the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the maximum jitter.
    #[must_use]
    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Delay before retrying after attempt `attempt` (0-indexed).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let max_jitter_ms = duration_ms(self.max_jitter);
        let jitter_ms = if max_jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=max_jitter_ms)
        };
        self.delay_with_jitter(attempt, Duration::from_millis(jitter_ms))
    }

    /// Deterministic part of [`Self::delay`]: `base * 2^attempt`, clamped.
    #[must_use]
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let exponential = duration_ms(self.base_delay).saturating_mul(factor);
        Duration::from_millis(exponential.min(duration_ms(self.max_delay)))
    }

    fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        (self.base_delay_for(attempt) + jitter).min(self.max_delay)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
        assert_eq!(policy.max_delay, Duration::from_millis(10_000));
        assert_eq!(policy.max_jitter, Duration::from_millis(1000));
    }

    #[test]
    fn test_exponential_growth() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base_delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.base_delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.base_delay_for(2), Duration::from_millis(4000));
        assert_eq!(policy.base_delay_for(3), Duration::from_millis(8000));
    }

    #[test]
    fn test_deterministic_component_clamped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base_delay_for(4), Duration::from_millis(10_000));
        assert_eq!(policy.base_delay_for(10), Duration::from_millis(10_000));
        assert_eq!(policy.base_delay_for(200), Duration::from_millis(10_000));
    }

    #[test]
    fn test_deterministic_component_non_decreasing() {
        let policy = BackoffPolicy::default().with_base_delay(Duration::from_millis(37));
        let mut previous = Duration::ZERO;
        for attempt in 0..80 {
            let current = policy.base_delay_for(attempt);
            assert!(current >= previous, "attempt {attempt} decreased");
            previous = current;
        }
    }

    #[test]
    fn test_delay_never_exceeds_max() {
        let policy = BackoffPolicy::default();
        for attempt in 0..20 {
            for _ in 0..50 {
                assert!(policy.delay(attempt) <= policy.max_delay);
            }
        }
    }

    #[test]
    fn test_delay_within_jitter_range() {
        let policy = BackoffPolicy::default();
        for _ in 0..100 {
            let d0 = policy.delay(0);
            assert!(d0 >= Duration::from_millis(1000) && d0 <= Duration::from_millis(2000));
            let d2 = policy.delay(2);
            assert!(d2 >= Duration::from_millis(4000) && d2 <= Duration::from_millis(5000));
        }
    }

    #[test]
    fn test_jitter_clamped_at_ceiling() {
        let policy = BackoffPolicy::default();
        assert_eq!(
            policy.delay_with_jitter(5, Duration::from_millis(999)),
            Duration::from_millis(10_000)
        );
        assert_eq!(
            policy.delay_with_jitter(1, Duration::from_millis(500)),
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy = BackoffPolicy::default().with_max_jitter(Duration::ZERO);
        assert_eq!(policy.delay(1), Duration::from_millis(2000));
        assert_eq!(policy.delay(1), policy.delay(1));
    }

    #[test]
    fn test_jitter_varies() {
        let policy = BackoffPolicy::default();
        let samples: std::collections::HashSet<Duration> =
            (0..20).map(|_| policy.delay(0)).collect();
        assert!(samples.len() > 1);
    }
}
