//! Exponential retry backoff with jitter.

use cadence_core::config::RetryConfig;
use chrono::Duration;
use rand::Rng;

/// Computes retry delays: `base * 2^(attempt-1)` capped at `max`, with
/// uniform jitter of `±jitter_pct` applied after the cap.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base_secs: u64,
    max_secs: u64,
    jitter_pct: f64,
}

impl BackoffPolicy {
    pub fn new(retry: &RetryConfig) -> Self {
        Self {
            base_secs: retry.base_delay_secs,
            max_secs: retry.max_delay_secs,
            jitter_pct: retry.jitter_pct,
        }
    }

    /// Delay before retry `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let uncapped = self.base_secs.saturating_mul(1u64 << exponent);
        let capped = uncapped.min(self.max_secs) as f64;

        let jitter = rand::thread_rng().gen_range(-self.jitter_pct..=self.jitter_pct);
        let secs = (capped * (1.0 + jitter)).max(0.0);
        Duration::milliseconds((secs * 1000.0) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(&RetryConfig {
            base_delay_secs: 60,
            max_delay_secs: 86_400,
            jitter_pct: 0.2,
            max_attempts: 5,
        })
    }

    #[test]
    fn test_delay_within_jitter_band() {
        let policy = policy();
        for attempt in 1..=10u32 {
            let expected = (60u64 * 2u64.pow(attempt - 1)).min(86_400) as f64;
            let lo = expected * 0.8 - 1.0;
            let hi = expected * 1.2 + 1.0;

            for _ in 0..20 {
                let delay = policy.delay_for_attempt(attempt);
                let secs = delay.num_milliseconds() as f64 / 1000.0;
                assert!(
                    secs >= lo && secs <= hi,
                    "attempt {}: delay {}s outside [{}, {}]",
                    attempt,
                    secs,
                    lo,
                    hi
                );
            }
        }
    }

    #[test]
    fn test_delay_caps_at_one_day() {
        let policy = policy();
        // Attempt 12 would be 60 * 2^11 = 122_880s uncapped.
        let delay = policy.delay_for_attempt(12);
        let secs = delay.num_milliseconds() as f64 / 1000.0;
        assert!(secs <= 86_400.0 * 1.2 + 1.0);
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy = BackoffPolicy::new(&RetryConfig {
            base_delay_secs: 60,
            max_delay_secs: 86_400,
            jitter_pct: 0.0,
            max_attempts: 5,
        });
        assert_eq!(policy.delay_for_attempt(1), Duration::seconds(60));
        assert_eq!(policy.delay_for_attempt(2), Duration::seconds(120));
        assert_eq!(policy.delay_for_attempt(3), Duration::seconds(240));
    }
}
