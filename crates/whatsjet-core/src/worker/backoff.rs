//! Retry backoff policy

use rand::Rng;
use std::time::Duration;
use whatsjet_common::config::WorkerConfig;

/// Exponential backoff with a cap and random jitter
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: Duration::from_millis(config.retry_base_ms),
            max: Duration::from_millis(config.retry_max_ms),
            jitter: Duration::from_millis(config.retry_jitter_ms),
        }
    }

    /// Whether a job that has used `attempt` retries may be retried again
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// `base * 2^attempt`, capped at `max`
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Backoff before retry number `attempt + 1`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.base_delay(attempt) + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            base: Duration::from_secs(1),
            max: Duration::from_secs(10),
            jitter: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_base_delay_doubles_until_cap() {
        let p = policy();
        let delays: Vec<u64> = (0..6).map(|a| p.base_delay(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
        assert_eq!(p.base_delay(40), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let p = policy();
        for _ in 0..50 {
            let d = p.delay_for(2);
            assert!(d >= Duration::from_secs(4));
            assert!(d <= Duration::from_millis(4_100));
        }
    }

    #[test]
    fn test_retry_budget() {
        let p = policy();
        assert!(p.should_retry(0));
        assert!(p.should_retry(4));
        assert!(!p.should_retry(5));
    }
}
