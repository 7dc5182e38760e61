//! # Retry Backoff
//!
//! Capped exponential backoff with additive jitter:
//!
//! ```text
//! delay(n) = min(max_delay, base_delay * multiplier^(n-1) * (1 + U[0, jitter_factor)))
//! ```
//!
//! where `n >= 1` is the attempt count after the failed attempt. A server-supplied
//! `Retry-After` replaces the computed delay but is still capped at `max_delay`.

use std::time::Duration;

use crate::config::BackoffConfig;

#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    config: BackoffConfig,
}

impl BackoffCalculator {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Delay before the next attempt after `attempt_number` failed attempts
    pub fn delay_for_attempt(&self, attempt_number: u32) -> Duration {
        let jitter = if self.config.jitter_factor > 0.0 {
            fastrand::f64() * self.config.jitter_factor
        } else {
            0.0
        };
        self.delay_with_jitter(attempt_number, jitter)
    }

    /// Delay for a retry, preferring the server's value when it gave one
    pub fn retry_delay(&self, attempt_number: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(requested) => requested.min(self.config.max_delay()),
            None => self.delay_for_attempt(attempt_number),
        }
    }

    fn delay_with_jitter(&self, attempt_number: u32, jitter: f64) -> Duration {
        let max_ms = self.config.max_delay_ms as f64;
        let exponent = attempt_number.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.config.base_delay_ms as f64
            * self.config.multiplier.powi(exponent)
            * (1.0 + jitter);

        // powi overflows to infinity long before u64 millis would
        if !delay_ms.is_finite() || delay_ms >= max_ms {
            return self.config.max_delay();
        }
        Duration::from_millis(delay_ms as u64)
    }
}

impl Default for BackoffCalculator {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn no_jitter() -> BackoffCalculator {
        BackoffCalculator::new(BackoffConfig {
            jitter_factor: 0.0,
            ..BackoffConfig::default()
        })
    }

    #[test]
    fn test_exponential_curve_without_jitter() {
        let calculator = no_jitter();
        assert_eq!(calculator.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(calculator.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(calculator.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(calculator.delay_for_attempt(0), Duration::from_secs(2));
    }

    #[test]
    fn test_delay_is_capped() {
        let calculator = no_jitter();
        assert_eq!(calculator.delay_for_attempt(8), Duration::from_secs(256));
        assert_eq!(calculator.delay_for_attempt(9), Duration::from_secs(300));
        assert_eq!(calculator.delay_for_attempt(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn test_retry_after_is_honoured_but_capped() {
        let calculator = no_jitter();
        assert_eq!(
            calculator.retry_delay(5, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        assert_eq!(
            calculator.retry_delay(1, Some(Duration::from_secs(3600))),
            Duration::from_secs(300)
        );
        assert_eq!(calculator.retry_delay(1, None), Duration::from_secs(2));
    }

    #[test]
    fn test_zero_base_delay_means_immediate_retry() {
        let calculator = BackoffCalculator::new(BackoffConfig {
            base_delay_ms: 0,
            ..BackoffConfig::default()
        });
        assert_eq!(calculator.delay_for_attempt(4), Duration::ZERO);
    }

    proptest! {
        #[test]
        fn prop_delay_stays_within_bounds(attempt in 1u32..64, jitter in 0.0f64..0.5) {
            let calculator = BackoffCalculator::new(BackoffConfig {
                jitter_factor: jitter,
                ..BackoffConfig::default()
            });
            let delay = calculator.delay_for_attempt(attempt);
            let floor = no_jitter().delay_for_attempt(attempt);

            prop_assert!(delay >= floor);
            prop_assert!(delay <= calculator.config().max_delay());
        }

        #[test]
        fn prop_delay_never_shrinks_with_attempts(attempt in 1u32..40) {
            let calculator = no_jitter();
            prop_assert!(calculator.delay_for_attempt(attempt + 1) >= calculator.delay_for_attempt(attempt));
        }
    }
}
