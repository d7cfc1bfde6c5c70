//! Capped exponential backoff curve.

use std::time::Duration;

use crate::config::BackoffConfig;

/// Computes the retry delay for a given number of consecutive failures.
///
/// `delay(n) = min(base * multiplier^(n - 1), max)`. Strictly increasing in
/// `n` until it reaches the cap, then constant.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    multiplier: f64,
    dead_threshold: u32,
}

impl BackoffPolicy {
    /// Creates a policy from validated configuration.
    #[must_use]
    pub const fn new(config: &BackoffConfig) -> Self {
        Self {
            base: config.base_delay(),
            max: config.max_delay(),
            multiplier: config.multiplier,
            dead_threshold: config.dead_threshold,
        }
    }

    /// Delay before the next automatic retry after `failures` consecutive
    /// failures. Zero failures means no delay.
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exponent);

        // powi overflows to infinity long before Duration would.
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Consecutive failures at which a relay becomes dead.
    #[must_use]
    pub const fn dead_threshold(&self) -> u32 {
        self.dead_threshold
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(&BackoffConfig::default())
    }
}
