//! Pool configuration.
//!
//! All durations are stored as integer seconds or milliseconds so the
//! configuration can be loaded from JSON written by hand.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::AuthPreference;
use crate::relay::{RelayError, RelayResult};

/// Upper bound on every configured duration (one week).
///
/// Deadlines are computed as `Instant::now() + duration`, which panics on
/// overflow; anything longer than this is rejected up front.
pub const MAX_CONFIG_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

fn check_duration(name: &str, duration: Duration) -> RelayResult<()> {
    if duration > MAX_CONFIG_DURATION {
        return Err(RelayError::Configuration(format!(
            "{name} must not exceed {} seconds",
            MAX_CONFIG_DURATION.as_secs()
        )));
    }
    Ok(())
}

/// Backoff curve and dead classification for the liveness tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay after the first failure, in milliseconds.
    pub base_delay_ms: u64,
    /// Growth factor per consecutive failure. Must be greater than 1.
    pub multiplier: f64,
    /// Ceiling on the delay, in seconds.
    pub max_delay_secs: u64,
    /// Consecutive failures after which a relay is classified dead.
    pub dead_threshold: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_secs: 300,
            dead_threshold: 5,
        }
    }
}

impl BackoffConfig {
    /// Delay after the first failure.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Ceiling on the delay.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    /// Checks that the curve is well formed.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Configuration`] describing the first bad value.
    pub fn validate(&self) -> RelayResult<()> {
        if self.base_delay_ms == 0 {
            return Err(RelayError::Configuration(
                "base_delay_ms must be greater than zero".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier <= 1.0 {
            return Err(RelayError::Configuration(format!(
                "multiplier must be a finite number greater than 1, got {}",
                self.multiplier
            )));
        }
        if self.max_delay() < self.base_delay() {
            return Err(RelayError::Configuration(
                "max_delay_secs must not be shorter than base_delay_ms".to_string(),
            ));
        }
        check_duration("max_delay_secs", self.max_delay())?;
        // A threshold of 1 would jump straight from online to dead.
        if self.dead_threshold < 2 {
            return Err(RelayError::Configuration(
                "dead_threshold must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for a [`RelayPool`](crate::RelayPool).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// How long a connect attempt may stay pending before it counts as failed.
    pub connect_timeout_secs: u64,
    /// How long an open connection must stay up, without inbound data, to
    /// count as a successful connect.
    pub confirm_after_ms: u64,
    /// How long an `ask` prompt may stay unanswered. `None` waits forever.
    pub ask_timeout_secs: Option<u64>,
    /// Accept plaintext `ws://` relays.
    pub allow_plaintext: bool,
    /// Preference used for relays without a stored one.
    pub default_auth_preference: AuthPreference,
    /// Retry backoff and dead classification.
    pub backoff: BackoffConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            confirm_after_ms: 3_000,
            ask_timeout_secs: None,
            allow_plaintext: false,
            default_auth_preference: AuthPreference::Ask,
            backoff: BackoffConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Parses and validates a JSON configuration. Missing fields take their
    /// default values.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Configuration`] if the JSON is malformed or a
    /// value is out of range.
    pub fn from_json(json: &str) -> RelayResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RelayError::Configuration(format!("Invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Configuration`] describing the first bad value.
    pub fn validate(&self) -> RelayResult<()> {
        if self.connect_timeout_secs == 0 {
            return Err(RelayError::Configuration(
                "connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.ask_timeout_secs == Some(0) {
            return Err(RelayError::Configuration(
                "ask_timeout_secs must be greater than zero when set".to_string(),
            ));
        }
        check_duration("connect_timeout_secs", self.connect_timeout())?;
        check_duration("confirm_after_ms", self.confirm_after())?;
        if let Some(ask_timeout) = self.ask_timeout() {
            check_duration("ask_timeout_secs", ask_timeout)?;
        }
        self.backoff.validate()
    }

    /// Sets the backoff configuration.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the dead threshold.
    #[must_use]
    pub const fn with_dead_threshold(mut self, threshold: u32) -> Self {
        self.backoff.dead_threshold = threshold;
        self
    }

    /// Sets the ask prompt timeout.
    #[must_use]
    pub const fn with_ask_timeout(mut self, timeout: Duration) -> Self {
        self.ask_timeout_secs = Some(timeout.as_secs());
        self
    }

    /// Sets the default auth preference.
    #[must_use]
    pub const fn with_default_auth_preference(mut self, preference: AuthPreference) -> Self {
        self.default_auth_preference = preference;
        self
    }

    /// Allows plaintext `ws://` relays.
    #[must_use]
    pub const fn allowing_plaintext(mut self) -> Self {
        self.allow_plaintext = true;
        self
    }

    /// Connect attempt timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Quiet period after which an open connection counts as a success.
    #[must_use]
    pub const fn confirm_after(&self) -> Duration {
        Duration::from_millis(self.confirm_after_ms)
    }

    /// Ask prompt timeout, if any.
    #[must_use]
    pub fn ask_timeout(&self) -> Option<Duration> {
        self.ask_timeout_secs.map(Duration::from_secs)
    }
}
