//! Types for relay liveness.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::relay::RelayKey;

/// Session-scoped health classification of a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessState {
    /// Last attempt succeeded, or no failure recorded yet.
    Online,
    /// Failing, automatic retries continue with backoff.
    Offline,
    /// Failed too often; automatic retries stopped.
    Dead,
}

/// Liveness history of one relay.
///
/// Serializes without `backoff_until`: a monotonic instant means nothing
/// outside this process. Use [`LivenessRecord::backoff_remaining`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LivenessRecord {
    /// The relay URL.
    pub url: RelayKey,
    /// Current classification.
    pub state: LivenessState,
    /// Consecutive failures, reset on success.
    pub failure_count: u32,
    /// No automatic retry before this instant.
    #[serde(skip)]
    pub backoff_until: Option<Instant>,
    /// Last confirmed connect (Unix timestamp).
    pub last_seen_at: Option<i64>,
}

impl LivenessRecord {
    pub(crate) const fn new(url: RelayKey) -> Self {
        Self {
            url,
            state: LivenessState::Online,
            failure_count: 0,
            backoff_until: None,
            last_seen_at: None,
        }
    }

    /// Time left until automatic retry is allowed.
    ///
    /// `None` for a dead relay: no retry will be scheduled.
    #[must_use]
    pub fn backoff_remaining(&self, now: Instant) -> Option<Duration> {
        if self.state == LivenessState::Dead {
            return None;
        }
        Some(
            self.backoff_until
                .map_or(Duration::ZERO, |until| until.saturating_duration_since(now)),
        )
    }
}

/// What the connection manager should do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry automatically at this instant.
    RetryAt(Instant),
    /// The relay is dead; do not retry automatically.
    GiveUp,
}

/// Result of asking whether an explicit connect may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The relay is not dead.
    Allowed,
    /// The relay was dead and removed; it re-enters rotation.
    Revived,
    /// The relay is dead and has not been removed.
    Refused,
}
