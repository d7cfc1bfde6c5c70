//! `LivenessTracker`: relay health across connection attempts.
//!
//! Pure state machine: the connection manager reports attempts, successes
//! and failures, the tracker classifies and answers with retry decisions.
//! Within one failure streak a relay moves `Online → Offline → Dead`;
//! leaving `Dead` requires `remove` followed by an explicit connect.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use super::backoff::BackoffPolicy;
use super::types::{Admission, LivenessRecord, LivenessState, RetryDecision};
use crate::relay::RelayKey;

struct Tracked {
    record: LivenessRecord,
    /// Set by `remove`; lets the next explicit connect revive a dead relay.
    removed: bool,
}

/// Tracks liveness for every relay ever dialled in this session.
pub struct LivenessTracker {
    records: HashMap<RelayKey, Tracked>,
    policy: BackoffPolicy,
}

impl LivenessTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            records: HashMap::new(),
            policy,
        }
    }

    fn tracked(&mut self, url: &RelayKey) -> &mut Tracked {
        self.records.entry(url.clone()).or_insert_with(|| Tracked {
            record: LivenessRecord::new(url.clone()),
            removed: false,
        })
    }

    /// Returns the record for a relay, if it was ever dialled.
    #[must_use]
    pub fn get(&self, url: &RelayKey) -> Option<&LivenessRecord> {
        self.records.get(url).map(|t| &t.record)
    }

    /// Returns every record.
    pub fn records(&self) -> impl Iterator<Item = &LivenessRecord> {
        self.records.values().map(|t| &t.record)
    }

    /// Decides whether an explicit connect may start an attempt.
    ///
    /// Creates the record on first use. A removed dead relay is revived to
    /// `Offline` with its failure history kept and its backoff ending `now`.
    pub fn admit(&mut self, url: &RelayKey, now: Instant) -> Admission {
        let tracked = self.tracked(url);
        let removed = std::mem::take(&mut tracked.removed);

        if tracked.record.state != LivenessState::Dead {
            return Admission::Allowed;
        }
        if !removed {
            return Admission::Refused;
        }

        tracked.record.state = LivenessState::Offline;
        tracked.record.backoff_until = Some(now);
        Admission::Revived
    }

    /// Records a confirmed connect.
    pub fn record_success(&mut self, url: &RelayKey, seen_at: i64) -> &LivenessRecord {
        let record = &mut self.tracked(url).record;
        record.failure_count = 0;
        record.state = LivenessState::Online;
        record.backoff_until = None;
        record.last_seen_at = Some(seen_at);
        record
    }

    /// Records one failed attempt and decides on the next retry.
    pub fn record_failure(&mut self, url: &RelayKey, now: Instant) -> RetryDecision {
        let failures = self.tracked(url).record.failure_count.saturating_add(1);
        let until = now + self.policy.delay_for(failures);
        let threshold = self.policy.dead_threshold();

        let record = &mut self.tracked(url).record;
        record.failure_count = failures;
        record.backoff_until = Some(until);
        record.state = if record.state == LivenessState::Dead || record.failure_count >= threshold
        {
            LivenessState::Dead
        } else {
            LivenessState::Offline
        };

        if record.state == LivenessState::Dead {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAt(until)
        }
    }

    /// Marks a relay as removed from the registry. History is kept.
    pub fn mark_removed(&mut self, url: &RelayKey) {
        if let Some(tracked) = self.records.get_mut(url) {
            tracked.removed = true;
        }
    }

    /// Explicitly clears a relay's failure history.
    pub fn reset(&mut self, url: &RelayKey) -> Option<&LivenessRecord> {
        let tracked = self.records.get_mut(url)?;
        let last_seen_at = tracked.record.last_seen_at;
        tracked.record = LivenessRecord::new(url.clone());
        tracked.record.last_seen_at = last_seen_at;
        tracked.removed = false;
        Some(&tracked.record)
    }

    /// Time until the relay may be retried automatically.
    ///
    /// `Some(ZERO)` for unknown relays, `None` for dead ones.
    #[must_use]
    pub fn backoff_remaining(&self, url: &RelayKey, now: Instant) -> Option<Duration> {
        self.get(url)
            .map_or(Some(Duration::ZERO), |record| record.backoff_remaining(now))
    }
}
