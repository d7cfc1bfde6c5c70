//! Pool core: the single owner of registry and liveness state.
//!
//! Public commands and asynchronous events both end up here. Commands run
//! synchronously on the caller's thread; transport events, timers, prompt
//! answers and signatures are posted to one channel and applied by a single
//! driver task. Both paths mutate state under the same lock, which is never
//! held across an `.await`.
//!
//! Every connection attempt gets a fresh generation. Events and timers carry
//! the generation they were created for and are dropped once it is stale.
//!
//! Lock order: pool state, then publisher table.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use nostr::Event;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::error::RelayError;
use super::registry::{PoolState, RelayEntry};
use super::types::{ConnectionState, RelayDescriptor};
use super::url::RelayKey;
use crate::auth::{
    AuthPreference, AuthPrompt, AuthSigner, AuthStep, PreferenceStore, SignerError,
};
use crate::config::PoolConfig;
use crate::liveness::{
    Admission, BackoffPolicy, LivenessRecord, LivenessState, LivenessTracker, RetryDecision,
};
use crate::publisher::{StateChange, StatePublisher, Subscription};
use crate::transport::{OutboundFrame, Transport, TransportEvent, TransportSink};

/// Input to the driver task.
#[derive(Debug)]
pub(crate) enum PoolEvent {
    /// Something happened on a transport.
    Transport {
        url: RelayKey,
        generation: u64,
        event: TransportEvent,
    },
    /// The connect timeout of an attempt elapsed.
    ConnectTimeout { url: RelayKey, generation: u64 },
    /// A connection stayed up long enough to count as live.
    ConfirmElapsed { url: RelayKey, generation: u64 },
    /// Backoff of a failed attempt is over.
    RetryDue { url: RelayKey, generation: u64 },
    /// The user answered an auth prompt.
    PromptAnswered {
        url: RelayKey,
        generation: u64,
        round: u64,
        approved: bool,
    },
    /// The signer finished.
    Signed {
        url: RelayKey,
        generation: u64,
        round: u64,
        outcome: Result<Event, SignerError>,
    },
}

/// Applies queued events until the pool is dropped.
pub(crate) async fn run(pool: Weak<PoolInner>, mut events: mpsc::UnboundedReceiver<PoolEvent>) {
    while let Some(event) = events.recv().await {
        let Some(pool) = pool.upgrade() else {
            break;
        };
        pool.apply(event);
    }
    debug!("relay pool driver stopped");
}

/// Shared state behind every `RelayPool` handle.
pub(crate) struct PoolInner {
    pub(crate) config: PoolConfig,
    transport: Arc<dyn Transport>,
    signer: Arc<dyn AuthSigner>,
    prompt: Arc<dyn AuthPrompt>,
    preferences: Arc<dyn PreferenceStore>,
    state: Mutex<PoolState>,
    publisher: StatePublisher,
    events: mpsc::UnboundedSender<PoolEvent>,
}

impl PoolInner {
    pub(crate) fn new(
        config: PoolConfig,
        transport: Arc<dyn Transport>,
        signer: Arc<dyn AuthSigner>,
        prompt: Arc<dyn AuthPrompt>,
        preferences: Arc<dyn PreferenceStore>,
        events: mpsc::UnboundedSender<PoolEvent>,
    ) -> Self {
        let state = PoolState::new(BackoffPolicy::new(&config.backoff));
        Self {
            config,
            transport,
            signer,
            prompt,
            preferences,
            state: Mutex::new(state),
            publisher: StatePublisher::new(),
            events,
        }
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn preferences(&self) -> &dyn PreferenceStore {
        self.preferences.as_ref()
    }

    fn publish_descriptor(&self, entry: &RelayEntry) {
        self.publisher
            .publish(&StateChange::Descriptor(entry.descriptor.clone()));
    }

    fn publish_liveness(&self, record: &LivenessRecord) {
        self.publisher.publish(&StateChange::Liveness(record.clone()));
    }

    fn post_after(&self, delay: Duration, event: PoolEvent) {
        self.post_at(Instant::now() + delay, event);
    }

    fn post_at(&self, deadline: Instant, event: PoolEvent) {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            // Pool gone: nothing left to notify.
            let _ = events.send(event);
        });
    }

    fn load_preference(&self, url: &RelayKey) -> AuthPreference {
        match self.preferences.load(url) {
            Ok(Some(preference)) => preference,
            Ok(None) => self.config.default_auth_preference,
            Err(e) => {
                warn!(relay = %url, error = %e, "failed to load auth preference, using default");
                self.config.default_auth_preference
            }
        }
    }

    /// Registers the relay if needed and starts an attempt unless one is
    /// already running or the relay is dead.
    pub(crate) fn connect(&self, url: &RelayKey) {
        // Storage I/O stays outside the state lock.
        let known = self.lock_state().registry.contains(url);
        let loaded = (!known).then(|| self.load_preference(url));

        let mut guard = self.lock_state();
        let state = &mut *guard;

        if !state.registry.contains(url) {
            let Some(preference) = loaded else {
                // Removed since the check above; load again unlocked.
                drop(guard);
                return self.connect(url);
            };
            let entry = state
                .registry
                .insert(RelayEntry::new(RelayDescriptor::new(url.clone(), preference)));
            debug!(relay = %url, "relay registered");
            self.publish_descriptor(entry);
        }

        let active = state
            .registry
            .get(url)
            .is_some_and(|entry| entry.descriptor.connection_state.is_active());
        if active {
            trace!(relay = %url, "connect ignored, attempt already active");
            return;
        }

        let first_contact = state.liveness.get(url).is_none();
        match state.liveness.admit(url, Instant::now()) {
            Admission::Refused => {
                info!(relay = %url, "relay is dead, remove it before reconnecting");
                if let Some(entry) = state.registry.get_mut(url) {
                    entry.wanted = false;
                }
                return;
            }
            Admission::Revived => {
                info!(relay = %url, "dead relay revived by explicit connect");
                if let Some(record) = state.liveness.get(url) {
                    self.publish_liveness(record);
                }
            }
            Admission::Allowed => {
                if first_contact {
                    if let Some(record) = state.liveness.get(url) {
                        self.publish_liveness(record);
                    }
                }
            }
        }

        if let Some(entry) = state.registry.get_mut(url) {
            entry.wanted = true;
        }
        self.begin_attempt(state, url);
    }

    /// Stops the relay's attempt or connection. Returns false if unknown.
    pub(crate) fn disconnect(&self, url: &RelayKey) -> bool {
        let mut guard = self.lock_state();
        self.teardown(&mut guard, url)
    }

    /// Disconnects and forgets the relay. Returns false if unknown.
    pub(crate) fn remove(&self, url: &RelayKey) -> bool {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        if !self.teardown(state, url) {
            return false;
        }
        state.registry.remove(url);
        state.liveness.mark_removed(url);
        info!(relay = %url, "relay removed");
        self.publisher.publish(&StateChange::Removed(url.clone()));
        true
    }

    /// Disconnects every relay. Registry and liveness are kept.
    pub(crate) fn shutdown(&self) {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        for url in state.registry.keys() {
            self.teardown(state, &url);
        }
        info!("relay pool shut down");
    }

    pub(crate) fn set_auth_preference(&self, url: &RelayKey, preference: AuthPreference) {
        let mut state = self.lock_state();
        if let Some(entry) = state.registry.get_mut(url) {
            if entry.descriptor.auth_preference != preference {
                entry.descriptor.auth_preference = preference;
                self.publish_descriptor(entry);
            }
        }
    }

    pub(crate) fn reset_liveness(&self, url: &RelayKey) -> bool {
        let mut state = self.lock_state();
        let Some(record) = state.liveness.reset(url) else {
            return false;
        };
        info!(relay = %url, "liveness history reset");
        self.publish_liveness(record);
        true
    }

    /// Snapshot plus registration under one lock, so nothing falls between.
    pub(crate) fn subscribe(&self, filter: Option<RelayKey>) -> Subscription {
        let state = self.lock_state();
        let matches = |url: &RelayKey| filter.as_ref().is_none_or(|f| f == url);

        let mut initial: Vec<StateChange> = state
            .registry
            .descriptors()
            .filter(|d| matches(&d.url))
            .cloned()
            .map(StateChange::Descriptor)
            .collect();
        initial.extend(
            state
                .liveness
                .records()
                .filter(|r| matches(&r.url))
                .cloned()
                .map(StateChange::Liveness),
        );

        self.publisher.subscribe(filter, initial)
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.publisher.subscriber_count()
    }

    fn teardown(&self, state: &mut PoolState, url: &RelayKey) -> bool {
        let generation = state.next_generation();
        let Some(entry) = state.registry.get_mut(url) else {
            return false;
        };

        entry.wanted = false;
        entry.close_link();
        entry.generation = generation;
        entry.confirmed = false;
        entry.handshake.reset();

        if entry.descriptor.connection_state != ConnectionState::Disconnected {
            entry
                .descriptor
                .set_connection_state(ConnectionState::Disconnected);
            debug!(relay = %url, "relay disconnected");
            self.publish_descriptor(entry);
        }
        true
    }

    fn begin_attempt(&self, state: &mut PoolState, url: &RelayKey) {
        let generation = state.next_generation();
        let Some(entry) = state.registry.get_mut(url) else {
            return;
        };

        entry.close_link();
        entry.generation = generation;
        entry.confirmed = false;
        entry.handshake.reset();
        if !entry
            .descriptor
            .set_connection_state(ConnectionState::Connecting)
        {
            warn!(
                relay = %url,
                state = ?entry.descriptor.connection_state,
                "cannot start attempt from current state"
            );
            return;
        }
        debug!(relay = %url, generation, "connecting");
        self.publish_descriptor(entry);

        let sink = TransportSink::new(url.clone(), generation, self.events.clone());
        entry.link = Some(self.transport.open(url, sink));
        self.post_after(
            self.config.connect_timeout(),
            PoolEvent::ConnectTimeout {
                url: url.clone(),
                generation,
            },
        );
    }

    pub(crate) fn apply(&self, event: PoolEvent) {
        let mut guard = self.lock_state();
        let state = &mut *guard;

        match event {
            PoolEvent::Transport {
                url,
                generation,
                event,
            } => self.on_transport(state, &url, generation, event),
            PoolEvent::ConnectTimeout { url, generation } => {
                let PoolState {
                    registry, liveness, ..
                } = state;
                if let Some(entry) = current(registry.get_mut(&url), generation) {
                    if entry.descriptor.connection_state == ConnectionState::Connecting {
                        self.fail(entry, liveness, "connect timed out".to_string());
                    }
                }
            }
            PoolEvent::ConfirmElapsed { url, generation } => {
                let PoolState {
                    registry, liveness, ..
                } = state;
                if let Some(entry) = current(registry.get_mut(&url), generation) {
                    if entry.descriptor.connection_state == ConnectionState::Connected {
                        self.confirm(entry, liveness);
                    }
                }
            }
            PoolEvent::RetryDue { url, generation } => {
                let due = current(state.registry.get_mut(&url), generation).is_some_and(|e| {
                    e.wanted && e.descriptor.connection_state == ConnectionState::Error
                });
                let dead = state
                    .liveness
                    .get(&url)
                    .is_some_and(|r| r.state == LivenessState::Dead);
                if due && !dead {
                    info!(relay = %url, "backoff elapsed, retrying");
                    self.begin_attempt(state, &url);
                }
            }
            PoolEvent::PromptAnswered {
                url,
                generation,
                round,
                approved,
            } => {
                if let Some(entry) = current(state.registry.get_mut(&url), generation) {
                    debug!(relay = %url, approved, "auth prompt answered");
                    let step = entry.handshake.prompt_answered(
                        round,
                        approved,
                        &mut entry.descriptor.auth_status,
                    );
                    self.run_auth_step(entry, step);
                }
            }
            PoolEvent::Signed {
                url,
                generation,
                round,
                outcome,
            } => {
                if let Some(entry) = current(state.registry.get_mut(&url), generation) {
                    let step =
                        entry
                            .handshake
                            .signed(round, outcome, &mut entry.descriptor.auth_status);
                    self.run_auth_step(entry, step);
                }
            }
        }
    }

    fn on_transport(
        &self,
        state: &mut PoolState,
        url: &RelayKey,
        generation: u64,
        event: TransportEvent,
    ) {
        let PoolState {
            registry, liveness, ..
        } = state;
        let Some(entry) = current(registry.get_mut(url), generation) else {
            trace!(relay = %url, generation, "stale transport event dropped");
            return;
        };
        let connection = entry.descriptor.connection_state;

        if event.is_inbound_data() && connection == ConnectionState::Connected {
            self.confirm(entry, liveness);
        }

        match event {
            TransportEvent::Opened => {
                if connection != ConnectionState::Connecting {
                    return;
                }
                entry
                    .descriptor
                    .set_connection_state(ConnectionState::Connected);
                entry.descriptor.last_error = None;
                info!(relay = %url, "relay connected");
                self.publish_descriptor(entry);
                self.post_after(
                    self.config.confirm_after(),
                    PoolEvent::ConfirmElapsed {
                        url: url.clone(),
                        generation,
                    },
                );
            }
            TransportEvent::Message(_) => {}
            TransportEvent::AuthChallenge(challenge) => {
                if connection != ConnectionState::Connected {
                    return;
                }
                let round = entry
                    .handshake
                    .receive_challenge(challenge, &mut entry.descriptor.auth_status);
                debug!(relay = %url, round, "auth challenge received");
                self.publish_descriptor(entry);
                let step = entry.handshake.apply_policy(
                    entry.descriptor.auth_preference,
                    &mut entry.descriptor.auth_status,
                );
                self.run_auth_step(entry, step);
            }
            TransportEvent::Ok {
                event_id,
                accepted,
                message,
            } => {
                let step = entry.handshake.relay_answered(
                    event_id,
                    accepted,
                    message,
                    &mut entry.descriptor.auth_status,
                );
                self.run_auth_step(entry, step);
            }
            TransportEvent::Closed(reason) => {
                if connection.is_active() {
                    let reason = reason.unwrap_or_else(|| "connection closed".to_string());
                    self.fail(entry, liveness, reason);
                }
            }
            TransportEvent::Failed(reason) => {
                if connection.is_active() {
                    self.fail(entry, liveness, reason);
                }
            }
        }
    }

    /// Counts the current connection as a liveness success, once.
    fn confirm(&self, entry: &mut RelayEntry, liveness: &mut LivenessTracker) {
        if entry.confirmed {
            return;
        }
        entry.confirmed = true;
        let url = &entry.descriptor.url;
        let record = liveness.record_success(url, chrono::Utc::now().timestamp());
        debug!(relay = %url, "relay confirmed live");
        self.publish_liveness(record);
    }

    fn fail(&self, entry: &mut RelayEntry, liveness: &mut LivenessTracker, reason: String) {
        entry.close_link();
        entry.confirmed = false;
        entry.handshake.reset();
        entry.descriptor.set_connection_state(ConnectionState::Error);

        let url = entry.descriptor.url.clone();
        let error = RelayError::Transport {
            url: url.to_string(),
            reason,
        };
        warn!(relay = %url, error = %error, "relay connection failed");
        entry.descriptor.last_error = Some(error.to_string());
        self.publish_descriptor(entry);

        let decision = liveness.record_failure(&url, Instant::now());
        let failures = liveness.get(&url).map_or(0, |record| {
            self.publish_liveness(record);
            record.failure_count
        });

        match decision {
            RetryDecision::RetryAt(deadline) if entry.wanted => {
                debug!(
                    relay = %url,
                    failures,
                    delay_ms = deadline.saturating_duration_since(Instant::now()).as_millis(),
                    "retry scheduled"
                );
                self.post_at(
                    deadline,
                    PoolEvent::RetryDue {
                        url,
                        generation: entry.generation,
                    },
                );
            }
            RetryDecision::RetryAt(_) => {}
            RetryDecision::GiveUp => {
                warn!(relay = %url, failures, "relay is dead, automatic retries stopped");
            }
        }
    }

    fn run_auth_step(&self, entry: &mut RelayEntry, step: AuthStep) {
        let url = entry.descriptor.url.clone();
        let generation = entry.generation;

        match step {
            AuthStep::Ignored => {}
            AuthStep::Updated => {
                let status = entry.descriptor.auth_status;
                if status.is_terminal() {
                    info!(relay = %url, status = ?status, "auth handshake finished");
                }
                self.publish_descriptor(entry);
            }
            AuthStep::Prompt { round, challenge } => {
                let prompt = Arc::clone(&self.prompt);
                let events = self.events.clone();
                let limit = self.config.ask_timeout();
                tokio::spawn(async move {
                    let answer = prompt.confirm(&url, &challenge);
                    let approved = match limit {
                        Some(limit) => tokio::time::timeout(limit, answer).await.unwrap_or(false),
                        None => answer.await,
                    };
                    let _ = events.send(PoolEvent::PromptAnswered {
                        url,
                        generation,
                        round,
                        approved,
                    });
                });
            }
            AuthStep::Sign { round, challenge } => {
                self.publish_descriptor(entry);
                let signer = Arc::clone(&self.signer);
                let events = self.events.clone();
                tokio::spawn(async move {
                    let outcome = signer.sign_auth(&url, &challenge).await;
                    let _ = events.send(PoolEvent::Signed {
                        url,
                        generation,
                        round,
                        outcome,
                    });
                });
            }
            AuthStep::Send(event) => {
                debug!(relay = %url, "sending auth response");
                if let Some(link) = &entry.link {
                    link.send(OutboundFrame::Auth(event));
                }
            }
            AuthStep::Declined(reason) => {
                info!(relay = %url, reason = %reason, "auth challenge not answered");
                entry.descriptor.last_error = Some(
                    RelayError::AuthDeclined {
                        url: url.to_string(),
                        reason,
                    }
                    .to_string(),
                );
                self.publish_descriptor(entry);
            }
            AuthStep::RejectedByRelay(reason) => {
                warn!(relay = %url, reason = %reason, "relay refused auth response");
                entry.descriptor.last_error = Some(
                    RelayError::AuthRejectedByRelay {
                        url: url.to_string(),
                        reason,
                    }
                    .to_string(),
                );
                self.publish_descriptor(entry);
            }
        }
    }
}

/// Keeps the entry only if it still runs the given attempt.
fn current(entry: Option<&mut RelayEntry>, generation: u64) -> Option<&mut RelayEntry> {
    entry.filter(|e| e.generation == generation)
}
