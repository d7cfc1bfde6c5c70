//! Relay pool: the public face of connection management.
//!
//! `RelayPool` owns a set of relay connections, negotiates NIP-42 auth on
//! them and tracks their liveness across attempts. Commands return as soon
//! as the state change is recorded; the network work happens in the
//! background and is observable through [`RelayPool::state_stream`].
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_pool_core::{PoolConfig, RelayPool};
//!
//! let pool = RelayPool::new(PoolConfig::default())?;
//! let mut changes = pool.state_stream(None)?;
//!
//! pool.connect("wss://relay.example.com")?;
//! while let Some(change) = changes.recv().await {
//!     println!("{change:?}");
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::driver::{self, PoolInner};
use super::error::RelayResult;
use super::types::{RelayConnectionStatus, RelayDescriptor};
use super::url::{parse_all, RelayKey};
use crate::auth::{
    AuthPreference, AuthPrompt, AuthSigner, DenyAllPrompt, MemoryPreferenceStore, NoSigner,
    PreferenceStore,
};
use crate::config::PoolConfig;
use crate::liveness::LivenessRecord;
use crate::publisher::Subscription;
use crate::transport::{Transport, WebSocketTransport};

/// Pool of relay connections with auth negotiation and liveness tracking.
///
/// Cheap to clone; all clones share one pool. Background work stops once
/// the last clone is dropped.
///
/// # Runtime
///
/// Must be built inside a Tokio runtime.
#[derive(Clone)]
pub struct RelayPool {
    inner: Arc<PoolInner>,
}

impl RelayPool {
    /// Creates a pool with the WebSocket transport and no signing key.
    ///
    /// Auth challenges are answered according to each relay's preference;
    /// without a signer every attempt to sign is declined.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Configuration`](crate::RelayError::Configuration)
    /// if the config is invalid.
    pub fn new(config: PoolConfig) -> RelayResult<Self> {
        Self::builder().config(config).build()
    }

    /// Starts configuring a pool.
    #[must_use]
    pub fn builder() -> RelayPoolBuilder {
        RelayPoolBuilder::default()
    }

    /// The pool's configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    fn key(&self, url: &str) -> RelayResult<RelayKey> {
        RelayKey::parse(url, self.inner.config.allow_plaintext)
    }

    /// Connects to a relay, registering it on first use.
    ///
    /// Idempotent while an attempt is already connecting or connected.
    /// A relay classified dead is not dialled again until it has been
    /// [removed](Self::remove); the call still succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidUrl`](crate::RelayError::InvalidUrl)
    /// for malformed or non-`wss` URLs.
    pub fn connect(&self, url: &str) -> RelayResult<()> {
        let key = self.key(url)?;
        self.inner.connect(&key);
        Ok(())
    }

    /// Connects to every relay in the list.
    ///
    /// All URLs are validated before any connection is started.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidUrl`](crate::RelayError::InvalidUrl)
    /// for the first invalid URL.
    pub fn connect_all(&self, urls: &[String]) -> RelayResult<()> {
        for key in parse_all(urls, self.inner.config.allow_plaintext)? {
            self.inner.connect(&key);
        }
        Ok(())
    }

    /// Disconnects from a relay. It stays registered.
    ///
    /// Returns false if the relay is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidUrl`](crate::RelayError::InvalidUrl)
    /// for malformed URLs.
    pub fn disconnect(&self, url: &str) -> RelayResult<bool> {
        let key = self.key(url)?;
        Ok(self.inner.disconnect(&key))
    }

    /// Disconnects from a relay and forgets it.
    ///
    /// Liveness history is kept; a later explicit connect to a removed
    /// dead relay starts over from `Offline`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidUrl`](crate::RelayError::InvalidUrl)
    /// for malformed URLs.
    pub fn remove(&self, url: &str) -> RelayResult<bool> {
        let key = self.key(url)?;
        Ok(self.inner.remove(&key))
    }

    /// Disconnects every relay and cancels pending retries.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// Current descriptor of a relay, if registered.
    #[must_use]
    pub fn state(&self, url: &str) -> Option<RelayDescriptor> {
        let key = self.key(url).ok()?;
        self.inner
            .lock_state()
            .registry
            .get(&key)
            .map(|entry| entry.descriptor.clone())
    }

    /// Descriptors of every registered relay.
    #[must_use]
    pub fn all_states(&self) -> HashMap<RelayKey, RelayDescriptor> {
        self.inner
            .lock_state()
            .registry
            .descriptors()
            .map(|d| (d.url.clone(), d.clone()))
            .collect()
    }

    /// Liveness record of a relay, if it was ever dialled.
    #[must_use]
    pub fn liveness(&self, url: &str) -> Option<LivenessRecord> {
        let key = self.key(url).ok()?;
        self.inner.lock_state().liveness.get(&key).cloned()
    }

    /// Every liveness record, including those of removed relays.
    #[must_use]
    pub fn all_liveness(&self) -> HashMap<RelayKey, LivenessRecord> {
        self.inner
            .lock_state()
            .liveness
            .records()
            .map(|r| (r.url.clone(), r.clone()))
            .collect()
    }

    /// Flat status rows for every registered relay, sorted by URL.
    #[must_use]
    pub fn statuses(&self) -> Vec<RelayConnectionStatus> {
        let state = self.inner.lock_state();
        let mut statuses: Vec<RelayConnectionStatus> = state
            .registry
            .descriptors()
            .map(|d| {
                let record = state.liveness.get(&d.url);
                RelayConnectionStatus {
                    url: d.url.to_string(),
                    state: d.connection_state,
                    auth: d.auth_status,
                    liveness: record.map(|r| r.state),
                    last_seen: record.and_then(|r| r.last_seen_at),
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.url.cmp(&b.url));
        statuses
    }

    /// Subscribes to state changes of one relay, or of all with `None`.
    ///
    /// The subscription first yields the current descriptors and liveness
    /// records, then every later change in order.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidUrl`](crate::RelayError::InvalidUrl)
    /// for malformed URLs.
    pub fn state_stream(&self, url: Option<&str>) -> RelayResult<Subscription> {
        let filter = url.map(|url| self.key(url)).transpose()?;
        Ok(self.inner.subscribe(filter))
    }

    /// Number of subscriptions that still receive changes.
    #[cfg(any(test, feature = "test-utils"))]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }

    /// Stores the auth preference for a relay.
    ///
    /// Persisted even for relays not registered yet. Applies to the next
    /// challenge; a handshake already under way is not affected.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidUrl`](crate::RelayError::InvalidUrl)
    /// for malformed URLs, or a storage
    /// error if the preference could not be persisted.
    pub fn set_auth_preference(&self, url: &str, preference: AuthPreference) -> RelayResult<()> {
        let key = self.key(url)?;
        self.inner.preferences().save(&key, preference)?;
        self.inner.set_auth_preference(&key, preference);
        Ok(())
    }

    /// Time until a relay may be retried automatically.
    ///
    /// `Some(ZERO)` when eligible now (including unknown relays), `None`
    /// when the relay is dead and will not be retried.
    #[must_use]
    pub fn backoff_remaining(&self, url: &str) -> Option<Duration> {
        let Ok(key) = self.key(url) else {
            return Some(Duration::ZERO);
        };
        self.inner
            .lock_state()
            .liveness
            .backoff_remaining(&key, Instant::now())
    }

    /// Clears a relay's failure history, making it `Online` again.
    ///
    /// Returns false if the relay was never dialled.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidUrl`](crate::RelayError::InvalidUrl)
    /// for malformed URLs.
    pub fn reset_liveness(&self, url: &str) -> RelayResult<bool> {
        let key = self.key(url)?;
        Ok(self.inner.reset_liveness(&key))
    }
}

impl std::fmt::Debug for RelayPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayPool")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RelayPool`].
///
/// Defaults: [`WebSocketTransport`], [`NoSigner`], [`DenyAllPrompt`] and
/// [`MemoryPreferenceStore`].
#[derive(Default)]
pub struct RelayPoolBuilder {
    config: PoolConfig,
    transport: Option<Arc<dyn Transport>>,
    signer: Option<Arc<dyn AuthSigner>>,
    prompt: Option<Arc<dyn AuthPrompt>>,
    preferences: Option<Arc<dyn PreferenceStore>>,
}

impl RelayPoolBuilder {
    /// Sets the pool configuration.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the transport used to open connections.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the signer used to answer auth challenges.
    #[must_use]
    pub fn signer(mut self, signer: Arc<dyn AuthSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Sets the prompt consulted for relays with the `ask` preference.
    #[must_use]
    pub fn prompt(mut self, prompt: Arc<dyn AuthPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Sets where auth preferences are persisted.
    #[must_use]
    pub fn preferences(mut self, preferences: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// Validates the configuration and starts the pool.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Configuration`](crate::RelayError::Configuration)
    /// if the config is invalid.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn build(self) -> RelayResult<RelayPool> {
        self.config.validate()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(PoolInner::new(
            self.config,
            self.transport
                .unwrap_or_else(|| Arc::new(WebSocketTransport::new())),
            self.signer.unwrap_or_else(|| Arc::new(NoSigner)),
            self.prompt.unwrap_or_else(|| Arc::new(DenyAllPrompt)),
            self.preferences
                .unwrap_or_else(|| Arc::new(MemoryPreferenceStore::new())),
            events_tx,
        ));
        tokio::spawn(driver::run(Arc::downgrade(&inner), events_rx));
        tracing::debug!("relay pool started");

        Ok(RelayPool { inner })
    }
}

impl std::fmt::Debug for RelayPoolBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayPoolBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
