//! The pool's single owned store: relay registry plus liveness tracker.
//!
//! Only the connection manager and the liveness tracker mutate this state;
//! everyone else sees cloned descriptors and records.

use std::collections::HashMap;

use super::types::RelayDescriptor;
use super::url::RelayKey;
use crate::auth::AuthHandshake;
use crate::liveness::{BackoffPolicy, LivenessTracker};
use crate::transport::TransportLink;

/// Registry slot for one relay.
pub(crate) struct RelayEntry {
    pub(crate) descriptor: RelayDescriptor,
    /// Transport of the current attempt, if any.
    pub(crate) link: Option<Box<dyn TransportLink>>,
    /// Identifies the current attempt; events quoting another one are stale.
    pub(crate) generation: u64,
    /// The user asked for this relay to be connected.
    pub(crate) wanted: bool,
    /// The current connection already counted as a liveness success.
    pub(crate) confirmed: bool,
    pub(crate) handshake: AuthHandshake,
}

impl RelayEntry {
    pub(crate) fn new(descriptor: RelayDescriptor) -> Self {
        Self {
            descriptor,
            link: None,
            generation: 0,
            wanted: false,
            confirmed: false,
            handshake: AuthHandshake::default(),
        }
    }

    /// Closes and forgets the current transport, if any.
    pub(crate) fn close_link(&mut self) {
        if let Some(link) = self.link.take() {
            link.close();
        }
    }
}

/// Known relays keyed by normalized URL.
#[derive(Default)]
pub(crate) struct Registry {
    entries: HashMap<RelayKey, RelayEntry>,
}

impl Registry {
    pub(crate) fn get(&self, url: &RelayKey) -> Option<&RelayEntry> {
        self.entries.get(url)
    }

    pub(crate) fn get_mut(&mut self, url: &RelayKey) -> Option<&mut RelayEntry> {
        self.entries.get_mut(url)
    }

    pub(crate) fn contains(&self, url: &RelayKey) -> bool {
        self.entries.contains_key(url)
    }

    pub(crate) fn insert(&mut self, entry: RelayEntry) -> &mut RelayEntry {
        let url = entry.descriptor.url.clone();
        self.entries.entry(url).or_insert(entry)
    }

    pub(crate) fn remove(&mut self, url: &RelayKey) -> Option<RelayEntry> {
        self.entries.remove(url)
    }

    pub(crate) fn keys(&self) -> Vec<RelayKey> {
        self.entries.keys().cloned().collect()
    }

    pub(crate) fn descriptors(&self) -> impl Iterator<Item = &RelayDescriptor> {
        self.entries.values().map(|entry| &entry.descriptor)
    }
}

/// Everything the pool mutates, behind one lock.
pub(crate) struct PoolState {
    pub(crate) registry: Registry,
    pub(crate) liveness: LivenessTracker,
    last_generation: u64,
}

impl PoolState {
    pub(crate) fn new(policy: BackoffPolicy) -> Self {
        Self {
            registry: Registry::default(),
            liveness: LivenessTracker::new(policy),
            last_generation: 0,
        }
    }

    /// Allocates an attempt id, unique for the pool's lifetime.
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.last_generation += 1;
        self.last_generation
    }
}
