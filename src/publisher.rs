//! Push fan-out of relay state changes.
//!
//! Every subscriber owns an unbounded channel. A subscription first yields
//! the current value, then every later change, until it is cancelled.
//! Changes are published by the pool while it holds its state lock, so
//! per-relay order always matches the order of transitions.
//!
//! Cancelling (calling [`Subscription::unsubscribe`] or dropping the
//! subscription) removes the subscriber from the table before returning:
//! nothing is delivered to it afterwards.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::liveness::LivenessRecord;
use crate::relay::{RelayDescriptor, RelayKey};

/// One observable change in the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StateChange {
    /// A relay's descriptor changed (or was created).
    Descriptor(RelayDescriptor),
    /// A relay's liveness record changed (or was created).
    Liveness(LivenessRecord),
    /// A relay was removed from the registry.
    Removed(RelayKey),
}

impl StateChange {
    /// The relay this change belongs to.
    #[must_use]
    pub const fn url(&self) -> &RelayKey {
        match self {
            Self::Descriptor(descriptor) => &descriptor.url,
            Self::Liveness(record) => &record.url,
            Self::Removed(url) => url,
        }
    }
}

struct Subscriber {
    filter: Option<RelayKey>,
    tx: mpsc::UnboundedSender<StateChange>,
}

#[derive(Default)]
struct SubscriberTable {
    next_id: u64,
    entries: HashMap<u64, Subscriber>,
}

fn lock_table(table: &Mutex<SubscriberTable>) -> MutexGuard<'_, SubscriberTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fan-out hub owned by the pool.
#[derive(Default)]
pub(crate) struct StatePublisher {
    table: Arc<Mutex<SubscriberTable>>,
}

impl StatePublisher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber and queues `initial` ahead of any later change.
    pub(crate) fn subscribe(
        &self,
        filter: Option<RelayKey>,
        initial: Vec<StateChange>,
    ) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        for change in initial {
            // The receiver is held right here.
            let _ = tx.send(change);
        }

        let mut table = lock_table(&self.table);
        let id = table.next_id;
        table.next_id += 1;
        table.entries.insert(id, Subscriber { filter, tx });

        Subscription {
            id,
            rx,
            table: Arc::downgrade(&self.table),
        }
    }

    /// Delivers a change to every matching subscriber.
    pub(crate) fn publish(&self, change: &StateChange) {
        let mut table = lock_table(&self.table);
        table.entries.retain(|_, subscriber| {
            if subscriber
                .filter
                .as_ref()
                .is_some_and(|filter| filter != change.url())
            {
                return true;
            }
            subscriber.tx.send(change.clone()).is_ok()
        });
    }

    /// Number of live subscribers.
    #[cfg(any(test, feature = "test-utils"))]
    pub(crate) fn subscriber_count(&self) -> usize {
        lock_table(&self.table).entries.len()
    }
}

/// A live subscription to pool state changes.
///
/// Implements [`Stream`]; also usable through [`recv`](Self::recv).
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<StateChange>,
    table: Weak<Mutex<SubscriberTable>>,
}

impl Subscription {
    /// Waits for the next change. `None` once the pool is gone.
    pub async fn recv(&mut self) -> Option<StateChange> {
        self.rx.recv().await
    }

    /// Returns a queued change without waiting.
    pub fn try_recv(&mut self) -> Option<StateChange> {
        self.rx.try_recv().ok()
    }

    /// Drains every change queued so far.
    pub fn drain(&mut self) -> Vec<StateChange> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Cancels the subscription. Equivalent to dropping it.
    pub fn unsubscribe(self) {
        drop(self);
    }

    fn detach(&mut self) {
        if let Some(table) = self.table.upgrade() {
            lock_table(&table).entries.remove(&self.id);
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl Stream for Subscription {
    type Item = StateChange;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthPreference;

    fn key(url: &str) -> RelayKey {
        RelayKey::parse(url, false).unwrap()
    }

    fn descriptor(url: &str) -> StateChange {
        StateChange::Descriptor(RelayDescriptor::new(key(url), AuthPreference::Ask))
    }

    #[test]
    fn initial_values_come_first() {
        let publisher = StatePublisher::new();
        let mut sub = publisher.subscribe(None, vec![descriptor("wss://a.example")]);
        publisher.publish(&descriptor("wss://b.example"));

        let changes = sub.drain();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].url().as_str(), "wss://a.example");
        assert_eq!(changes[1].url().as_str(), "wss://b.example");
    }

    #[test]
    fn filtered_subscription_sees_only_its_relay() {
        let publisher = StatePublisher::new();
        let mut sub = publisher.subscribe(Some(key("wss://a.example")), Vec::new());

        publisher.publish(&descriptor("wss://b.example"));
        publisher.publish(&descriptor("wss://a.example"));
        publisher.publish(&StateChange::Removed(key("wss://a.example")));

        let changes = sub.drain();
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.url().as_str() == "wss://a.example"));
    }

    #[test]
    fn unsubscribe_removes_subscriber_synchronously() {
        let publisher = StatePublisher::new();
        let sub = publisher.subscribe(None, Vec::new());
        assert_eq!(publisher.subscriber_count(), 1);

        sub.unsubscribe();
        assert_eq!(publisher.subscriber_count(), 0);

        for _ in 0..5 {
            publisher.publish(&descriptor("wss://a.example"));
        }
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn changes_serialize_with_kind_tag() {
        let json = serde_json::to_value(StateChange::Removed(key("wss://a.example"))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "removed", "value": "wss://a.example"})
        );

        let json = serde_json::to_value(descriptor("wss://a.example")).unwrap();
        assert_eq!(json["kind"], "descriptor");
        assert_eq!(json["value"]["url"], "wss://a.example");
    }

    #[test]
    fn subscription_outliving_publisher_ends() {
        let publisher = StatePublisher::new();
        let mut sub = publisher.subscribe(None, Vec::new());
        drop(publisher);

        assert!(sub.try_recv().is_none());
    }
}
