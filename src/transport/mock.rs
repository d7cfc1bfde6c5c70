//! Scripted in-memory transport for tests.
//!
//! Tests either let the transport answer opens on its own
//! ([`MockBehavior::OpenImmediately`], [`MockBehavior::FailImmediately`]) or
//! drive each connection by hand with [`MockTransport::emit`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{OutboundFrame, Transport, TransportEvent, TransportLink, TransportSink};
use crate::relay::RelayKey;

/// How the mock answers a new connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Emit nothing; the test drives the connection.
    Manual,
    /// Emit `Opened` right away.
    OpenImmediately,
    /// Emit `Failed` right away.
    FailImmediately,
}

/// How the mock relay answers a signed auth frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthReply {
    /// `OK true`.
    Accept,
    /// `OK false` with the given reason.
    Reject(String),
    /// No answer.
    Silent,
}

#[derive(Default)]
struct MockState {
    default_behavior: Option<MockBehavior>,
    behaviors: HashMap<String, MockBehavior>,
    auth_reply: Option<AuthReply>,
    sinks: HashMap<String, TransportSink>,
    opens: HashMap<String, usize>,
    closes: HashMap<String, usize>,
    sent: HashMap<String, Vec<OutboundFrame>>,
}

fn normalize(url: &str) -> String {
    RelayKey::parse(url, true).map_or_else(|_| url.to_string(), |key| key.as_str().to_string())
}

/// In-memory transport that records every open, close and sent frame.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Creates a transport that leaves every connection to the test and
    /// accepts auth responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport with the given behavior for every relay.
    #[must_use]
    pub fn with_behavior(behavior: MockBehavior) -> Self {
        let transport = Self::new();
        transport.lock().default_behavior = Some(behavior);
        transport
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overrides the behavior for one relay.
    pub fn set_behavior(&self, url: &str, behavior: MockBehavior) {
        self.lock().behaviors.insert(normalize(url), behavior);
    }

    /// Sets how auth frames are answered.
    pub fn set_auth_reply(&self, reply: AuthReply) {
        self.lock().auth_reply = Some(reply);
    }

    /// Emits an event on the latest connection to `url`.
    ///
    /// Returns false if the relay was never opened or the pool is gone.
    pub fn emit(&self, url: &str, event: TransportEvent) -> bool {
        let sink = self.lock().sinks.get(&normalize(url)).cloned();
        sink.is_some_and(|sink| sink.emit(event))
    }

    /// Number of connection attempts made to `url`.
    #[must_use]
    pub fn open_count(&self, url: &str) -> usize {
        self.lock().opens.get(&normalize(url)).copied().unwrap_or(0)
    }

    /// Number of times a connection to `url` was closed by the pool.
    #[must_use]
    pub fn close_count(&self, url: &str) -> usize {
        self.lock().closes.get(&normalize(url)).copied().unwrap_or(0)
    }

    /// Frames the pool sent to `url`, oldest first.
    #[must_use]
    pub fn sent_frames(&self, url: &str) -> Vec<OutboundFrame> {
        self.lock()
            .sent
            .get(&normalize(url))
            .cloned()
            .unwrap_or_default()
    }
}

impl Transport for MockTransport {
    fn open(&self, url: &RelayKey, sink: TransportSink) -> Box<dyn TransportLink> {
        let key = url.as_str().to_string();
        let behavior = {
            let mut state = self.lock();
            *state.opens.entry(key.clone()).or_insert(0) += 1;
            state.sinks.insert(key.clone(), sink.clone());
            state
                .behaviors
                .get(&key)
                .copied()
                .or(state.default_behavior)
                .unwrap_or(MockBehavior::Manual)
        };

        match behavior {
            MockBehavior::Manual => {}
            MockBehavior::OpenImmediately => {
                sink.emit(TransportEvent::Opened);
            }
            MockBehavior::FailImmediately => {
                sink.emit(TransportEvent::Failed("connection refused".to_string()));
            }
        }

        Box::new(MockLink {
            url: key,
            sink,
            state: Arc::clone(&self.state),
        })
    }
}

struct MockLink {
    url: String,
    sink: TransportSink,
    state: Arc<Mutex<MockState>>,
}

impl TransportLink for MockLink {
    fn send(&self, frame: OutboundFrame) {
        let reply = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state
                .sent
                .entry(self.url.clone())
                .or_default()
                .push(frame.clone());
            state.auth_reply.clone().unwrap_or(AuthReply::Accept)
        };

        let OutboundFrame::Auth(event) = frame;
        match reply {
            AuthReply::Accept => {
                self.sink.emit(TransportEvent::Ok {
                    event_id: event.id,
                    accepted: true,
                    message: String::new(),
                });
            }
            AuthReply::Reject(reason) => {
                self.sink.emit(TransportEvent::Ok {
                    event_id: event.id,
                    accepted: false,
                    message: reason,
                });
            }
            AuthReply::Silent => {}
        }
    }

    fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state.closes.entry(self.url.clone()).or_insert(0) += 1;
    }
}
