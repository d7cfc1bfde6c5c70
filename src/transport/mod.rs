//! Transport seam between the pool and the network.
//!
//! A [`Transport`] opens one connection per attempt and reports everything
//! that happens on it through a [`TransportSink`]. The pool never awaits the
//! transport: `open` returns a [`TransportLink`] immediately and the outcome
//! arrives later as [`TransportEvent::Opened`] or [`TransportEvent::Failed`].
//!
//! Implementations:
//!
//! - [`WebSocketTransport`]: `tokio-tungstenite` client, relay frames parsed
//!   with the `nostr` crate
//! - `MockTransport`: scripted in-memory transport (`test-utils` feature)

#[cfg(any(test, feature = "test-utils"))]
mod mock;
mod websocket;

use nostr::{Event, EventId};
use tokio::sync::mpsc;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{AuthReply, MockBehavior, MockTransport};
pub use websocket::WebSocketTransport;

use crate::relay::driver::PoolEvent;
use crate::relay::RelayKey;

/// Something that happened on a transport connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is open.
    Opened,
    /// An inbound frame the pool does not interpret.
    Message(String),
    /// The relay issued an auth challenge.
    AuthChallenge(String),
    /// The relay answered a published event or auth response.
    Ok {
        /// The event the answer refers to.
        event_id: EventId,
        /// Whether the relay accepted it.
        accepted: bool,
        /// Human-readable reason from the relay.
        message: String,
    },
    /// The connection closed.
    Closed(Option<String>),
    /// The connection could not be opened or broke.
    Failed(String),
}

impl TransportEvent {
    /// Returns true for events that carry data from the relay.
    #[must_use]
    pub const fn is_inbound_data(&self) -> bool {
        matches!(
            self,
            Self::Message(_) | Self::AuthChallenge(_) | Self::Ok { .. }
        )
    }
}

/// A frame the pool asks the transport to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Signed response to an auth challenge.
    Auth(Box<Event>),
}

/// Reports events of one connection attempt back to the pool.
///
/// Events from a superseded attempt are discarded by the pool, so a sink may
/// safely outlive its connection.
#[derive(Debug, Clone)]
pub struct TransportSink {
    url: RelayKey,
    generation: u64,
    events: mpsc::UnboundedSender<PoolEvent>,
}

impl TransportSink {
    pub(crate) const fn new(
        url: RelayKey,
        generation: u64,
        events: mpsc::UnboundedSender<PoolEvent>,
    ) -> Self {
        Self {
            url,
            generation,
            events,
        }
    }

    /// Relay this sink reports for.
    #[must_use]
    pub const fn url(&self) -> &RelayKey {
        &self.url
    }

    /// Delivers an event. Returns false once the pool is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events
            .send(PoolEvent::Transport {
                url: self.url.clone(),
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Handle to one open or opening connection.
pub trait TransportLink: Send {
    /// Queues a frame for sending. Never blocks.
    fn send(&self, frame: OutboundFrame);

    /// Closes the connection. No further events are required after this.
    fn close(&self);
}

/// Opens connections to relays.
///
/// `open` is called while the pool holds its state lock: it must return
/// promptly and must not call back into the pool.
pub trait Transport: Send + Sync {
    /// Starts opening a connection to `url`.
    fn open(&self, url: &RelayKey, sink: TransportSink) -> Box<dyn TransportLink>;
}
