//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each connection runs in its own task. Relay frames are decoded with the
//! `nostr` crate just far enough to surface `AUTH` challenges and `OK`
//! answers; every other frame is passed through untouched.

use futures::{SinkExt, StreamExt};
use nostr::{ClientMessage, JsonUtil, RelayMessage};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{OutboundFrame, Transport, TransportEvent, TransportLink, TransportSink};
use crate::relay::RelayKey;

enum LinkCommand {
    Send(OutboundFrame),
    Close,
}

/// WebSocket transport for `ws://` and `wss://` relays.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Creates the transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, url: &RelayKey, sink: TransportSink) -> Box<dyn TransportLink> {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_connection(url.as_str().to_string(), sink, commands_rx));
        Box::new(WebSocketLink {
            commands: commands_tx,
        })
    }
}

struct WebSocketLink {
    commands: mpsc::UnboundedSender<LinkCommand>,
}

impl TransportLink for WebSocketLink {
    fn send(&self, frame: OutboundFrame) {
        // The connection task is gone once it reported close or failure.
        let _ = self.commands.send(LinkCommand::Send(frame));
    }

    fn close(&self) {
        let _ = self.commands.send(LinkCommand::Close);
    }
}

async fn run_connection(
    url: String,
    sink: TransportSink,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
) {
    let stream = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                sink.emit(TransportEvent::Failed(e.to_string()));
                return;
            }
        },
        // Closed or dropped before the handshake finished.
        _ = commands.recv() => return,
    };

    tracing::debug!(relay = %url, "websocket open");
    sink.emit(TransportEvent::Opened);

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(LinkCommand::Send(frame)) => {
                    if let Err(e) = write.send(Message::text(encode(frame))).await {
                        sink.emit(TransportEvent::Failed(e.to_string()));
                        return;
                    }
                }
                Some(LinkCommand::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    return;
                }
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    sink.emit(decode(&text));
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| String::from(&*f.reason));
                    sink.emit(TransportEvent::Closed(reason));
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    sink.emit(TransportEvent::Failed(e.to_string()));
                    return;
                }
                None => {
                    sink.emit(TransportEvent::Closed(None));
                    return;
                }
            },
        }
    }
}

fn encode(frame: OutboundFrame) -> String {
    match frame {
        OutboundFrame::Auth(event) => ClientMessage::auth(*event).as_json(),
    }
}

fn decode(text: &str) -> TransportEvent {
    match RelayMessage::from_json(text) {
        Ok(RelayMessage::Auth { challenge, .. }) => {
            TransportEvent::AuthChallenge(challenge.to_string())
        }
        Ok(RelayMessage::Ok {
            event_id,
            status,
            message,
            ..
        }) => TransportEvent::Ok {
            event_id,
            accepted: status,
            message: message.to_string(),
        },
        _ => TransportEvent::Message(text.to_string()),
    }
}
