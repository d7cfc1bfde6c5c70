//! Confirmation prompt for relays with the `ask` preference.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::relay::RelayKey;

/// Asks the user whether to answer one auth challenge.
///
/// The pool calls `confirm` at most once per challenge and does not block
/// other relays while waiting. A prompt that never resolves leaves the relay
/// in `ChallengeReceived` unless an ask timeout is configured.
#[async_trait]
pub trait AuthPrompt: Send + Sync {
    /// Returns true to sign the challenge.
    async fn confirm(&self, relay: &RelayKey, challenge: &str) -> bool;
}

/// Prompt used when none is configured: denies every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAllPrompt;

#[async_trait]
impl AuthPrompt for DenyAllPrompt {
    async fn confirm(&self, _relay: &RelayKey, _challenge: &str) -> bool {
        false
    }
}

/// A pending confirmation handed to the UI.
#[derive(Debug)]
pub struct AuthRequest {
    /// The relay asking to authenticate.
    pub relay: RelayKey,
    /// The relay's challenge.
    pub challenge: String,
    reply: oneshot::Sender<bool>,
}

impl AuthRequest {
    /// Answers the request. Dropping the request unanswered denies it.
    pub fn respond(self, approved: bool) {
        // The pool may have moved on; a late answer is harmless.
        let _ = self.reply.send(approved);
    }
}

/// Forwards confirmations to a UI over a channel.
#[derive(Debug, Clone)]
pub struct ChannelPrompt {
    requests: mpsc::UnboundedSender<AuthRequest>,
}

impl ChannelPrompt {
    /// Creates the prompt and the receiver the UI reads requests from.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AuthRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { requests: tx }, rx)
    }
}

#[async_trait]
impl AuthPrompt for ChannelPrompt {
    async fn confirm(&self, relay: &RelayKey, challenge: &str) -> bool {
        let (reply, answer) = oneshot::channel();
        let request = AuthRequest {
            relay: relay.clone(),
            challenge: challenge.to_string(),
            reply,
        };

        if self.requests.send(request).is_err() {
            tracing::debug!(relay = %relay, "auth prompt receiver gone, denying");
            return false;
        }

        answer.await.unwrap_or(false)
    }
}
