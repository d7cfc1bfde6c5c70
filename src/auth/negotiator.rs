//! Per-relay auth handshake state machine.
//!
//! ```text
//! None ─challenge─▶ ChallengeReceived ─┬─ never / denied ─────────▶ Rejected
//!                                      └─ always / approved ─▶ Authenticating
//! Authenticating ─┬─ signer declined or failed ─▶ Failed
//!                 └─ signed, sent ─┬─ relay OK true  ─▶ Authenticated
//!                                  └─ relay OK false ─▶ Failed
//! ```
//!
//! [`AuthHandshake`] only mutates the status it is handed and tells the
//! connection manager which side effect to run next ([`AuthStep`]). Every
//! challenge starts a new round; answers from older rounds are ignored.

use nostr::{Event, EventId};

use super::signer::SignerError;
use super::types::{AuthPreference, AuthStatus};

/// Next side effect requested by the handshake.
#[derive(Debug, PartialEq, Eq)]
pub enum AuthStep {
    /// Stale or unrelated input; nothing changed.
    Ignored,
    /// Status changed; nothing else to do.
    Updated,
    /// Ask the user to confirm this round.
    Prompt {
        /// Round the answer must quote.
        round: u64,
        /// The relay's challenge.
        challenge: String,
    },
    /// Invoke the signer for this round.
    Sign {
        /// Round the signature must quote.
        round: u64,
        /// The relay's challenge.
        challenge: String,
    },
    /// Send the signed response to the relay.
    Send(Box<Event>),
    /// The challenge was not answered.
    Declined(String),
    /// The relay refused the signed response.
    RejectedByRelay(String),
}

/// Auth handshake bookkeeping for one relay.
#[derive(Debug, Default)]
pub struct AuthHandshake {
    round: u64,
    challenge: Option<String>,
    pending: Option<EventId>,
}

impl AuthHandshake {
    /// Starts a new round for a fresh challenge, superseding any in flight.
    pub fn receive_challenge(&mut self, challenge: String, status: &mut AuthStatus) -> u64 {
        self.round += 1;
        self.challenge = Some(challenge);
        self.pending = None;
        *status = AuthStatus::ChallengeReceived;
        self.round
    }

    /// Applies the user's preference to the challenge just received.
    pub fn apply_policy(&mut self, preference: AuthPreference, status: &mut AuthStatus) -> AuthStep {
        if *status != AuthStatus::ChallengeReceived {
            return AuthStep::Ignored;
        }
        let Some(challenge) = self.challenge.clone() else {
            return AuthStep::Ignored;
        };

        match preference {
            AuthPreference::Never => {
                *status = AuthStatus::Rejected;
                AuthStep::Declined("auth preference is never".to_string())
            }
            AuthPreference::Always => self.start_signing(challenge, status),
            AuthPreference::Ask => AuthStep::Prompt {
                round: self.round,
                challenge,
            },
        }
    }

    fn start_signing(&self, challenge: String, status: &mut AuthStatus) -> AuthStep {
        *status = AuthStatus::Authenticating;
        AuthStep::Sign {
            round: self.round,
            challenge,
        }
    }

    /// Applies the user's answer to an `ask` prompt.
    pub fn prompt_answered(&mut self, round: u64, approved: bool, status: &mut AuthStatus) -> AuthStep {
        if round != self.round || *status != AuthStatus::ChallengeReceived {
            return AuthStep::Ignored;
        }
        let Some(challenge) = self.challenge.clone() else {
            return AuthStep::Ignored;
        };

        if approved {
            self.start_signing(challenge, status)
        } else {
            *status = AuthStatus::Rejected;
            AuthStep::Declined("user declined the auth prompt".to_string())
        }
    }

    /// Applies the signer's result.
    pub fn signed(
        &mut self,
        round: u64,
        outcome: Result<Event, SignerError>,
        status: &mut AuthStatus,
    ) -> AuthStep {
        if round != self.round || *status != AuthStatus::Authenticating || self.pending.is_some() {
            return AuthStep::Ignored;
        }

        match outcome {
            Ok(event) => {
                self.pending = Some(event.id);
                AuthStep::Send(Box::new(event))
            }
            Err(e) => {
                *status = AuthStatus::Failed;
                AuthStep::Declined(e.to_string())
            }
        }
    }

    /// Applies the relay's `OK` answer. Answers for other events are ignored.
    pub fn relay_answered(
        &mut self,
        event_id: EventId,
        accepted: bool,
        message: String,
        status: &mut AuthStatus,
    ) -> AuthStep {
        if self.pending != Some(event_id) {
            return AuthStep::Ignored;
        }
        self.pending = None;
        self.challenge = None;

        if accepted {
            *status = AuthStatus::Authenticated;
            AuthStep::Updated
        } else {
            *status = AuthStatus::Failed;
            AuthStep::RejectedByRelay(message)
        }
    }

    /// Forgets the handshake after the transport went away.
    pub fn reset(&mut self) {
        self.round += 1;
        self.challenge = None;
        self.pending = None;
    }
}
