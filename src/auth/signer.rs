//! Signing step for auth challenges.
//!
//! The pool never touches key material. It hands the challenge to an
//! [`AuthSigner`], which may sign locally, forward to a remote signer, or
//! decline.

use async_trait::async_trait;
use nostr::{Event, EventBuilder, Keys};
use thiserror::Error;

use crate::relay::RelayKey;

/// Why a challenge was not signed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// The signer (or its user) refused.
    #[error("signer declined the challenge")]
    Declined,

    /// Signing was attempted and failed.
    #[error("signing failed: {0}")]
    Failed(String),
}

/// Produces the signed response to a relay's auth challenge.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the pool signs from spawned tasks.
#[async_trait]
pub trait AuthSigner: Send + Sync {
    /// Signs an auth event for `relay` over `challenge`.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::Declined`] if signing was refused, or
    /// [`SignerError::Failed`] if it was attempted and failed.
    async fn sign_auth(&self, relay: &RelayKey, challenge: &str) -> Result<Event, SignerError>;
}

/// Signs auth events with a local key pair.
pub struct KeysSigner {
    keys: Keys,
}

impl KeysSigner {
    /// Creates a signer over the given keys.
    #[must_use]
    pub const fn new(keys: Keys) -> Self {
        Self { keys }
    }
}

impl std::fmt::Debug for KeysSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeysSigner")
            .field("public_key", &self.keys.public_key().to_hex())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthSigner for KeysSigner {
    async fn sign_auth(&self, relay: &RelayKey, challenge: &str) -> Result<Event, SignerError> {
        EventBuilder::auth(challenge, relay.relay_url().clone())
            .sign_with_keys(&self.keys)
            .map_err(|e| SignerError::Failed(e.to_string()))
    }
}

/// Signer used when none is configured: declines everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSigner;

#[async_trait]
impl AuthSigner for NoSigner {
    async fn sign_auth(&self, _relay: &RelayKey, _challenge: &str) -> Result<Event, SignerError> {
        Err(SignerError::Declined)
    }
}
