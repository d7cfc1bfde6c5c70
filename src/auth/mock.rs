//! Counting signer and prompt doubles for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use nostr::{Event, Keys};

use super::prompt::AuthPrompt;
use super::signer::{AuthSigner, KeysSigner, SignerError};
use crate::relay::RelayKey;

/// What [`MockSigner`] does when asked to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerMode {
    /// Sign with a freshly generated key.
    Sign,
    /// Decline.
    Decline,
    /// Fail with the given reason.
    Fail(String),
}

/// Signer that records how often it was invoked.
pub struct MockSigner {
    inner: KeysSigner,
    mode: Mutex<SignerMode>,
    calls: AtomicUsize,
}

impl MockSigner {
    /// Creates a signer in the given mode.
    #[must_use]
    pub fn new(mode: SignerMode) -> Self {
        Self {
            inner: KeysSigner::new(Keys::generate()),
            mode: Mutex::new(mode),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of sign requests received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Changes the mode for later requests.
    pub fn set_mode(&self, mode: SignerMode) {
        if let Ok(mut current) = self.mode.lock() {
            *current = mode;
        }
    }
}

#[async_trait]
impl AuthSigner for MockSigner {
    async fn sign_auth(&self, relay: &RelayKey, challenge: &str) -> Result<Event, SignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mode = self
            .mode
            .lock()
            .map_err(|e| SignerError::Failed(e.to_string()))?
            .clone();

        match mode {
            SignerMode::Sign => self.inner.sign_auth(relay, challenge).await,
            SignerMode::Decline => Err(SignerError::Declined),
            SignerMode::Fail(reason) => Err(SignerError::Failed(reason)),
        }
    }
}

/// How [`MockPrompt`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    /// Approve every prompt.
    Approve,
    /// Deny every prompt.
    Deny,
    /// Never answer.
    Unanswered,
}

/// Prompt that records how often it was shown.
pub struct MockPrompt {
    answer: PromptAnswer,
    calls: AtomicUsize,
}

impl MockPrompt {
    /// Creates a prompt with a fixed answer.
    #[must_use]
    pub const fn new(answer: PromptAnswer) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of prompts shown.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthPrompt for MockPrompt {
    async fn confirm(&self, _relay: &RelayKey, _challenge: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answer {
            PromptAnswer::Approve => true,
            PromptAnswer::Deny => false,
            PromptAnswer::Unanswered => std::future::pending().await,
        }
    }
}
