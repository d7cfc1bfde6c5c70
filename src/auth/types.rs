//! Types for relay authentication.

use serde::{Deserialize, Serialize};

/// Live authentication status of a relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    /// No challenge seen on the current connection.
    #[default]
    None,
    /// The relay issued a challenge that has not been answered yet.
    ChallengeReceived,
    /// A signed response is being produced or awaits the relay's verdict.
    Authenticating,
    /// The relay accepted the signed response.
    Authenticated,
    /// Signing failed, or the relay refused the signed response.
    Failed,
    /// Policy or the user refused to answer the challenge.
    Rejected,
}

impl AuthStatus {
    /// Returns true once the handshake has reached a final outcome.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Failed | Self::Rejected)
    }
}

/// Per-relay user policy for answering auth challenges.
///
/// Persisted across restarts and independent of live connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthPreference {
    /// Ask the user once per challenge.
    #[default]
    Ask,
    /// Sign every challenge automatically.
    Always,
    /// Never answer challenges.
    Never,
}

impl AuthPreference {
    /// Converts to string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::Always => "always",
            Self::Never => "never",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ask" => Some(Self::Ask),
            "always" => Some(Self::Always),
            "never" => Some(Self::Never),
            _ => None,
        }
    }
}
