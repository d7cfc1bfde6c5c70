//! Types for relay connection state.

use serde::Serialize;

use super::url::RelayKey;
use crate::auth::{AuthPreference, AuthStatus};
use crate::liveness::LivenessState;

/// Connection state of a relay.
///
/// Legal edges:
///
/// ```text
/// Disconnected ──connect──▶ Connecting ──open──▶ Connected
///                              │                    │
///                              └──fail──▶ Error ◀──fail┘
///                                          │
///                               retry ◀────┘
/// any ──disconnect/remove──▶ Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected and not trying to.
    #[default]
    Disconnected,

    /// Transport is opening.
    Connecting,

    /// Connected and ready.
    Connected,

    /// The last attempt failed or the connection dropped.
    Error,
}

impl ConnectionState {
    /// Returns whether `self → next` is an edge of the state machine.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected | Self::Error, Self::Connecting)
                | (Self::Connecting, Self::Connected | Self::Error)
                | (Self::Connected, Self::Error)
                | (_, Self::Disconnected)
        )
    }

    /// Returns true while a transport is opening or open.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

/// Current descriptor of a relay in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayDescriptor {
    /// The normalized relay URL.
    pub url: RelayKey,
    /// Current connection state.
    pub connection_state: ConnectionState,
    /// Current authentication status.
    pub auth_status: AuthStatus,
    /// User policy for auth challenges.
    pub auth_preference: AuthPreference,
    /// Most recent absorbed transport or auth failure.
    pub last_error: Option<String>,
}

impl RelayDescriptor {
    pub(crate) const fn new(url: RelayKey, auth_preference: AuthPreference) -> Self {
        Self {
            url,
            connection_state: ConnectionState::Disconnected,
            auth_status: AuthStatus::None,
            auth_preference,
            last_error: None,
        }
    }

    /// Moves to `next`, resetting auth whenever the transport is gone.
    ///
    /// Returns false, leaving the descriptor untouched, for an illegal edge.
    pub(crate) fn set_connection_state(&mut self, next: ConnectionState) -> bool {
        if !self.connection_state.can_transition_to(next) {
            return false;
        }
        self.connection_state = next;
        if matches!(next, ConnectionState::Disconnected | ConnectionState::Error) {
            self.auth_status = AuthStatus::None;
        }
        true
    }
}

/// Combined status row for a relay, suitable for a relay list UI.
#[derive(Debug, Clone, Serialize)]
pub struct RelayConnectionStatus {
    /// The relay URL.
    pub url: String,
    /// Current connection state.
    pub state: ConnectionState,
    /// Current auth status.
    pub auth: AuthStatus,
    /// Liveness classification, if the relay was ever dialled.
    pub liveness: Option<LivenessState>,
    /// Last time the relay was seen (Unix timestamp).
    pub last_seen: Option<i64>,
}
