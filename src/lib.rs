//! Relay Pool Core Library
//!
//! Connection pooling for Nostr relays: a registry of relays, connection
//! management with automatic retries, NIP-42 auth negotiation driven by
//! per-relay preferences, liveness tracking with exponential backoff, and
//! push notification of every state change.
//!
//! Start with [`RelayPool`].

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod liveness;
pub mod publisher;
pub mod relay;
pub mod transport;

pub use auth::{AuthPreference, AuthStatus};
pub use config::{BackoffConfig, PoolConfig};
pub use liveness::{LivenessRecord, LivenessState};
pub use publisher::{StateChange, Subscription};
pub use relay::{
    ConnectionState, RelayConnectionStatus, RelayDescriptor, RelayError, RelayKey, RelayPool,
    RelayPoolBuilder, RelayResult,
};
