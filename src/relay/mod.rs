//! Relay registry and connection management.
//!
//! A relay is identified by its normalized URL ([`RelayKey`]). The pool
//! keeps one [`RelayDescriptor`] per registered relay and drives its
//! connection through a small state machine:
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──opened──▶ Connected
//!      ▲                        │                     │
//!      │                        └──fail/timeout──▶ Error ◀──drop──┘
//!      └──────────── disconnect (from any state) ─────┘
//! ```
//!
//! `Error` is left by an automatic retry once the backoff elapses, or by an
//! explicit `connect`. A relay the liveness tracker classifies as dead is
//! not retried at all.
//!
//! # Security Model
//!
//! - **WSS only**: plaintext `ws://` URLs are rejected unless the pool
//!   config explicitly allows them
//! - **Explicit auth**: challenges are answered only as each relay's stored
//!   preference allows

pub(crate) mod driver;
mod error;
mod manager;
mod registry;
mod types;
mod url;

pub use error::{RelayError, RelayResult};
pub use manager::{RelayPool, RelayPoolBuilder};
pub use types::{ConnectionState, RelayConnectionStatus, RelayDescriptor};
pub use url::{parse_all, RelayKey};
