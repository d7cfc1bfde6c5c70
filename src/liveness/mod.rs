//! Relay liveness and retry backoff.
//!
//! Liveness is derived from connect outcomes only, independent of the
//! momentary connection state:
//!
//! ```text
//!           failure              failures >= threshold
//! Online ────────────▶ Offline ─────────────────────────▶ Dead
//!   ▲                    │                                 │
//!   └──── success ───────┘          remove + connect ──────┘ (→ Offline)
//! ```
//!
//! Each failure pushes `backoff_until` out by a capped exponential delay.
//! `Dead` stops automatic retries entirely.

mod backoff;
mod tracker;
mod types;

pub use backoff::BackoffPolicy;
pub use tracker::LivenessTracker;
pub use types::{Admission, LivenessRecord, LivenessState, RetryDecision};
