//! Error types for relay pool operations.
//!
//! Only configuration and storage problems are ever returned to callers.
//! Transport and auth failures are absorbed by the pool: they are rendered
//! into [`RelayDescriptor::last_error`](super::RelayDescriptor::last_error)
//! and logged, never raised.

use thiserror::Error;

/// Errors that can occur during relay pool operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed or disallowed relay URL.
    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),

    /// Pool configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Transport failed to open, or the connection dropped.
    #[error("Transport failure on {url}: {reason}")]
    Transport {
        /// The relay URL that failed.
        url: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Policy, user or signer refused to answer an auth challenge.
    #[error("Auth declined for {url}: {reason}")]
    AuthDeclined {
        /// The relay that issued the challenge.
        url: String,
        /// Why the challenge was not answered.
        reason: String,
    },

    /// The relay refused the signed auth response.
    #[error("Relay {url} rejected auth: {reason}")]
    AuthRejectedByRelay {
        /// The relay that refused the response.
        url: String,
        /// The rejection reason sent by the relay.
        reason: String,
    },

    /// Preference storage failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database error from `SQLite`.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
