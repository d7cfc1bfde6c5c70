//! Relay URL normalization.
//!
//! Every relay is keyed by a [`RelayKey`]: the URL after trimming, scheme
//! validation, parsing and trailing-slash removal. Two spellings of the same
//! relay (`WSS://Relay.Example/` and `wss://relay.example`) map to one key.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use nostr::RelayUrl;
use serde::{Serialize, Serializer};

use super::error::{RelayError, RelayResult};

/// Normalized relay URL used as the registry key.
#[derive(Clone)]
pub struct RelayKey {
    normalized: String,
    url: RelayUrl,
}

impl RelayKey {
    /// Parses and normalizes a relay URL.
    ///
    /// Plaintext `ws://` URLs are rejected unless `allow_plaintext` is set.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidUrl`] if the URL is empty, uses a scheme
    /// other than `ws`/`wss`, is plaintext while disallowed, or fails to parse.
    pub fn parse(raw: &str, allow_plaintext: bool) -> RelayResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RelayError::InvalidUrl("empty relay URL".to_string()));
        }

        let lowered = trimmed.to_ascii_lowercase();
        if lowered.starts_with("ws://") {
            if !allow_plaintext {
                return Err(RelayError::InvalidUrl(format!(
                    "Plaintext ws:// not allowed: {trimmed}"
                )));
            }
        } else if !lowered.starts_with("wss://") {
            return Err(RelayError::InvalidUrl(format!(
                "{trimmed}: scheme must be ws:// or wss://"
            )));
        }

        let url = RelayUrl::parse(trimmed)
            .map_err(|e| RelayError::InvalidUrl(format!("{trimmed}: {e}")))?;
        let normalized = url.as_str().trim_end_matches('/').to_string();

        Ok(Self { normalized, url })
    }

    /// Returns the normalized URL text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// Returns the parsed relay URL.
    #[must_use]
    pub const fn relay_url(&self) -> &RelayUrl {
        &self.url
    }
}

impl PartialEq for RelayKey {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for RelayKey {}

impl Hash for RelayKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialOrd for RelayKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RelayKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized.cmp(&other.normalized)
    }
}

impl fmt::Display for RelayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl fmt::Debug for RelayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RelayKey").field(&self.normalized).finish()
    }
}

impl Serialize for RelayKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.normalized)
    }
}

/// Validates a list of relay URLs, failing on the first bad entry.
///
/// # Errors
///
/// Returns the [`RelayError::InvalidUrl`] of the first invalid URL.
pub fn parse_all(relays: &[String], allow_plaintext: bool) -> RelayResult<Vec<RelayKey>> {
    let mut keys = Vec::with_capacity(relays.len());

    for relay in relays {
        keys.push(RelayKey::parse(relay, allow_plaintext)?);
    }

    Ok(keys)
}
