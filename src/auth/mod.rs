//! Relay authentication (NIP-42 `AUTH`).
//!
//! Relays may challenge a client to prove control of a key before serving
//! restricted content. How a challenge is answered is a per-relay user
//! policy ([`AuthPreference`]):
//!
//! | Preference | On challenge |
//! |------------|--------------|
//! | `never`    | `Rejected` at once, signer never invoked |
//! | `always`   | sign automatically |
//! | `ask`      | prompt once; approve → sign, deny → `Rejected` |
//!
//! Auth never changes the connection state: a failed or rejected handshake
//! leaves the transport connected. Deciding what an unauthenticated
//! connection may do is left to the caller.
//!
//! # Collaborators
//!
//! - [`AuthSigner`]: produces the signed response ([`KeysSigner`], [`NoSigner`])
//! - [`AuthPrompt`]: asks the user ([`ChannelPrompt`], [`DenyAllPrompt`])
//! - [`PreferenceStore`]: persists preferences ([`SqlitePreferenceStore`],
//!   [`MemoryPreferenceStore`])

#[cfg(any(test, feature = "test-utils"))]
mod mock;
mod negotiator;
mod prompt;
mod signer;
mod storage;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockPrompt, MockSigner, PromptAnswer, SignerMode};
pub use negotiator::{AuthHandshake, AuthStep};
pub use prompt::{AuthPrompt, AuthRequest, ChannelPrompt, DenyAllPrompt};
pub use signer::{AuthSigner, KeysSigner, NoSigner, SignerError};
pub use storage::{MemoryPreferenceStore, PreferenceStore, SqlitePreferenceStore};
pub use types::{AuthPreference, AuthStatus};
