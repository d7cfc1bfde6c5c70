//! Reusable helpers for relay pool integration tests.
//!
//! Pools are built on the scripted `MockTransport`, so no network is
//! touched. Timer-driven tests run on a paused Tokio clock; [`settle`] lets
//! every queued event be applied before the test looks at state.
//!
//! Each test binary compiles its own copy of this module and uses only part
//! of it, hence the `dead_code` allowances on the optional items.

use std::sync::Arc;
use std::time::Duration;

use relay_pool_core::auth::{
    AuthPreference, MemoryPreferenceStore, MockPrompt, MockSigner, PreferenceStore, PromptAnswer,
    SignerMode,
};
use relay_pool_core::transport::{MockBehavior, MockTransport};
use relay_pool_core::{PoolConfig, RelayPool, StateChange, Subscription};

/// Installs a `tracing` subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Lets the pool driver apply everything queued so far.
///
/// On a paused clock the runtime only advances time once every task is
/// idle, so a short sleep drains the event channel first.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Everything a scenario needs to drive and inspect a pool.
#[allow(dead_code)]
pub struct Harness {
    pub pool: RelayPool,
    pub transport: MockTransport,
    pub signer: Arc<MockSigner>,
    pub prompt: Arc<MockPrompt>,
    pub preferences: Arc<MemoryPreferenceStore>,
}

#[allow(dead_code)]
impl Harness {
    /// Builds a pool whose relays open as soon as they are dialled.
    pub fn new(config: PoolConfig) -> Self {
        Self::with(config, MockBehavior::OpenImmediately, PromptAnswer::Approve)
    }

    /// Builds a pool with explicit transport behaviour and prompt answer.
    pub fn with(config: PoolConfig, behavior: MockBehavior, answer: PromptAnswer) -> Self {
        init_tracing();
        let transport = MockTransport::with_behavior(behavior);
        let signer = Arc::new(MockSigner::new(SignerMode::Sign));
        let prompt = Arc::new(MockPrompt::new(answer));
        let preferences = Arc::new(MemoryPreferenceStore::new());

        let pool = RelayPool::builder()
            .config(config)
            .transport(Arc::new(transport.clone()))
            .signer(signer.clone())
            .prompt(prompt.clone())
            .preferences(preferences.clone())
            .build()
            .expect("pool should build");

        Self {
            pool,
            transport,
            signer,
            prompt,
            preferences,
        }
    }

    /// Stores a preference before the relay is first registered.
    pub fn prefer(&self, url: &str, preference: AuthPreference) {
        let key = relay_pool_core::RelayKey::parse(url, false).expect("valid url");
        self.preferences
            .save(&key, preference)
            .expect("preference should save");
    }
}

/// Auth statuses carried by descriptor changes, in delivery order.
#[allow(dead_code)]
pub fn auth_trail(changes: &[StateChange]) -> Vec<relay_pool_core::AuthStatus> {
    let mut trail: Vec<relay_pool_core::AuthStatus> = Vec::new();
    for change in changes {
        if let StateChange::Descriptor(descriptor) = change {
            if trail.last() != Some(&descriptor.auth_status) {
                trail.push(descriptor.auth_status);
            }
        }
    }
    trail
}

/// Connection states carried by descriptor changes, in delivery order.
#[allow(dead_code)]
pub fn connection_trail(changes: &[StateChange]) -> Vec<relay_pool_core::ConnectionState> {
    let mut trail: Vec<relay_pool_core::ConnectionState> = Vec::new();
    for change in changes {
        if let StateChange::Descriptor(descriptor) = change {
            if trail.last() != Some(&descriptor.connection_state) {
                trail.push(descriptor.connection_state);
            }
        }
    }
    trail
}

/// Drains a subscription after letting the pool settle.
#[allow(dead_code)]
pub async fn collect(subscription: &mut Subscription) -> Vec<StateChange> {
    settle().await;
    subscription.drain()
}
