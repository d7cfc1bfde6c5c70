//! Integration tests for NIP-42 auth negotiation under each preference.

mod helpers;

use std::time::Duration;

use helpers::{auth_trail, collect, settle, Harness};
use relay_pool_core::auth::{AuthPreference, PromptAnswer, SignerMode};
use relay_pool_core::transport::{AuthReply, MockBehavior, OutboundFrame, TransportEvent};
use relay_pool_core::{AuthStatus, ConnectionState, PoolConfig};

const RELAY: &str = "wss://a.example";

async fn connected(h: &Harness) {
    h.pool.connect(RELAY).unwrap();
    settle().await;
    assert_eq!(
        h.pool.state(RELAY).unwrap().connection_state,
        ConnectionState::Connected
    );
}

fn challenge(h: &Harness, text: &str) {
    assert!(h
        .transport
        .emit(RELAY, TransportEvent::AuthChallenge(text.to_string())));
}

#[tokio::test(start_paused = true)]
async fn never_rejects_without_invoking_signer() {
    let h = Harness::new(PoolConfig::default());
    h.prefer(RELAY, AuthPreference::Never);
    let mut changes = h.pool.state_stream(Some(RELAY)).unwrap();

    connected(&h).await;
    challenge(&h, "challenge-1");

    let trail = auth_trail(&collect(&mut changes).await);
    assert_eq!(
        trail,
        vec![AuthStatus::None, AuthStatus::ChallengeReceived, AuthStatus::Rejected]
    );
    assert_eq!(h.signer.calls(), 0);
    assert_eq!(h.prompt.calls(), 0);
    assert!(h.transport.sent_frames(RELAY).is_empty());

    let descriptor = h.pool.state(RELAY).unwrap();
    assert_eq!(descriptor.connection_state, ConnectionState::Connected);
    assert!(descriptor.last_error.unwrap().contains("never"));
}

#[tokio::test(start_paused = true)]
async fn always_signs_without_prompting() {
    let h = Harness::new(PoolConfig::default());
    h.prefer(RELAY, AuthPreference::Always);
    let mut changes = h.pool.state_stream(Some(RELAY)).unwrap();

    connected(&h).await;
    challenge(&h, "challenge-1");

    let trail = auth_trail(&collect(&mut changes).await);
    assert_eq!(
        trail,
        vec![
            AuthStatus::None,
            AuthStatus::ChallengeReceived,
            AuthStatus::Authenticating,
            AuthStatus::Authenticated,
        ]
    );
    assert_eq!(h.prompt.calls(), 0);
    assert_eq!(h.signer.calls(), 1);

    let frames = h.transport.sent_frames(RELAY);
    assert_eq!(frames.len(), 1);
    let OutboundFrame::Auth(event) = &frames[0];
    assert_eq!(event.kind, nostr::Kind::Authentication);
    event.verify().expect("auth event must be signed");
}

#[tokio::test(start_paused = true)]
async fn ask_approved_signs_once() {
    let h = Harness::with(
        PoolConfig::default(),
        MockBehavior::OpenImmediately,
        PromptAnswer::Approve,
    );
    h.prefer(RELAY, AuthPreference::Ask);

    connected(&h).await;
    challenge(&h, "challenge-1");
    settle().await;

    assert_eq!(h.prompt.calls(), 1);
    assert_eq!(h.signer.calls(), 1);
    assert_eq!(
        h.pool.state(RELAY).unwrap().auth_status,
        AuthStatus::Authenticated
    );
}

#[tokio::test(start_paused = true)]
async fn ask_denied_is_rejected() {
    let h = Harness::with(
        PoolConfig::default(),
        MockBehavior::OpenImmediately,
        PromptAnswer::Deny,
    );

    connected(&h).await;
    challenge(&h, "challenge-1");
    settle().await;

    assert_eq!(h.prompt.calls(), 1);
    assert_eq!(h.signer.calls(), 0);
    let descriptor = h.pool.state(RELAY).unwrap();
    assert_eq!(descriptor.auth_status, AuthStatus::Rejected);
    assert_eq!(descriptor.connection_state, ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn unanswered_prompt_waits_indefinitely_by_default() {
    let h = Harness::with(
        PoolConfig::default(),
        MockBehavior::OpenImmediately,
        PromptAnswer::Unanswered,
    );

    connected(&h).await;
    challenge(&h, "challenge-1");
    tokio::time::sleep(Duration::from_secs(3_600)).await;

    assert_eq!(
        h.pool.state(RELAY).unwrap().auth_status,
        AuthStatus::ChallengeReceived
    );
    assert_eq!(h.signer.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn unanswered_prompt_expires_as_denial_with_timeout() {
    let h = Harness::with(
        PoolConfig::default().with_ask_timeout(Duration::from_secs(30)),
        MockBehavior::OpenImmediately,
        PromptAnswer::Unanswered,
    );

    connected(&h).await;
    challenge(&h, "challenge-1");
    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(
        h.pool.state(RELAY).unwrap().auth_status,
        AuthStatus::ChallengeReceived
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(
        h.pool.state(RELAY).unwrap().auth_status,
        AuthStatus::Rejected
    );
    assert_eq!(h.signer.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn relay_refusal_fails_auth() {
    let h = Harness::new(PoolConfig::default());
    h.prefer(RELAY, AuthPreference::Always);
    h.transport
        .set_auth_reply(AuthReply::Reject("restricted: not a member".to_string()));

    connected(&h).await;
    challenge(&h, "challenge-1");
    settle().await;

    let descriptor = h.pool.state(RELAY).unwrap();
    assert_eq!(descriptor.auth_status, AuthStatus::Failed);
    assert_eq!(descriptor.connection_state, ConnectionState::Connected);
    assert!(descriptor.last_error.unwrap().contains("not a member"));
}

#[tokio::test(start_paused = true)]
async fn signer_decline_fails_auth() {
    let h = Harness::new(PoolConfig::default());
    h.prefer(RELAY, AuthPreference::Always);
    h.signer.set_mode(SignerMode::Decline);

    connected(&h).await;
    challenge(&h, "challenge-1");
    settle().await;

    assert_eq!(h.signer.calls(), 1);
    assert_eq!(
        h.pool.state(RELAY).unwrap().auth_status,
        AuthStatus::Failed
    );
    assert!(h.transport.sent_frames(RELAY).is_empty());
}

#[tokio::test(start_paused = true)]
async fn new_challenge_restarts_negotiation() {
    let h = Harness::new(PoolConfig::default());
    h.prefer(RELAY, AuthPreference::Always);
    h.transport.set_auth_reply(AuthReply::Silent);

    connected(&h).await;
    challenge(&h, "challenge-1");
    settle().await;
    assert_eq!(
        h.pool.state(RELAY).unwrap().auth_status,
        AuthStatus::Authenticating
    );

    h.transport.set_auth_reply(AuthReply::Accept);
    challenge(&h, "challenge-2");
    settle().await;

    assert_eq!(h.signer.calls(), 2);
    assert_eq!(h.transport.sent_frames(RELAY).len(), 2);
    assert_eq!(
        h.pool.state(RELAY).unwrap().auth_status,
        AuthStatus::Authenticated
    );
}

#[tokio::test(start_paused = true)]
async fn preference_change_applies_to_next_challenge() {
    let h = Harness::new(PoolConfig::default());
    h.prefer(RELAY, AuthPreference::Never);

    connected(&h).await;
    challenge(&h, "challenge-1");
    settle().await;
    assert_eq!(
        h.pool.state(RELAY).unwrap().auth_status,
        AuthStatus::Rejected
    );

    h.pool
        .set_auth_preference(RELAY, AuthPreference::Always)
        .unwrap();
    challenge(&h, "challenge-2");
    settle().await;

    assert_eq!(
        h.pool.state(RELAY).unwrap().auth_status,
        AuthStatus::Authenticated
    );
    assert_eq!(h.prompt.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_negotiation_resets_auth() {
    let h = Harness::new(PoolConfig::default());
    h.prefer(RELAY, AuthPreference::Always);
    h.transport.set_auth_reply(AuthReply::Silent);

    connected(&h).await;
    challenge(&h, "challenge-1");
    settle().await;
    h.pool.disconnect(RELAY).unwrap();
    settle().await;

    let descriptor = h.pool.state(RELAY).unwrap();
    assert_eq!(descriptor.connection_state, ConnectionState::Disconnected);
    assert_eq!(descriptor.auth_status, AuthStatus::None);
}

#[tokio::test(start_paused = true)]
async fn default_preference_comes_from_config() {
    let h = Harness::new(
        PoolConfig::default().with_default_auth_preference(AuthPreference::Never),
    );

    connected(&h).await;

    assert_eq!(
        h.pool.state(RELAY).unwrap().auth_preference,
        AuthPreference::Never
    );
}
