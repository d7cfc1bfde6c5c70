//! Integration tests for the connection state machine of `RelayPool`.

mod helpers;

use std::time::Duration;

use helpers::{collect, connection_trail, settle, Harness};
use relay_pool_core::auth::{AuthPreference, PromptAnswer};
use relay_pool_core::transport::{MockBehavior, TransportEvent};
use relay_pool_core::{AuthStatus, ConnectionState, LivenessState, PoolConfig, RelayError};

const RELAY: &str = "wss://a.example";

#[tokio::test(start_paused = true)]
async fn fresh_pool_has_no_relays() {
    let h = Harness::new(PoolConfig::default());

    assert!(h.pool.all_states().is_empty());
    assert!(h.pool.all_liveness().is_empty());
    assert!(h.pool.state(RELAY).is_none());
}

#[tokio::test(start_paused = true)]
async fn connect_opens_relay() {
    let h = Harness::new(PoolConfig::default());

    h.pool.connect(RELAY).expect("valid url");
    settle().await;

    let descriptor = h.pool.state(RELAY).expect("relay registered");
    assert_eq!(descriptor.connection_state, ConnectionState::Connected);
    assert_eq!(descriptor.auth_status, AuthStatus::None);
    assert_eq!(descriptor.last_error, None);
    assert_eq!(h.transport.open_count(RELAY), 1);
}

#[tokio::test(start_paused = true)]
async fn connect_is_idempotent() {
    let h = Harness::with(
        PoolConfig::default(),
        MockBehavior::Manual,
        PromptAnswer::Approve,
    );

    h.pool.connect(RELAY).unwrap();
    h.pool.connect(RELAY).unwrap();
    assert_eq!(h.transport.open_count(RELAY), 1);

    h.transport.emit(RELAY, TransportEvent::Opened);
    settle().await;
    h.pool.connect(RELAY).unwrap();
    settle().await;

    assert_eq!(h.transport.open_count(RELAY), 1);
    assert_eq!(h.pool.all_states().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn equivalent_urls_share_one_descriptor() {
    let h = Harness::new(PoolConfig::default());

    h.pool.connect("wss://A.example/").unwrap();
    h.pool.connect("  wss://a.example ").unwrap();
    settle().await;

    assert_eq!(h.pool.all_states().len(), 1);
    assert_eq!(h.transport.open_count(RELAY), 1);
}

#[tokio::test(start_paused = true)]
async fn only_legal_transitions_are_published() {
    let h = Harness::new(PoolConfig::default());
    let mut changes = h.pool.state_stream(Some(RELAY)).unwrap();

    h.pool.connect(RELAY).unwrap();
    settle().await;
    h.transport
        .emit(RELAY, TransportEvent::Closed(Some("bye".to_string())));
    settle().await;
    h.pool.disconnect(RELAY).unwrap();

    let trail = connection_trail(&collect(&mut changes).await);
    assert_eq!(
        trail,
        vec![
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Error,
            ConnectionState::Disconnected,
        ]
    );
    for pair in trail.windows(2) {
        assert!(
            pair[0].can_transition_to(pair[1]),
            "illegal edge {:?} -> {:?}",
            pair[0],
            pair[1]
        );
    }
}

#[tokio::test(start_paused = true)]
async fn disconnect_resets_auth_status() {
    let h = Harness::new(PoolConfig::default());
    h.prefer(RELAY, AuthPreference::Never);

    h.pool.connect(RELAY).unwrap();
    settle().await;
    h.transport
        .emit(RELAY, TransportEvent::AuthChallenge("c1".to_string()));
    settle().await;
    assert_eq!(h.pool.state(RELAY).unwrap().auth_status, AuthStatus::Rejected);

    assert!(h.pool.disconnect(RELAY).unwrap());

    let descriptor = h.pool.state(RELAY).unwrap();
    assert_eq!(descriptor.connection_state, ConnectionState::Disconnected);
    assert_eq!(descriptor.auth_status, AuthStatus::None);
    assert_eq!(h.transport.close_count(RELAY), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_is_absorbed() {
    let h = Harness::with(
        PoolConfig::default(),
        MockBehavior::Manual,
        PromptAnswer::Approve,
    );

    h.pool.connect(RELAY).expect("failures never reach the caller");
    h.transport
        .emit(RELAY, TransportEvent::Failed("connection refused".to_string()));
    settle().await;

    let descriptor = h.pool.state(RELAY).unwrap();
    assert_eq!(descriptor.connection_state, ConnectionState::Error);
    let error = descriptor.last_error.expect("failure recorded");
    assert!(error.contains("connection refused"), "got: {error}");
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_counts_as_failure() {
    let h = Harness::with(
        PoolConfig::default(),
        MockBehavior::Manual,
        PromptAnswer::Approve,
    );

    h.pool.connect(RELAY).unwrap();
    tokio::time::sleep(Duration::from_millis(10_500)).await;

    let descriptor = h.pool.state(RELAY).unwrap();
    assert_eq!(descriptor.connection_state, ConnectionState::Error);
    assert!(descriptor.last_error.unwrap().contains("timed out"));

    let record = h.pool.liveness(RELAY).unwrap();
    assert_eq!(record.failure_count, 1);
    assert_eq!(record.state, LivenessState::Offline);
}

#[tokio::test(start_paused = true)]
async fn dropped_connection_is_retried_after_backoff() {
    let h = Harness::new(PoolConfig::default());

    h.pool.connect(RELAY).unwrap();
    settle().await;
    h.transport.emit(RELAY, TransportEvent::Closed(None));
    settle().await;
    assert_eq!(
        h.pool.state(RELAY).unwrap().connection_state,
        ConnectionState::Error
    );

    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert_eq!(h.transport.open_count(RELAY), 2);
    assert_eq!(
        h.pool.state(RELAY).unwrap().connection_state,
        ConnectionState::Connected
    );
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_retry() {
    let h = Harness::with(
        PoolConfig::default(),
        MockBehavior::FailImmediately,
        PromptAnswer::Approve,
    );

    h.pool.connect(RELAY).unwrap();
    settle().await;
    h.pool.disconnect(RELAY).unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(h.transport.open_count(RELAY), 1);
    assert_eq!(
        h.pool.state(RELAY).unwrap().connection_state,
        ConnectionState::Disconnected
    );
}

#[tokio::test(start_paused = true)]
async fn timeout_of_superseded_attempt_is_ignored() {
    let h = Harness::with(
        PoolConfig::default(),
        MockBehavior::Manual,
        PromptAnswer::Approve,
    );

    h.pool.connect(RELAY).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    h.pool.disconnect(RELAY).unwrap();
    h.pool.connect(RELAY).unwrap();
    assert_eq!(h.transport.open_count(RELAY), 2);

    // First attempt's timeout has fired, the second one's has not.
    tokio::time::sleep(Duration::from_millis(5_500)).await;
    assert_eq!(
        h.pool.state(RELAY).unwrap().connection_state,
        ConnectionState::Connecting
    );

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(
        h.pool.state(RELAY).unwrap().connection_state,
        ConnectionState::Error
    );
    assert_eq!(h.pool.liveness(RELAY).unwrap().failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn remove_forgets_relay_but_keeps_liveness() {
    let h = Harness::new(PoolConfig::default());

    h.pool.connect(RELAY).unwrap();
    settle().await;
    assert!(h.pool.remove(RELAY).unwrap());

    assert!(h.pool.state(RELAY).is_none());
    assert!(h.pool.all_states().is_empty());
    assert!(h.pool.liveness(RELAY).is_some());
    assert_eq!(h.transport.close_count(RELAY), 1);
    assert!(!h.pool.remove(RELAY).unwrap());
}

#[tokio::test(start_paused = true)]
async fn shutdown_disconnects_everything() {
    let h = Harness::new(PoolConfig::default());

    h.pool
        .connect_all(&["wss://a.example".to_string(), "wss://b.example".to_string()])
        .unwrap();
    settle().await;
    h.pool.shutdown();

    for descriptor in h.pool.all_states().values() {
        assert_eq!(descriptor.connection_state, ConnectionState::Disconnected);
    }
    assert_eq!(h.pool.all_states().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn invalid_urls_surface_synchronously() {
    let h = Harness::new(PoolConfig::default());

    for url in ["", "http://a.example", "ws://a.example", "not a url"] {
        assert!(
            matches!(h.pool.connect(url), Err(RelayError::InvalidUrl(_))),
            "{url:?} should be rejected"
        );
    }
    assert!(matches!(
        h.pool.remove("ftp://a.example"),
        Err(RelayError::InvalidUrl(_))
    ));
    assert!(h.pool.all_states().is_empty());
}

#[tokio::test(start_paused = true)]
async fn plaintext_allowed_when_configured() {
    let h = Harness::new(PoolConfig::default().allowing_plaintext());

    h.pool.connect("ws://localhost:7777").unwrap();
    settle().await;

    assert_eq!(
        h.pool.state("ws://localhost:7777").unwrap().connection_state,
        ConnectionState::Connected
    );
}

#[tokio::test(start_paused = true)]
async fn statuses_combine_connection_auth_and_liveness() {
    let h = Harness::new(PoolConfig::default());

    h.pool.connect("wss://b.example").unwrap();
    h.pool.connect("wss://a.example").unwrap();
    settle().await;
    h.transport
        .emit("wss://a.example", TransportEvent::Message("[\"NOTICE\",\"hi\"]".to_string()));
    settle().await;

    let statuses = h.pool.statuses();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].url, "wss://a.example");
    assert_eq!(statuses[0].state, ConnectionState::Connected);
    assert_eq!(statuses[0].liveness, Some(LivenessState::Online));
    assert!(statuses[0].last_seen.is_some());
    assert_eq!(statuses[1].url, "wss://b.example");
    assert!(statuses[1].last_seen.is_none());
}
