#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration-style client tests for worker-link.
//!
//! Uses the shared `MockTransport` from `tests/common` to script worker
//! payloads and verify session transitions, heartbeat scheduling, listener
//! ordering and the send path.

mod common;

use std::time::Duration;

use serde_json::json;
use worker_link::{
    Category, Envelope, Listener, SessionState, Step, WorkerLinkClient, WorkerLinkConfig,
    WorkerLinkError,
};

use common::{raw, raw_with, Call, CallLog, MockHandles, MockTransport};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

fn listening_client() -> (WorkerLinkClient<MockTransport>, MockHandles) {
    let (transport, handles) = MockTransport::new(vec![]);
    let client = WorkerLinkClient::new(transport, WorkerLinkConfig::default()).expect("client");
    (client, handles)
}

fn idle_client() -> (WorkerLinkClient<MockTransport>, MockHandles) {
    let (transport, handles) = MockTransport::new(vec![]);
    let config = WorkerLinkConfig::new().with_auto_listen(false);
    let client = WorkerLinkClient::new(transport, config).expect("client");
    (client, handles)
}

// ════════════════════════════════════════════════════════════════════
// Construction
// ════════════════════════════════════════════════════════════════════

#[test]
fn auto_listen_enters_listening_disconnected_with_one_connect() {
    let (client, handles) = listening_client();

    assert_eq!(client.state(), SessionState::ListeningDisconnected);
    assert!(client.is_listening());
    assert!(!client.is_connected());
    assert!(handles.is_subscribed());
    assert_eq!(handles.sent_types(), vec!["connect"]);
    assert_eq!(handles.sent_envelopes()[0], Envelope::new("connect"));
}

#[test]
fn without_auto_listen_nothing_is_sent() {
    let (client, handles) = idle_client();

    assert_eq!(client.state(), SessionState::Idle);
    assert!(!handles.is_subscribed());
    assert!(handles.sent_types().is_empty());
    assert!(!client.is_heartbeat_running());
}

#[test]
fn transport_without_controller_is_rejected() {
    let (transport, handles) = MockTransport::without_controller();
    let err = WorkerLinkClient::new(transport, WorkerLinkConfig::default()).unwrap_err();

    assert!(matches!(err, WorkerLinkError::InvalidTransport));
    assert!(handles.sent_types().is_empty());
    assert!(!handles.is_subscribed());
}

#[test]
fn failing_connect_leaves_client_unconstructed() {
    let (transport, handles) = MockTransport::new(vec![]);
    handles.set_fail_posts(true);

    let err = WorkerLinkClient::new(transport, WorkerLinkConfig::default()).unwrap_err();
    assert!(matches!(err, WorkerLinkError::TransportSend(_)));
    assert!(!handles.is_subscribed());
}

#[test]
fn configured_heartbeat_rate_is_used() {
    let (transport, _handles) = MockTransport::new(vec![]);
    let config = WorkerLinkConfig::new().with_heartbeat_rate(Duration::from_millis(250));
    let client = WorkerLinkClient::new(transport, config).unwrap();
    assert_eq!(client.heartbeat_rate(), Duration::from_millis(250));
}

#[test]
fn oversized_heartbeat_rate_is_clamped_to_one_day() {
    let one_day = Duration::from_secs(24 * 60 * 60);

    let config = WorkerLinkConfig::new().with_heartbeat_rate(Duration::MAX);
    assert_eq!(config.heartbeat_rate, one_day);
    let (transport, handles) = MockTransport::new(vec![]);
    let client = WorkerLinkClient::new(transport, config).unwrap();
    assert_eq!(client.heartbeat_rate(), one_day);
    assert!(client.is_heartbeat_running());
    assert_eq!(handles.sent_types(), vec!["connect"]);

    // Setting the public field directly bypasses the builder.
    let mut config = WorkerLinkConfig::default();
    config.heartbeat_rate = Duration::MAX;
    let (transport, _handles) = MockTransport::new(vec![]);
    let client = WorkerLinkClient::new(transport, config).unwrap();
    assert_eq!(client.heartbeat_rate(), one_day);
}

// ════════════════════════════════════════════════════════════════════
// Lifecycle
// ════════════════════════════════════════════════════════════════════

#[test]
fn second_start_fails_and_keeps_listening() {
    let (mut client, handles) = listening_client();

    let err = client.start().unwrap_err();
    assert!(matches!(err, WorkerLinkError::AlreadyListening));
    assert!(client.is_listening());
    assert!(client.is_heartbeat_running());
    assert_eq!(handles.count("connect"), 1);
}

#[test]
fn stop_while_idle_fails() {
    let (mut client, _handles) = idle_client();
    let err = client.stop().unwrap_err();
    assert!(matches!(err, WorkerLinkError::NotListening));
}

#[test]
fn stop_then_start_keeps_listeners() {
    let log = CallLog::new();
    let (mut client, handles) = listening_client();
    client.on("message", log.body("m")).unwrap();
    client.on_event("foo", log.envelope("foo")).unwrap();

    client.stop().unwrap();
    assert!(!handles.is_subscribed());
    client.start().unwrap();
    assert!(handles.is_subscribed());
    assert_eq!(handles.count("connect"), 2);

    client.dispatch(&raw("foo")).unwrap();
    assert_eq!(log.tags(), vec!["m", "foo"]);
}

#[test]
fn failed_start_can_be_retried() {
    let (mut client, handles) = idle_client();

    handles.set_fail_posts(true);
    assert!(matches!(
        client.start().unwrap_err(),
        WorkerLinkError::TransportSend(_)
    ));
    assert_eq!(client.state(), SessionState::Idle);
    assert!(!client.is_heartbeat_running());

    handles.set_fail_posts(false);
    client.start().unwrap();
    assert_eq!(client.state(), SessionState::ListeningDisconnected);
}

// ════════════════════════════════════════════════════════════════════
// Lifecycle envelopes
// ════════════════════════════════════════════════════════════════════

#[test]
fn connected_envelope_fires_only_connected_listeners() {
    let log = CallLog::new();
    let (mut client, _handles) = listening_client();
    client.on("connected", log.body("connected")).unwrap();
    client.on("message", log.body("message")).unwrap();
    client.on("event", log.envelope("event")).unwrap();
    client.on_event("connected", log.envelope("typed")).unwrap();

    client
        .dispatch(&raw_with("connected", json!({"worker": "v1"})))
        .unwrap();

    assert_eq!(client.state(), SessionState::ListeningConnected);
    assert_eq!(
        log.calls(),
        vec![Call::Body(
            "connected".into(),
            Some(json!({"worker": "v1"}))
        )]
    );
}

#[test]
fn disconnected_envelope_stops_session_then_fires_listeners() {
    let (mut client, handles) = listening_client();
    client.dispatch(&raw("connected")).unwrap();

    let observed = std::sync::Arc::new(std::sync::Mutex::new(None));
    {
        let observed = std::sync::Arc::clone(&observed);
        let subscribed = handles.subscribed.clone();
        client.on_category(
            Category::Disconnected,
            Listener::body(move |body| {
                // The session is already stopped when listeners run.
                let still_subscribed = subscribed.load(std::sync::atomic::Ordering::Acquire);
                *observed.lock().unwrap() = Some((body.cloned(), still_subscribed));
                Ok(())
            }),
        );
    }
    let log = CallLog::new();
    client.on("message", log.body("message")).unwrap();
    client.on("event", log.envelope("event")).unwrap();

    client
        .dispatch(&raw_with("disconnected", json!("bye")))
        .unwrap();

    assert_eq!(client.state(), SessionState::Idle);
    assert!(!client.is_connected());
    assert!(!client.is_heartbeat_running());
    assert!(!handles.is_subscribed());
    assert_eq!(*observed.lock().unwrap(), Some((Some(json!("bye")), false)));
    assert!(log.calls().is_empty());
}

#[test]
fn disconnected_while_idle_is_reported() {
    let log = CallLog::new();
    let (mut client, _handles) = idle_client();
    client.on("disconnected", log.body("d")).unwrap();

    let err = client.dispatch(&raw("disconnected")).unwrap_err();
    assert!(matches!(err, WorkerLinkError::NotListening));
    assert!(log.calls().is_empty());
}

#[test]
fn connected_while_idle_is_ignored() {
    let log = CallLog::new();
    let (mut client, _handles) = idle_client();
    client.on("connected", log.body("c")).unwrap();
    client.on("message", log.body("m")).unwrap();

    client
        .dispatch(&raw_with("connected", json!({"worker": 1})))
        .unwrap();

    assert_eq!(client.state(), SessionState::Idle);
    assert!(!client.is_connected());
    assert!(log.calls().is_empty());

    // A later start begins from a clean, disconnected session.
    client.start().unwrap();
    assert_eq!(client.state(), SessionState::ListeningDisconnected);
}

// ════════════════════════════════════════════════════════════════════
// Dispatch ordering
// ════════════════════════════════════════════════════════════════════

#[test]
fn application_envelope_fires_event_then_message_then_typed() {
    let log = CallLog::new();
    let (mut client, _handles) = listening_client();
    // Register in reverse of the firing order to prove order is by category.
    client.on_event("foo", log.envelope("typed")).unwrap();
    client.on("message", log.body("message")).unwrap();
    client.on("event", log.envelope("event")).unwrap();

    client.dispatch(&raw_with("foo", json!([1, 2]))).unwrap();

    let env = Envelope::with_body("foo", json!([1, 2]));
    assert_eq!(
        log.calls(),
        vec![
            Call::Envelope("event".into(), env.clone()),
            Call::Body("message".into(), Some(json!([1, 2]))),
            Call::Envelope("typed".into(), env),
        ]
    );
}

#[test]
fn listeners_in_one_category_fire_in_registration_order() {
    let log = CallLog::new();
    let (mut client, _handles) = listening_client();
    for i in 0..5 {
        client.on("message", log.body(&format!("m{i}"))).unwrap();
    }

    client.dispatch(&raw("tick")).unwrap();
    assert_eq!(log.tags(), vec!["m0", "m1", "m2", "m3", "m4"]);
}

#[test]
fn typed_listeners_only_fire_for_their_type() {
    let log = CallLog::new();
    let (mut client, _handles) = listening_client();
    client.on_event("foo", log.envelope("foo")).unwrap();
    client.on_event("bar", log.envelope("bar")).unwrap();

    client.dispatch(&raw("bar")).unwrap();
    client.dispatch(&raw("baz")).unwrap();
    assert_eq!(log.tags(), vec!["bar"]);
}

#[test]
fn missing_body_reaches_message_listeners_as_none() {
    let log = CallLog::new();
    let (mut client, _handles) = listening_client();
    client.on("message", log.body("m")).unwrap();

    client.dispatch(&raw("ping")).unwrap();
    assert_eq!(log.calls(), vec![Call::Body("m".into(), None)]);
}

#[test]
fn malformed_input_is_dropped_silently() {
    let log = CallLog::new();
    let (mut client, _handles) = listening_client();
    for category in ["message", "event", "connected", "disconnected"] {
        client.on(category, log.body(category)).unwrap();
    }

    for bad in ["", "{", "null", r#"{"body":1}"#, r#"{"type":""}"#, r#"{"type":7}"#] {
        client.dispatch(bad).unwrap();
    }
    assert!(log.calls().is_empty());
    assert_eq!(client.state(), SessionState::ListeningDisconnected);
}

#[test]
fn failing_listener_propagates_and_halts_batch() {
    let log = CallLog::new();
    let (mut client, _handles) = listening_client();
    client
        .on("event", Listener::envelope(|_| Err("listener broke".into())))
        .unwrap();
    client.on("message", log.body("message")).unwrap();

    let err = client.dispatch(&raw("foo")).unwrap_err();
    assert!(matches!(err, WorkerLinkError::Listener { ref trigger, .. } if trigger == "event"));
    assert!(log.calls().is_empty());
}

// ════════════════════════════════════════════════════════════════════
// Registration
// ════════════════════════════════════════════════════════════════════

#[test]
fn unknown_category_is_rejected() {
    let log = CallLog::new();
    let (mut client, _handles) = listening_client();

    for bad in ["", "heartbeat", "Message", "foo"] {
        let err = client.on(bad, log.body("x")).unwrap_err();
        assert!(matches!(err, WorkerLinkError::InvalidCategory(ref s) if s == bad));
    }
    for category in Category::ALL {
        assert_eq!(client.listeners().len(category), 0);
    }
}

#[test]
fn empty_event_type_is_rejected() {
    let log = CallLog::new();
    let (mut client, _handles) = listening_client();
    let err = client.on_event("", log.envelope("x")).unwrap_err();
    assert!(matches!(err, WorkerLinkError::InvalidEventType));
}

#[test]
fn duplicate_registrations_are_kept() {
    let log = CallLog::new();
    let (mut client, _handles) = listening_client();
    client.on_event("foo", log.envelope("foo")).unwrap();
    client.on_event("foo", log.envelope("foo")).unwrap();
    assert_eq!(client.listeners().len_for_type("foo"), 2);

    client.dispatch(&raw("foo")).unwrap();
    assert_eq!(log.tags(), vec!["foo", "foo"]);
}

// ════════════════════════════════════════════════════════════════════
// Send path
// ════════════════════════════════════════════════════════════════════

#[test]
fn send_posts_encoded_envelope() {
    let (mut client, handles) = listening_client();
    client
        .send(&Envelope::with_body("save", json!({"id": 3})))
        .unwrap();

    assert_eq!(
        handles.sent_envelopes().last(),
        Some(&Envelope::with_body("save", json!({"id": 3})))
    );
}

#[test]
fn send_failure_propagates_without_state_change() {
    let (mut client, handles) = listening_client();
    client.dispatch(&raw("connected")).unwrap();
    handles.set_fail_posts(true);

    let err = client.send(&Envelope::new("save")).unwrap_err();
    assert!(matches!(err, WorkerLinkError::TransportSend(_)));
    assert_eq!(client.state(), SessionState::ListeningConnected);
    assert!(client.is_heartbeat_running());
}

#[test]
fn encoding_failure_never_reaches_transport() {
    let (mut client, handles) = listening_client();
    let err = client.send(&Envelope::new("")).unwrap_err();
    assert!(matches!(err, WorkerLinkError::Encoding { .. }));
    assert_eq!(handles.sent_types(), vec!["connect"]);
}

#[test]
fn send_works_while_idle() {
    let (mut client, handles) = idle_client();
    client.send(&Envelope::new("hello")).unwrap();
    assert_eq!(handles.sent_types(), vec!["hello"]);
}

// ════════════════════════════════════════════════════════════════════
// Heartbeat
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn heartbeats_are_sent_at_the_configured_rate() {
    let (transport, handles) = MockTransport::new(vec![]);
    let config = WorkerLinkConfig::new().with_heartbeat_rate(Duration::from_millis(500));
    let mut client = WorkerLinkClient::new(transport, config).unwrap();
    let started = tokio::time::Instant::now();

    for _ in 0..3 {
        assert_eq!(client.step().await.unwrap(), Step::Heartbeat);
    }
    assert_eq!(started.elapsed(), Duration::from_millis(1500));
    assert_eq!(
        handles.sent_types(),
        vec!["connect", "heartbeat", "heartbeat", "heartbeat"]
    );
    assert_eq!(handles.sent_envelopes()[1], Envelope::new("heartbeat"));
}

#[tokio::test(start_paused = true)]
async fn no_heartbeat_after_stop() {
    let (mut client, handles) = listening_client();
    client.stop().unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(client.step().await.unwrap(), Step::Idle);
    assert_eq!(handles.count("heartbeat"), 0);
}

#[tokio::test(start_paused = true)]
async fn no_heartbeat_after_disconnect() {
    let (transport, handles) = MockTransport::new(vec![
        Some(Ok(raw("connected"))),
        Some(Ok(raw("disconnected"))),
    ]);
    let mut client = WorkerLinkClient::new(transport, WorkerLinkConfig::default()).unwrap();

    client.run().await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(client.state(), SessionState::Idle);
    assert_eq!(handles.sent_types(), vec!["connect"]);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_failure_propagates_from_step() {
    let (mut client, handles) = listening_client();
    handles.set_fail_posts(true);

    let err = client.step().await.unwrap_err();
    assert!(matches!(err, WorkerLinkError::TransportSend(_)));
    assert!(client.is_listening());
}

#[tokio::test(start_paused = true)]
async fn inbound_and_heartbeats_interleave_between_steps() {
    let (transport, handles) = MockTransport::new(vec![Some(Ok(raw_with("foo", json!(1))))]);
    let mut client = WorkerLinkClient::new(transport, WorkerLinkConfig::default()).unwrap();
    let log = CallLog::new();
    client.on("message", log.body("m")).unwrap();

    assert_eq!(client.step().await.unwrap(), Step::Dispatched);
    assert_eq!(client.step().await.unwrap(), Step::Heartbeat);
    assert_eq!(log.calls(), vec![Call::Body("m".into(), Some(json!(1)))]);
    assert_eq!(handles.sent_types(), vec!["connect", "heartbeat"]);
}
