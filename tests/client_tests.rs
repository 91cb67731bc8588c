//! Integration tests for the TCP client facade.
//!
//! Each scenario runs against both backends. Socket-level scenarios use a
//! loopback echo server; ordering scenarios use the shared `MockConnector`,
//! whose transport records `close()` into the same log as the listener.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]

mod common;

use std::time::Duration;

use tcp_client::{
    Backend, ClientConfig, ClientError, ConnectionState, Endpoint, StreamingBackend, TcpClient,
    TransactionalBackend,
};

use common::{
    events, new_log, spawn_echo_server, unused_local_port, wait_for, Event, EventLog,
    MockConnector, RecordingListener,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

fn config(port: u16) -> ClientConfig {
    ClientConfig::new(Endpoint::new("127.0.0.1", port).unwrap())
        .with_response_timeout(Duration::from_millis(500))
        .with_connect_timeout(Some(Duration::from_secs(2)))
}

async fn echo_client<B: Backend + Default>() -> (TcpClient<B>, EventLog) {
    let addr = spawn_echo_server().await;
    let log = new_log();
    let client = TcpClient::<B>::new(config(addr.port()), RecordingListener::new(&log));
    (client, log)
}

fn mock_client<B: Backend + Default>() -> (TcpClient<B>, EventLog) {
    let log = new_log();
    let client = TcpClient::<B>::new(config(9), RecordingListener::new(&log))
        .with_connector(MockConnector::new(&log));
    (client, log)
}

fn count(log: &EventLog, event: &Event) -> usize {
    events(log).iter().filter(|e| *e == event).count()
}

// ════════════════════════════════════════════════════════════════════
// Echo round trip
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn streaming_ping_is_echoed() {
    let (mut client, log) = echo_client::<StreamingBackend>().await;
    client.connect().await.unwrap();
    assert!(client.is_connected());

    client.request("ping").await.unwrap();
    wait_for(&log, |ev| ev.contains(&Event::Receive("ping".into()))).await;
    client.close().await;

    assert_eq!(
        events(&log),
        vec![
            Event::Start,
            Event::Send("ping".into()),
            Event::Receive("ping".into()),
            Event::Stop,
        ]
    );
}

#[tokio::test]
async fn transactional_ping_returns_with_response() {
    let (mut client, log) = echo_client::<TransactionalBackend>().await;
    client.connect().await.unwrap();

    client.request("ping").await.unwrap();

    assert_eq!(
        events(&log),
        vec![
            Event::Start,
            Event::Send("ping".into()),
            Event::Receive("ping".into()),
            Event::Request("ping".into(), Some("ping".into()), true),
        ]
    );
    client.close().await;
}

// ════════════════════════════════════════════════════════════════════
// Empty payload
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn streaming_empty_request_sends_nothing_back() {
    let (mut client, log) = echo_client::<StreamingBackend>().await;
    client.connect().await.unwrap();

    client.request_empty().await.unwrap();
    wait_for(&log, |ev| ev.contains(&Event::Send(String::new()))).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.close().await;

    let ev = events(&log);
    assert_eq!(count(&log, &Event::Send(String::new())), 1);
    assert!(!ev.iter().any(|e| matches!(e, Event::Receive(_))));
}

#[tokio::test]
async fn transactional_empty_request_resolves_without_response() {
    let (mut client, log) = echo_client::<TransactionalBackend>().await;
    client.connect().await.unwrap();

    client.request_empty().await.unwrap();
    client.close().await;

    assert_eq!(
        events(&log),
        vec![
            Event::Start,
            Event::Send(String::new()),
            Event::Request(String::new(), None, true),
            Event::Stop,
        ]
    );
}

async fn request_empty_matches_empty_request<B: Backend + Default>() {
    let (mut via_empty, empty_log) = mock_client::<B>();
    via_empty.connect().await.unwrap();
    via_empty.request_empty().await.unwrap();
    wait_for(&empty_log, |ev| ev.contains(&Event::Send(String::new()))).await;
    via_empty.close().await;

    let (mut via_request, request_log) = mock_client::<B>();
    via_request.connect().await.unwrap();
    via_request.request("").await.unwrap();
    wait_for(&request_log, |ev| ev.contains(&Event::Send(String::new()))).await;
    via_request.close().await;

    assert_eq!(events(&empty_log), events(&request_log));
}

#[tokio::test]
async fn request_empty_is_request_of_empty_string() {
    request_empty_matches_empty_request::<StreamingBackend>().await;
    request_empty_matches_empty_request::<TransactionalBackend>().await;
}

// ════════════════════════════════════════════════════════════════════
// Connect failures
// ════════════════════════════════════════════════════════════════════

async fn unreachable_endpoint_fails<B: Backend + Default>() {
    let port = unused_local_port().await;
    let log = new_log();
    let mut client = TcpClient::<B>::new(config(port), RecordingListener::new(&log));

    let err = client.connect().await.unwrap_err();
    assert!(
        matches!(err, ClientError::Connect { .. } | ClientError::ConnectTimeout(_)),
        "unexpected error: {err:?}"
    );
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(events(&log), vec![Event::Start]);

    let err = client.request("ping").await.unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));
    assert_eq!(events(&log), vec![Event::Start]);
}

#[tokio::test]
async fn unreachable_endpoint_never_sends() {
    unreachable_endpoint_fails::<StreamingBackend>().await;
    unreachable_endpoint_fails::<TransactionalBackend>().await;
}

#[tokio::test]
async fn refused_connector_leaves_client_reusable() {
    let log = new_log();
    let mut client = TcpClient::<StreamingBackend>::new(config(9), RecordingListener::new(&log))
        .with_connector(MockConnector::refusing(&log));

    assert!(client.connect().await.is_err());
    assert!(client.connect().await.is_err());
    assert_eq!(events(&log), vec![Event::Start, Event::Start]);
}

// ════════════════════════════════════════════════════════════════════
// Close semantics
// ════════════════════════════════════════════════════════════════════

async fn stop_precedes_transport_close<B: Backend + Default>() {
    let (mut client, log) = mock_client::<B>();
    client.connect().await.unwrap();
    client.close().await;

    let ev = events(&log);
    assert_eq!(ev, vec![Event::Start, Event::Stop, Event::TransportClosed]);
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn on_stop_fires_before_teardown() {
    stop_precedes_transport_close::<StreamingBackend>().await;
    stop_precedes_transport_close::<TransactionalBackend>().await;
}

async fn second_close_is_silent<B: Backend + Default>() {
    let (mut client, log) = mock_client::<B>();
    client.connect().await.unwrap();
    client.close().await;
    client.close().await;

    assert_eq!(count(&log, &Event::Stop), 1);
    assert_eq!(count(&log, &Event::TransportClosed), 1);
}

#[tokio::test]
async fn double_close_fires_on_stop_once() {
    second_close_is_silent::<StreamingBackend>().await;
    second_close_is_silent::<TransactionalBackend>().await;
}

#[tokio::test]
async fn close_before_connect_does_nothing() {
    let (mut client, log) = mock_client::<TransactionalBackend>();
    client.close().await;
    assert!(events(&log).is_empty());
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // The client is still usable afterwards.
    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    client.close().await;
}

#[tokio::test]
async fn request_after_close_is_rejected() {
    let (mut client, _log) = mock_client::<StreamingBackend>();
    client.connect().await.unwrap();
    client.close().await;

    let err = client.request("late").await.unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, ClientError::Closed));
}

// ════════════════════════════════════════════════════════════════════
// Request before connect
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn request_before_connect_is_not_connected() {
    let (mut streaming, log) = mock_client::<StreamingBackend>();
    assert!(matches!(
        streaming.request("x").await.unwrap_err(),
        ClientError::NotConnected
    ));

    let (mut transactional, _) = mock_client::<TransactionalBackend>();
    assert!(matches!(
        transactional.request_empty().await.unwrap_err(),
        ClientError::NotConnected
    ));
    assert!(events(&log).is_empty());
}

// ════════════════════════════════════════════════════════════════════
// Unsolicited frames
// ════════════════════════════════════════════════════════════════════

async fn greeting_precedes_first_request<B: Backend + Default>() {
    let log = new_log();
    let mut client = TcpClient::<B>::new(config(9), RecordingListener::new(&log))
        .with_connector(MockConnector::greeting(&log, &["welcome", "motd"]));

    client.connect().await.unwrap();
    wait_for(&log, |ev| ev.contains(&Event::Receive("motd".into()))).await;
    client.request("hi").await.unwrap();
    wait_for(&log, |ev| ev.contains(&Event::Receive("hi".into()))).await;
    client.close().await;

    let ev = events(&log);
    assert_eq!(
        ev[..4],
        [
            Event::Start,
            Event::Receive("welcome".into()),
            Event::Receive("motd".into()),
            Event::Send("hi".into()),
        ]
    );
    assert_eq!(count(&log, &Event::Receive("hi".into())), 1);
    assert_eq!(ev.last(), Some(&Event::TransportClosed));
}

#[tokio::test]
async fn frames_before_any_request_reach_on_receive_in_order() {
    greeting_precedes_first_request::<StreamingBackend>().await;
    greeting_precedes_first_request::<TransactionalBackend>().await;
}

// ════════════════════════════════════════════════════════════════════
// Ordering with the mock transport
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn each_request_gets_exactly_one_on_send() {
    let (mut client, log) = mock_client::<StreamingBackend>();
    client.connect().await.unwrap();

    for payload in ["a", "b", "c"] {
        client.request(payload).await.unwrap();
    }
    wait_for(&log, |ev| {
        ev.iter().filter(|e| matches!(e, Event::Receive(_))).count() == 3
    })
    .await;
    client.close().await;

    for payload in ["a", "b", "c"] {
        assert_eq!(count(&log, &Event::Send(payload.into())), 1);
        assert_eq!(count(&log, &Event::Receive(payload.into())), 1);
    }
}

#[tokio::test]
async fn wiretap_does_not_change_callbacks() {
    let addr = spawn_echo_server().await;
    let log = new_log();
    let mut client = TcpClient::<TransactionalBackend>::new(
        config(addr.port()).with_wiretap(true),
        RecordingListener::new(&log),
    );
    client.connect().await.unwrap();
    client.request("tap").await.unwrap();
    client.close().await;

    assert!(events(&log).contains(&Event::Request("tap".into(), Some("tap".into()), true)));
}
