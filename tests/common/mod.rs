#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for TCP client integration tests.
//!
//! Provides a [`RecordingListener`] whose event log is shared with the
//! [`MockTransport`], so tests can assert the relative order of callbacks and
//! transport operations, plus a loopback echo server on `127.0.0.1:0`.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tcp_client::transport::{Connector, SocketOptions};
use tcp_client::{ClientError, Endpoint, Listener, Transport};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// ── Event log ───────────────────────────────────────────────────────

/// One observable event from either the listener or the mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    Stop,
    Send(String),
    Receive(String),
    Request(String, Option<String>, bool),
    TransportClosed,
}

pub type EventLog = Arc<StdMutex<Vec<Event>>>;

pub fn new_log() -> EventLog {
    Arc::new(StdMutex::new(Vec::new()))
}

/// Snapshot of the log.
pub fn events(log: &EventLog) -> Vec<Event> {
    log.lock().unwrap().clone()
}

/// Poll the log until `pred` holds, panicking after two seconds.
pub async fn wait_for(log: &EventLog, pred: impl Fn(&[Event]) -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if pred(&log.lock().unwrap()) {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not reached; events = {:?}", events(log));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ── RecordingListener ───────────────────────────────────────────────

/// Listener that appends every callback to a shared log.
pub struct RecordingListener {
    log: EventLog,
}

impl RecordingListener {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: Arc::clone(log),
        }
    }

    fn push(&self, event: Event) {
        self.log.lock().unwrap().push(event);
    }
}

impl Listener for RecordingListener {
    fn on_start(&self) {
        self.push(Event::Start);
    }

    fn on_stop(&self) {
        self.push(Event::Stop);
    }

    fn on_send(&self, payload: &str) {
        self.push(Event::Send(payload.to_string()));
    }

    fn on_receive(&self, payload: &str) {
        self.push(Event::Receive(payload.to_string()));
    }

    fn on_request(&self, request: &str, response: Option<&str>, success: bool) {
        self.push(Event::Request(
            request.to_string(),
            response.map(str::to_string),
            success,
        ));
    }
}

// ── MockTransport ───────────────────────────────────────────────────

/// In-process transport that echoes non-empty writes back as frames.
///
/// Scripted frames in `incoming` are delivered first; once exhausted, `recv`
/// yields echoes and otherwise hangs so the I/O loop stays alive until close.
pub struct MockTransport {
    log: EventLog,
    incoming: VecDeque<String>,
    echo_tx: tokio::sync::mpsc::UnboundedSender<String>,
    echo_rx: tokio::sync::mpsc::UnboundedReceiver<String>,
}

impl MockTransport {
    pub fn new(log: &EventLog, incoming: Vec<String>) -> Self {
        let (echo_tx, echo_rx) = tokio::sync::mpsc::unbounded_channel();
        Self {
            log: Arc::clone(log),
            incoming: VecDeque::from(incoming),
            echo_tx,
            echo_rx,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, payload: String) -> Result<(), ClientError> {
        if !payload.is_empty() {
            let _ = self.echo_tx.send(payload);
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ClientError>> {
        if let Some(frame) = self.incoming.pop_front() {
            return Some(Ok(frame));
        }
        // The transport holds its own sender, so this only ever yields echoes.
        self.echo_rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.log.lock().unwrap().push(Event::TransportClosed);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Connector that opens a fresh [`MockTransport`] on the shared log, or
/// refuses every attempt when built with [`MockConnector::refusing`].
pub struct MockConnector {
    log: EventLog,
    refuse: bool,
    greeting: Vec<String>,
}

impl MockConnector {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: Arc::clone(log),
            refuse: false,
            greeting: Vec::new(),
        }
    }

    pub fn refusing(log: &EventLog) -> Self {
        Self {
            refuse: true,
            ..Self::new(log)
        }
    }

    /// Transports from this connector deliver `frames` as soon as they open.
    pub fn greeting(log: &EventLog, frames: &[&str]) -> Self {
        Self {
            greeting: frames.iter().map(|f| f.to_string()).collect(),
            ..Self::new(log)
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        _options: &SocketOptions,
    ) -> Result<Box<dyn Transport>, ClientError> {
        if self.refuse {
            return Err(ClientError::Connect {
                endpoint: endpoint.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            });
        }
        Ok(Box::new(MockTransport::new(&self.log, self.greeting.clone())))
    }
}

// ── Echo server ─────────────────────────────────────────────────────

/// Spawn a TCP server on `127.0.0.1:0` that echoes every read back verbatim.
///
/// An empty write from the client produces no bytes on the wire, so the
/// server never answers it.
pub async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

/// Bind then drop a listener, returning a local port nothing listens on.
pub async fn unused_local_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
