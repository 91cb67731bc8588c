//! Client facade over a pluggable I/O backend.
//!
//! [`TcpClient`] enforces the connection state machine and fires the
//! lifecycle callbacks; the actual socket work is delegated to a
//! [`Backend`]. The backend is a type parameter, so the same facade serves
//! both the streaming and the transactional flavor:
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), tcp_client::ClientError> {
//! use tcp_client::{ClientConfig, Endpoint, Listener, StreamingClient};
//!
//! struct Printer;
//!
//! impl Listener for Printer {
//!     fn on_receive(&self, payload: &str) {
//!         println!("received: {payload}");
//!     }
//! }
//!
//! let config = ClientConfig::new(Endpoint::new("127.0.0.1", 9000)?);
//! let mut client = StreamingClient::new(config, Printer);
//!
//! client.connect().await?;
//! client.request("ping").await?;
//! tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//! client.close().await;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::backend::{
    Backend, BackendSettings, StreamingBackend, TransactionalBackend, DEFAULT_RESPONSE_TIMEOUT,
    DEFAULT_SHUTDOWN_TIMEOUT,
};
use crate::endpoint::Endpoint;
use crate::error::{ClientError, Result};
use crate::listener::{Listener, SharedListener};
use crate::transport::{Connector, SocketOptions};
use crate::transports::TcpConnector;

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`TcpClient`].
///
/// The only required field is the endpoint; all others have defaults.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tcp_client::{ClientConfig, Endpoint};
///
/// let config = ClientConfig::new(Endpoint::new("localhost", 9000).unwrap())
///     .with_wiretap(true)
///     .with_response_timeout(Duration::from_secs(5));
/// assert!(config.socket.wiretap);
/// assert_eq!(config.response_timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remote peer.
    pub endpoint: Endpoint,
    /// Socket options, including the wiretap flag.
    pub socket: SocketOptions,
    /// Wait budget of a transactional request.
    ///
    /// Defaults to **2 seconds**.
    pub response_timeout: Duration,
    /// Time `close` grants the I/O task before aborting it.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration for `endpoint` with default values.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            socket: SocketOptions::default(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Enable or disable wiretap logging.
    #[must_use]
    pub fn with_wiretap(mut self, enabled: bool) -> Self {
        self.socket.wiretap = enabled;
        self
    }

    /// Bound the connect attempt. `None` leaves it to the OS.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.socket.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, enabled: bool) -> Self {
        self.socket.keep_alive = enabled;
        self
    }

    #[must_use]
    pub fn with_no_delay(mut self, enabled: bool) -> Self {
        self.socket.no_delay = enabled;
        self
    }

    fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            response_timeout: self.response_timeout,
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

// ── Connection state ────────────────────────────────────────────────

/// Lifecycle state of a [`TcpClient`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection has been opened yet.
    #[default]
    Disconnected,
    /// `connect` is in progress.
    Connecting,
    /// The socket is established and requests may be sent.
    Connected,
    /// `close` is tearing the connection down.
    Closing,
    /// The connection is gone; the client cannot be reused.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Single-connection TCP client.
///
/// Owns exactly one connection over its lifetime: `connect` opens it, `close`
/// releases it. Dropping the client without `close` aborts the I/O task
/// without firing `on_stop`.
pub struct TcpClient<B: Backend> {
    config: ClientConfig,
    listener: SharedListener,
    connector: Arc<dyn Connector>,
    backend: B,
    state: ConnectionState,
}

/// Client whose requests return as soon as the payload is queued.
pub type StreamingClient = TcpClient<StreamingBackend>;

/// Client whose requests wait for their response.
pub type TransactionalClient = TcpClient<TransactionalBackend>;

impl<B: Backend + Default> TcpClient<B> {
    /// Create a client with a default-constructed backend.
    pub fn new(config: ClientConfig, listener: impl Listener) -> Self {
        Self::with_backend(config, listener, B::default())
    }
}

impl<B: Backend> TcpClient<B> {
    /// Create a client around an explicitly constructed backend.
    pub fn with_backend(config: ClientConfig, listener: impl Listener, backend: B) -> Self {
        Self {
            config,
            listener: Arc::new(listener),
            connector: Arc::new(TcpConnector),
            backend,
            state: ConnectionState::Disconnected,
        }
    }

    /// Replace the connector used by [`connect`](Self::connect).
    #[must_use]
    pub fn with_connector(mut self, connector: impl Connector) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Toggle wiretap logging. Ignored once `connect` has been called.
    pub fn set_wiretap(&mut self, enabled: bool) {
        if self.state != ConnectionState::Disconnected {
            warn!(state = %self.state, "wiretap can only be changed before connect");
            return;
        }
        self.config.socket.wiretap = enabled;
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Open the connection.
    ///
    /// Fires [`Listener::on_start`] before the socket attempt.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Connect`] / [`ClientError::ConnectTimeout`] if the
    ///   socket cannot be established; the client stays `Disconnected`.
    /// - [`ClientError::AlreadyConnected`] if a connection is already open.
    /// - [`ClientError::Closed`] after [`close`](Self::close).
    pub async fn connect(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Disconnected => {}
            ConnectionState::Closing | ConnectionState::Closed => {
                return Err(ClientError::Closed);
            }
            ConnectionState::Connecting | ConnectionState::Connected => {
                return Err(ClientError::AlreadyConnected);
            }
        }

        debug!(endpoint = %self.config.endpoint, "starting client");
        self.state = ConnectionState::Connecting;
        self.listener.on_start();

        let transport = match self
            .connector
            .connect(&self.config.endpoint, &self.config.socket)
            .await
        {
            Ok(transport) => transport,
            Err(e) => {
                error!(endpoint = %self.config.endpoint, "connect failed: {e}");
                self.state = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        let settings = self.config.backend_settings();
        if let Err(e) = self
            .backend
            .start(transport, SharedListener::clone(&self.listener), settings)
            .await
        {
            error!("backend failed to start: {e}");
            self.state = ConnectionState::Disconnected;
            return Err(e);
        }

        self.state = ConnectionState::Connected;
        debug!(endpoint = %self.config.endpoint, "connected");
        Ok(())
    }

    /// Send an empty payload. Equivalent to `request("")`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn request_empty(&mut self) -> Result<()> {
        self.request(String::new()).await
    }

    /// Send `payload` over the connection.
    ///
    /// With [`StreamingBackend`] this returns once the payload is queued;
    /// with [`TransactionalBackend`] it returns once the exchange resolved.
    /// Write failures are reported to the listener, not returned.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] outside the `Connected` state.
    /// - [`ClientError::TransportClosed`] if the connection already ended.
    /// - [`ClientError::Interrupted`] if the I/O task vanished mid-request.
    pub async fn request(&mut self, payload: impl Into<String>) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let payload = payload.into();
        if payload.is_empty() {
            debug!("sending empty message");
        } else {
            debug!(len = payload.len(), "sending message");
        }
        self.backend.send(payload).await
    }

    /// Close the connection.
    ///
    /// Fires [`Listener::on_stop`] strictly before the transport is torn
    /// down. Calling `close` before `connect`, or again after it completed,
    /// does nothing.
    pub async fn close(&mut self) {
        match self.state {
            ConnectionState::Disconnected => {
                debug!("close before connect, nothing to tear down");
                return;
            }
            ConnectionState::Closing | ConnectionState::Closed => {
                debug!("client already closed");
                return;
            }
            ConnectionState::Connecting | ConnectionState::Connected => {}
        }

        debug!("stopping client");
        self.state = ConnectionState::Closing;
        self.listener.on_stop();
        self.backend.close().await;
        self.state = ConnectionState::Closed;
        debug!("stopped client");
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns `true` while the client is connected and its I/O task is alive.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.backend.is_running()
    }

    /// Returns the remote peer this client connects to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    /// Returns the configuration the client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl<B: Backend> fmt::Debug for TcpClient<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpClient")
            .field("endpoint", &self.config.endpoint.to_string())
            .field("state", &self.state)
            .field("wiretap", &self.config.socket.wiretap)
            .field("running", &self.backend.is_running())
            .finish()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::backend::test_support::{mock_transport, Event, Log, MockTransport, RecordingListener};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Connector that hands out one pre-built mock transport.
    struct OnceConnector(Mutex<Option<MockTransport>>);

    #[async_trait]
    impl Connector for OnceConnector {
        async fn connect(
            &self,
            endpoint: &Endpoint,
            _options: &SocketOptions,
        ) -> Result<Box<dyn crate::transport::Transport>> {
            match self.0.lock().unwrap().take() {
                Some(transport) => Ok(Box::new(transport)),
                None => Err(ClientError::Connect {
                    endpoint: endpoint.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
                }),
            }
        }
    }

    fn config() -> ClientConfig {
        ClientConfig::new(Endpoint::new("127.0.0.1", 9000).unwrap())
    }

    fn mock_client(echo: bool) -> (StreamingClient, Log) {
        let (transport, _inbound, log) = mock_transport(echo);
        let client = StreamingClient::new(config(), RecordingListener(Arc::clone(&log)))
            .with_connector(OnceConnector(Mutex::new(Some(transport))));
        (client, log)
    }

    #[test]
    fn config_defaults() {
        let config = config();
        assert!(!config.socket.wiretap);
        assert!(config.socket.keep_alive);
        assert!(!config.socket.no_delay);
        assert_eq!(config.socket.connect_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.response_timeout, Duration::from_secs(2));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn config_builder_methods() {
        let config = config()
            .with_wiretap(true)
            .with_connect_timeout(None)
            .with_keep_alive(false)
            .with_no_delay(true)
            .with_shutdown_timeout(Duration::from_secs(5));
        assert!(config.socket.wiretap);
        assert_eq!(config.socket.connect_timeout, None);
        assert!(!config.socket.keep_alive);
        assert!(config.socket.no_delay);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn state_display() {
        assert_eq!(ConnectionState::default().to_string(), "Disconnected");
        assert_eq!(ConnectionState::Closing.to_string(), "Closing");
    }

    #[test]
    fn accessors_reflect_construction() {
        let (client, _log) = mock_client(false);
        assert_eq!(client.endpoint().to_string(), "127.0.0.1:9000");
        assert_eq!(client.config().endpoint, *client.endpoint());
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_moves_to_connected() {
        let (mut client, _log) = mock_client(false);
        assert_eq!(client.state(), ConnectionState::Disconnected);
        client.connect().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Connected);
        assert!(client.is_connected());
        client.close().await;
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let (mut client, _log) = mock_client(false);
        client.connect().await.unwrap();
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, ClientError::AlreadyConnected));
        client.close().await;
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, ClientError::Closed));
    }

    #[tokio::test]
    async fn failed_connect_returns_to_disconnected() {
        let mut client = StreamingClient::new(config(), RecordingListener(Log::default()))
            .with_connector(OnceConnector(Mutex::new(None)));
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn request_before_connect_is_not_connected() {
        let (mut client, log) = mock_client(false);
        let err = client.request("x").await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
        let err = client.request_empty().await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_before_connect_is_a_no_op() {
        let (mut client, log) = mock_client(false);
        client.close().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_wiretap_only_before_connect() {
        let (mut client, _log) = mock_client(false);
        client.set_wiretap(true);
        assert!(client.config().socket.wiretap);
        client.connect().await.unwrap();
        client.set_wiretap(false);
        assert!(client.config().socket.wiretap);
        client.close().await;
    }

    #[tokio::test]
    async fn close_tears_down_transport() {
        let (mut client, log) = mock_client(false);
        client.connect().await.unwrap();
        client.close().await;
        client.close().await;
        assert_eq!(*log.lock().unwrap(), vec![Event::Closed]);
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (client, _log) = mock_client(false);
        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("TcpClient"));
        assert!(debug_str.contains("127.0.0.1:9000"));
        assert!(debug_str.contains("Disconnected"));
    }
}
