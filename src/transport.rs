//! Transport abstraction beneath the client backends.
//!
//! The [`Transport`] trait is a bidirectional string channel to the remote
//! peer. Each call to [`send`](Transport::send) is one write event and each
//! item from [`recv`](Transport::recv) is one read event; no framing is added
//! on either side (see [`FrameCodec`](crate::frame::FrameCodec)).
//!
//! Opening a transport is the job of a [`Connector`]. The client calls its
//! connector from `connect()` and hands the resulting transport to the
//! backend, so tests can swap the socket for an in-process double.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use tcp_client::error::ClientError;
//! use tcp_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, payload: String) -> Result<(), ClientError> {
//!         // Write the payload bytes as a single write
//!         unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, ClientError>> {
//!         // Return whatever the next read event produced
//!         // Return None when the peer closed the connection
//!         unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ClientError> {
//!         // Shut down the connection
//!         unimplemented!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::endpoint::Endpoint;
use crate::error::ClientError;

/// A connected, bidirectional string transport.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because the
/// backends call it inside `tokio::select!`. If `recv` is cancelled before
/// completion, calling it again must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Write one payload to the peer and flush it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::TransportSend`] if the write fails, or
    /// [`ClientError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, payload: String) -> Result<(), ClientError>;

    /// Receive the next inbound frame.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: one read event's worth of text
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed by the peer
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, ClientError>>;

    /// Close the transport connection.
    ///
    /// Calling this more than once must succeed without side effects.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails. Implementations should still
    /// release resources in that case.
    async fn close(&mut self) -> Result<(), ClientError>;
}

/// Socket-level options applied when a connector opens a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOptions {
    /// Log every raw read and write under the `tcp_client::wiretap` target.
    pub wiretap: bool,
    /// Enable `SO_KEEPALIVE` on the socket.
    pub keep_alive: bool,
    /// Enable `TCP_NODELAY` on the socket.
    pub no_delay: bool,
    /// Upper bound for the connect attempt. `None` waits for the OS.
    pub connect_timeout: Option<std::time::Duration>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            wiretap: false,
            keep_alive: true,
            no_delay: false,
            connect_timeout: Some(std::time::Duration::from_secs(10)),
        }
    }
}

/// Opens transports to an [`Endpoint`].
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a connection to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connect`] or [`ClientError::ConnectTimeout`]
    /// when the socket cannot be established.
    async fn connect(
        &self,
        endpoint: &Endpoint,
        options: &SocketOptions,
    ) -> Result<Box<dyn Transport>, ClientError>;
}
