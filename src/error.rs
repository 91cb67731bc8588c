//! Error types for the TCP client.

use thiserror::Error;

/// Errors that can occur when using the TCP client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The endpoint host or port is not usable.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The socket to the remote endpoint could not be established.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        /// The `host:port` that was dialed.
        endpoint: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The connect attempt did not complete within the configured timeout.
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// `connect` was called on a client that already owns a connection.
    #[error("client is already connected")]
    AlreadyConnected,

    /// The client has been closed and cannot be reused.
    #[error("client is closed")]
    Closed,

    /// Failed to write a payload to the socket.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to read from the socket.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// A blocking wait was cut short before its outcome was known.
    #[error("wait interrupted: {0}")]
    Interrupted(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for TCP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
