//! # TCP Client
//!
//! Asynchronous single-connection TCP client with callback-based observation.
//!
//! The crate connects to one `host:port`, writes UTF-8 text payloads and
//! reports everything that happens on the connection through a [`Listener`].
//!
//! ## Features
//!
//! - **Two backends**: [`StreamingBackend`] queues payloads and pushes every
//!   inbound frame; [`TransactionalBackend`] waits for each request's response
//! - **Pluggable transport**: implement [`Transport`] and [`Connector`] to run
//!   the client over something other than a TCP socket
//! - **Wiretap**: log every connect, read, write and close at `debug` level
//!   on the `tcp_client::wiretap` target
//! - **CLI**: the default `cli` feature builds the `tcp-client` binary
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tcp_client::{ClientConfig, Endpoint, Listener, TransactionalClient};
//!
//! struct Log;
//!
//! impl Listener for Log {
//!     fn on_request(&self, request: &str, response: Option<&str>, success: bool) {
//!         println!("{request} -> {response:?} (success: {success})");
//!     }
//! }
//!
//! # async fn run() -> Result<(), tcp_client::ClientError> {
//! let config = ClientConfig::new(Endpoint::new("localhost", 7)?);
//! let mut client = TransactionalClient::new(config, Log);
//!
//! client.connect().await?;
//! client.request("ping").await?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod listener;
pub mod transaction;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use backend::{Backend, BackendSettings, StreamingBackend, TransactionalBackend};
pub use client::{
    ClientConfig, ConnectionState, StreamingClient, TcpClient, TransactionalClient,
};
pub use endpoint::Endpoint;
pub use error::ClientError;
pub use frame::FrameCodec;
pub use listener::{Listener, NoopListener, SharedListener};
pub use transaction::{PendingTransaction, Transaction, TransactionPhase};
pub use transport::{Connector, SocketOptions, Transport};
pub use transports::{TcpConnector, TcpTransport};
