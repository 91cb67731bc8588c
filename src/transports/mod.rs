//! Transport implementations.
//!
//! | Transport        | Connector        |
//! |------------------|------------------|
//! | [`TcpTransport`] | [`TcpConnector`] |
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), tcp_client::ClientError> {
//! use tcp_client::transport::{SocketOptions, Transport};
//! use tcp_client::{Endpoint, TcpTransport};
//!
//! let endpoint = Endpoint::new("127.0.0.1", 9000)?;
//! let mut tcp = TcpTransport::connect(&endpoint, &SocketOptions::default()).await?;
//! tcp.send("ping".to_string()).await?;
//!
//! if let Some(Ok(frame)) = tcp.recv().await {
//!     println!("server said: {frame}");
//! }
//!
//! tcp.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod tcp;

pub use tcp::{TcpConnector, TcpTransport};
