//! # Loopback Echo Example
//!
//! Runs a tiny echo server on `127.0.0.1` and drives it with both client
//! flavors:
//!
//! 1. A [`StreamingClient`] queues two messages and collects the echoes
//! 2. A [`TransactionalClient`] waits for each echo before returning
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_echo
//!
//! # Watch every raw read and write:
//! RUST_LOG=tcp_client::wiretap=debug cargo run --example loopback_echo
//! ```

use std::time::Duration;

use tcp_client::{ClientConfig, Endpoint, Listener, StreamingClient, TransactionalClient};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Prints every callback with a prefix naming the client.
struct Printer(&'static str);

impl Listener for Printer {
    fn on_start(&self) {
        println!("[{}] starting", self.0);
    }

    fn on_stop(&self) {
        println!("[{}] stopping", self.0);
    }

    fn on_send(&self, payload: &str) {
        println!("[{}] sent {payload:?}", self.0);
    }

    fn on_receive(&self, payload: &str) {
        println!("[{}] received {payload:?}", self.0);
    }

    fn on_request(&self, request: &str, response: Option<&str>, success: bool) {
        println!(
            "[{}] request {request:?} -> {response:?} (success: {success})",
            self.0
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Echo server ─────────────────────────────────────────────────
    let server = TcpListener::bind("127.0.0.1:0").await?;
    let port = server.local_addr()?.port();
    tokio::spawn(async move {
        while let Ok((mut stream, peer)) = server.accept().await {
            tracing::info!(%peer, "echo server accepted connection");
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                while let Ok(n) = stream.read(&mut buf).await {
                    let Some(chunk) = buf.get(..n).filter(|c| !c.is_empty()) else {
                        break;
                    };
                    if stream.write_all(chunk).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    let config = ClientConfig::new(Endpoint::new("127.0.0.1", port)?).with_wiretap(true);

    // ── Streaming ───────────────────────────────────────────────────
    let mut streaming = StreamingClient::new(config.clone(), Printer("stream"));
    streaming.connect().await?;
    streaming.request("hello").await?;
    streaming.request_empty().await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    streaming.close().await;

    // ── Transactional ───────────────────────────────────────────────
    let mut transactional = TransactionalClient::new(
        config.with_response_timeout(Duration::from_millis(500)),
        Printer("transaction"),
    );
    transactional.connect().await?;
    transactional.request("ping").await?;
    transactional.request_empty().await?;
    transactional.close().await;

    Ok(())
}
