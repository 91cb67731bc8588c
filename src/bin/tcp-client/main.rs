//! `tcp-client`: send one message to a TCP server and print the exchange.
//!
//! ```sh
//! tcp-client message --host localhost --port 7 --message ping
//! tcp-client empty localhost 7 --backend transaction --wait 1
//! ```

mod cli;
mod console;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tcp_client::{Backend, ClientConfig, ClientError, Endpoint, TcpClient};
use tracing_subscriber::EnvFilter;

use crate::cli::{BackendKind, Cli, Invocation};
use crate::console::ConsoleListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let invocation = Invocation::from(Cli::parse().command);
    init_logging(invocation.common.debug, invocation.common.wiretap);

    match invocation.common.backend {
        BackendKind::Stream => run::<tcp_client::StreamingBackend>(invocation).await?,
        BackendKind::Transaction => run::<tcp_client::TransactionalBackend>(invocation).await?,
    }
    Ok(())
}

/// `--debug` forces library debug output; otherwise `RUST_LOG` applies.
fn init_logging(debug: bool, wiretap: bool) {
    let filter = if debug || wiretap {
        EnvFilter::new("tcp_client=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run<B: Backend + Default>(invocation: Invocation) -> Result<(), ClientError> {
    let Invocation {
        host,
        port,
        message,
        common,
    } = invocation;

    let endpoint = Endpoint::new(host, port)?;
    let console = Arc::new(ConsoleListener::for_console(
        endpoint.clone(),
        common.verbose,
    ));
    let config = ClientConfig::new(endpoint).with_wiretap(common.wiretap);
    let mut client = TcpClient::<B>::new(config, Arc::clone(&console));

    // ── Connect and send ────────────────────────────────────────────
    client.connect().await?;
    let sent = match message {
        Some(message) => client.request(message).await,
        None => client.request_empty().await,
    };
    if let Err(e) = sent {
        client.close().await;
        return Err(e);
    }

    // ── Wait for responses ──────────────────────────────────────────
    console.line(&format!("Waiting {} seconds for responses", common.wait));
    let wait = tokio::time::sleep(Duration::from_secs(common.wait));
    tokio::pin!(wait);
    let interrupted = tokio::select! {
        () = &mut wait => false,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("failed to listen for Ctrl+C: {e}");
                    (&mut wait).await;
                    false
                }
            }
        }
    };

    if interrupted {
        client.close().await;
        return Err(ClientError::Interrupted(
            "received Ctrl+C while waiting for responses".into(),
        ));
    }
    console.line("finished waiting");
    client.close().await;
    Ok(())
}
