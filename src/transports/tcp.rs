//! Raw TCP transport built on `tokio::net`.
//!
//! [`TcpTransport`] wraps a [`TcpStream`] in a [`Framed`] with the
//! pass-through [`FrameCodec`], so one read event is one frame and one send is
//! one write. [`TcpConnector`] is the default [`Connector`] used by the client.
//!
//! With the wiretap option on, every connect, read, write and close is logged
//! at `debug` under the `tcp_client::wiretap` target.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio_util::codec::Framed;
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::ClientError;
use crate::frame::FrameCodec;
use crate::transport::{Connector, SocketOptions, Transport};

const WIRETAP: &str = "tcp_client::wiretap";

/// A [`Transport`] backed by a single TCP connection.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) only awaits the framed stream, which buffers
/// partially read data internally, so it is safe to use inside `tokio::select!`.
#[derive(Debug)]
pub struct TcpTransport {
    framed: Framed<TcpStream, FrameCodec>,
    peer: String,
    wiretap: bool,
    closed: bool,
}

impl TcpTransport {
    /// Resolve `endpoint` and connect to the first address that accepts.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connect`] if resolution fails or every address
    /// refuses, and [`ClientError::ConnectTimeout`] if
    /// [`SocketOptions::connect_timeout`] elapses first.
    pub async fn connect(endpoint: &Endpoint, options: &SocketOptions) -> Result<Self, ClientError> {
        debug!(%endpoint, "connecting to TCP server");

        let stream = match options.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, open_stream(endpoint, options))
                .await
                .map_err(|_| ClientError::ConnectTimeout(endpoint.to_string()))??,
            None => open_stream(endpoint, options).await?,
        };

        debug!(%endpoint, "TCP connection established");
        if options.wiretap {
            debug!(
                target: WIRETAP,
                peer = %endpoint,
                local = ?stream.local_addr().ok(),
                "CONNECTED"
            );
        }

        Ok(Self {
            framed: Framed::new(stream, FrameCodec::new()),
            peer: endpoint.to_string(),
            wiretap: options.wiretap,
            closed: false,
        })
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: TcpStream, wiretap: bool) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            framed: Framed::new(stream, FrameCodec::new()),
            peer,
            wiretap,
            closed: false,
        }
    }

    /// The peer this transport was opened to.
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

async fn open_stream(endpoint: &Endpoint, options: &SocketOptions) -> Result<TcpStream, ClientError> {
    let connect_err = |source: io::Error| ClientError::Connect {
        endpoint: endpoint.to_string(),
        source,
    };

    let addrs = lookup_host((endpoint.host(), endpoint.port()))
        .await
        .map_err(connect_err)?;

    let mut last_err = None;
    for addr in addrs {
        match open_socket(addr, options).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, "connect attempt failed: {e}");
                last_err = Some(e);
            }
        }
    }

    Err(connect_err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
    })))
}

async fn open_socket(addr: SocketAddr, options: &SocketOptions) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_keepalive(options.keep_alive)?;
    let stream = socket.connect(addr).await?;
    stream.set_nodelay(options.no_delay)?;
    Ok(stream)
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, payload: String) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::TransportClosed);
        }
        if self.wiretap {
            debug!(target: WIRETAP, peer = %self.peer, len = payload.len(), "WRITE {payload:?}");
        }
        self.framed
            .send(payload)
            .await
            .map_err(|e| ClientError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ClientError>> {
        if self.closed {
            return None;
        }
        match self.framed.next().await {
            Some(Ok(frame)) => {
                if self.wiretap {
                    debug!(target: WIRETAP, peer = %self.peer, len = frame.len(), "READ {frame:?}");
                }
                Some(Ok(frame))
            }
            Some(Err(e)) => Some(Err(ClientError::TransportReceive(e.to_string()))),
            None => {
                if self.wiretap {
                    debug!(target: WIRETAP, peer = %self.peer, "EOF");
                }
                None
            }
        }
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.wiretap {
            debug!(target: WIRETAP, peer = %self.peer, "CLOSE");
        }
        self.framed
            .get_mut()
            .shutdown()
            .await
            .map_err(|e| ClientError::TransportSend(e.to_string()))
    }
}

/// The default [`Connector`]: opens a [`TcpTransport`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        options: &SocketOptions,
    ) -> Result<Box<dyn Transport>, ClientError> {
        let transport = TcpTransport::connect(endpoint, options).await?;
        Ok(Box::new(transport))
    }
}

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
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn tcp_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<TcpTransport>();
    }

    /// Start a local TCP server that runs `handler` on the accepted
    /// connection and returns the endpoint to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> Endpoint
    where
        F: FnOnce(TcpStream) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            handler(tcp).await;
        });

        Endpoint::new("127.0.0.1", addr.port()).unwrap()
    }

    /// A port on which nothing is listening.
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn connect_fails_when_nothing_listens() {
        let endpoint = Endpoint::new("127.0.0.1", closed_port().await).unwrap();
        let err = TcpTransport::connect(&endpoint, &SocketOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // Non-routable address (TEST-NET-1) so the SYN goes unanswered.
        let endpoint = Endpoint::new("192.0.2.1", 1).unwrap();
        let options = SocketOptions {
            connect_timeout: Some(std::time::Duration::from_millis(50)),
            ..SocketOptions::default()
        };
        let err = TcpTransport::connect(&endpoint, &options).await.unwrap_err();
        assert!(
            matches!(err, ClientError::ConnectTimeout(_) | ClientError::Connect { .. }),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn send_round_trip() {
        let endpoint = start_mock_server(|mut tcp| async move {
            let mut buf = [0u8; 64];
            let n = tcp.read(&mut buf).await.unwrap();
            tcp.write_all(&buf[..n]).await.unwrap();
        })
        .await;

        let mut transport = TcpTransport::connect(&endpoint, &SocketOptions::default())
            .await
            .unwrap();
        transport.send("ping_echo".to_string()).await.unwrap();

        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(frame, "ping_echo");
    }

    #[tokio::test]
    async fn wiretap_does_not_change_payloads() {
        let endpoint = start_mock_server(|mut tcp| async move {
            let mut buf = [0u8; 64];
            let n = tcp.read(&mut buf).await.unwrap();
            tcp.write_all(&buf[..n]).await.unwrap();
        })
        .await;

        let options = SocketOptions {
            wiretap: true,
            ..SocketOptions::default()
        };
        let mut transport = TcpTransport::connect(&endpoint, &options).await.unwrap();
        transport.send("tapped".to_string()).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "tapped");
    }

    #[tokio::test]
    async fn recv_returns_none_when_peer_closes() {
        let endpoint = start_mock_server(|tcp| async move {
            drop(tcp);
        })
        .await;

        let mut transport = TcpTransport::connect(&endpoint, &SocketOptions::default())
            .await
            .unwrap();
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let endpoint = start_mock_server(|mut tcp| async move {
            let mut buf = [0u8; 16];
            while let Ok(n) = tcp.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
        })
        .await;

        let mut transport = TcpTransport::connect(&endpoint, &SocketOptions::default())
            .await
            .unwrap();
        transport.close().await.unwrap();

        let err = transport.send("oops".to_string()).await.unwrap_err();
        assert!(matches!(err, ClientError::TransportClosed));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn double_close_is_idempotent() {
        let endpoint = start_mock_server(|mut tcp| async move {
            let mut buf = [0u8; 16];
            let _ = tcp.read(&mut buf).await;
        })
        .await;

        let mut transport = TcpTransport::connect(&endpoint, &SocketOptions::default())
            .await
            .unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn connector_returns_boxed_transport() {
        let endpoint = start_mock_server(|mut tcp| async move {
            tcp.write_all(b"hello").await.unwrap();
        })
        .await;

        let mut transport = TcpConnector
            .connect(&endpoint, &SocketOptions::default())
            .await
            .unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "hello");
    }
}
