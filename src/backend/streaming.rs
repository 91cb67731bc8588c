//! Fire-and-forget backend: payloads are queued, frames are pushed as they arrive.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use super::{Backend, BackendSettings, IoTask, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::error::{ClientError, Result};
use crate::listener::SharedListener;
use crate::transport::Transport;

/// Backend that never suspends the caller.
///
/// `send` queues the payload and returns. The I/O task reports `on_send` when
/// it picks the payload up, immediately before writing it, whether or not the
/// peer ever acknowledges it. Every inbound frame is reported through
/// `on_receive` as it arrives.
///
/// Write failures are logged and end the I/O task; later `send`s then return
/// [`ClientError::TransportClosed`]. Nothing is retried.
#[derive(Debug)]
pub struct StreamingBackend {
    cmd_tx: Option<mpsc::UnboundedSender<String>>,
    io: IoTask,
    shutdown_timeout: Duration,
}

impl StreamingBackend {
    pub fn new() -> Self {
        Self {
            cmd_tx: None,
            io: IoTask::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl Default for StreamingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for StreamingBackend {
    async fn start(
        &mut self,
        transport: Box<dyn Transport>,
        listener: SharedListener,
        settings: BackendSettings,
    ) -> Result<()> {
        if self.cmd_tx.is_some() {
            return Err(ClientError::AlreadyConnected);
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<String>();
        self.io = IoTask::spawn(|shutdown_rx| io_loop(transport, cmd_rx, listener, shutdown_rx));
        self.cmd_tx = Some(cmd_tx);
        self.shutdown_timeout = settings.shutdown_timeout;
        Ok(())
    }

    async fn send(&mut self, payload: String) -> Result<()> {
        let Some(cmd_tx) = &self.cmd_tx else {
            return Err(ClientError::NotConnected);
        };
        cmd_tx.send(payload).map_err(|_| ClientError::TransportClosed)
    }

    async fn close(&mut self) {
        debug!("streaming backend: close requested");
        self.io.shutdown(self.shutdown_timeout).await;
        self.cmd_tx = None;
    }

    fn is_running(&self) -> bool {
        self.io.is_running()
    }
}

/// Write one queued payload, announcing it first.
async fn write_payload(
    transport: &mut dyn Transport,
    listener: &SharedListener,
    payload: String,
) -> Result<()> {
    listener.on_send(&payload);
    debug!(len = payload.len(), "writing payload");
    transport.send(payload).await
}

/// Multiplexes queued payloads, inbound frames and the shutdown signal.
///
/// Exits when:
/// - The shutdown signal fires (queued payloads are flushed first)
/// - The command channel closes
/// - The transport returns `None` (peer closed the connection)
/// - A transport read or write error occurs
async fn io_loop(
    mut transport: Box<dyn Transport>,
    mut cmd_rx: mpsc::UnboundedReceiver<String>,
    listener: SharedListener,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("streaming I/O loop started");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(payload) => {
                        if let Err(e) = write_payload(transport.as_mut(), &listener, payload).await {
                            error!("transport send error: {e}");
                            break;
                        }
                    }
                    None => {
                        debug!("command channel closed, shutting down I/O loop");
                        close_transport(transport.as_mut()).await;
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                while let Ok(payload) = cmd_rx.try_recv() {
                    if let Err(e) = write_payload(transport.as_mut(), &listener, payload).await {
                        error!("transport send error while flushing: {e}");
                        break;
                    }
                }
                close_transport(transport.as_mut()).await;
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(frame)) => {
                        debug!(len = frame.len(), "received frame");
                        listener.on_receive(&frame);
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        break;
                    }
                    None => {
                        debug!("transport closed by peer");
                        break;
                    }
                }
            }
        }
    }

    debug!("streaming I/O loop exited");
}

async fn close_transport(transport: &mut dyn Transport) {
    if let Err(e) = transport.close().await {
        warn!("failed to close transport: {e}");
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
    use crate::backend::test_support::{mock_transport, wait_for, Event, RecordingListener};
    use std::sync::Arc;

    #[tokio::test]
    async fn send_before_start_is_not_connected() {
        let mut backend = StreamingBackend::new();
        let err = backend.send("x".into()).await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
    }

    #[tokio::test]
    async fn echo_produces_send_then_receive() {
        let (transport, _inbound, log) = mock_transport(true);
        let mut backend = StreamingBackend::new();
        backend
            .start(
                Box::new(transport),
                Arc::new(RecordingListener(Arc::clone(&log))),
                BackendSettings::default(),
            )
            .await
            .unwrap();

        backend.send("ping".into()).await.unwrap();
        wait_for(&log, |events| events.contains(&Event::Receive("ping".into()))).await;

        let events = log.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                Event::Send("ping".into()),
                Event::Written("ping".into()),
                Event::Receive("ping".into()),
            ]
        );
        backend.close().await;
    }

    #[tokio::test]
    async fn every_inbound_frame_is_delivered_in_order() {
        let (transport, inbound, log) = mock_transport(false);
        let mut backend = StreamingBackend::new();
        backend
            .start(
                Box::new(transport),
                Arc::new(RecordingListener(Arc::clone(&log))),
                BackendSettings::default(),
            )
            .await
            .unwrap();

        for frame in ["a", "b", "c"] {
            inbound.send(Some(Ok(frame.into()))).unwrap();
        }
        wait_for(&log, |events| events.len() == 3).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Event::Receive("a".into()),
                Event::Receive("b".into()),
                Event::Receive("c".into()),
            ]
        );
        backend.close().await;
    }

    #[tokio::test]
    async fn close_flushes_queued_payloads_before_closing() {
        let (transport, _inbound, log) = mock_transport(false);
        let mut backend = StreamingBackend::new();
        backend
            .start(
                Box::new(transport),
                Arc::new(RecordingListener(Arc::clone(&log))),
                BackendSettings::default(),
            )
            .await
            .unwrap();

        backend.send("one".into()).await.unwrap();
        backend.send("two".into()).await.unwrap();
        backend.close().await;

        let events = log.lock().unwrap().clone();
        let written: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, Event::Written(_)))
            .cloned()
            .collect();
        assert_eq!(
            written,
            vec![Event::Written("one".into()), Event::Written("two".into())]
        );
        assert_eq!(events.last(), Some(&Event::Closed));
        assert!(!backend.is_running());
    }

    #[tokio::test]
    async fn write_failure_ends_loop_and_later_sends_fail() {
        let (mut transport, _inbound, log) = mock_transport(false);
        transport.fail_writes.push_back(true);
        let mut backend = StreamingBackend::new();
        backend
            .start(
                Box::new(transport),
                Arc::new(RecordingListener(Arc::clone(&log))),
                BackendSettings::default(),
            )
            .await
            .unwrap();

        backend.send("doomed".into()).await.unwrap();
        wait_for(&log, |events| events.contains(&Event::Send("doomed".into()))).await;

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
        while backend.is_running() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let err = backend.send("after".into()).await.unwrap_err();
        assert!(matches!(err, ClientError::TransportClosed));
        backend.close().await;
    }

    #[tokio::test]
    async fn double_close_does_not_panic() {
        let (transport, _inbound, log) = mock_transport(false);
        let mut backend = StreamingBackend::new();
        backend
            .start(
                Box::new(transport),
                Arc::new(RecordingListener(Arc::clone(&log))),
                BackendSettings::default(),
            )
            .await
            .unwrap();
        backend.close().await;
        backend.close().await;
        let closes = log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| **e == Event::Closed)
            .count();
        assert_eq!(closes, 1);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let (first, _in1, log) = mock_transport(false);
        let (second, _in2, _log2) = mock_transport(false);
        let listener: SharedListener = Arc::new(RecordingListener(log));
        let mut backend = StreamingBackend::new();
        backend
            .start(Box::new(first), Arc::clone(&listener), BackendSettings::default())
            .await
            .unwrap();
        let err = backend
            .start(Box::new(second), listener, BackendSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::AlreadyConnected));
        backend.close().await;
    }
}
