//! Request/response backend: each `send` waits for its own outcome.
//!
//! The caller and the I/O task exchange the transaction state through two
//! oneshot channels per request. The I/O task publishes the write result on
//! the first and the first frame read after a successful write on the second;
//! the caller awaits both against a single deadline.
//!
//! Until the caller has reported the transaction and sent
//! [`Command::Resolved`], the I/O task holds every further frame back. The
//! listener therefore sees frames in arrival order, and never before the
//! `on_send` of the request they answer.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, trace, warn};

use super::{Backend, BackendSettings, IoTask};
use crate::error::{ClientError, Result};
use crate::listener::SharedListener;
use crate::transaction::{PendingTransaction, TransactionPhase};
use crate::transport::Transport;

/// Instructions from the caller to the I/O task.
enum Command {
    /// Write a payload and open a transaction for it.
    Request {
        payload: String,
        written: oneshot::Sender<Result<()>>,
        response: oneshot::Sender<String>,
    },
    /// The caller has reported the open transaction; release held frames.
    Resolved,
}

/// Backend that suspends `send` until the transaction resolves.
///
/// `send` returns once the write is confirmed or failed and either a response
/// frame arrived or [`BackendSettings::response_timeout`] elapsed. The
/// listener then sees `on_send`, `on_receive` (if a response arrived) and
/// finally `on_request` with the consolidated outcome. A failed write still
/// gets its `on_send`; the failure shows up as `success == false`.
///
/// Frames that arrive while no request is waiting are reported through
/// `on_receive` directly from the I/O task. Frames that arrive after the
/// response, or after the deadline, are held until the transaction has been
/// reported and then delivered in arrival order.
pub struct TransactionalBackend {
    cmd_tx: Option<mpsc::UnboundedSender<Command>>,
    listener: Option<SharedListener>,
    io: IoTask,
    settings: BackendSettings,
}

impl std::fmt::Debug for TransactionalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalBackend")
            .field("running", &self.is_running())
            .field("settings", &self.settings)
            .finish()
    }
}

impl TransactionalBackend {
    pub fn new() -> Self {
        Self {
            cmd_tx: None,
            listener: None,
            io: IoTask::default(),
            settings: BackendSettings::default(),
        }
    }

    /// Wait for the I/O task to resolve `pending`.
    async fn await_outcome(
        &self,
        pending: &mut PendingTransaction,
        written_rx: oneshot::Receiver<Result<()>>,
        mut response_rx: oneshot::Receiver<String>,
    ) -> Result<()> {
        let budget = self.settings.response_timeout;
        let deadline = Instant::now() + budget;

        trace!("waiting until the write is confirmed");
        match timeout_at(deadline, written_rx).await {
            Ok(Ok(Ok(()))) => pending.mark_sent(),
            Ok(Ok(Err(e))) => {
                debug!("request write failed: {e}");
                pending.mark_failed();
            }
            Ok(Err(_)) => {
                return Err(ClientError::Interrupted(
                    "I/O task stopped before the write completed".into(),
                ));
            }
            Err(_) => {
                warn!(?budget, "write not confirmed in time");
                pending.mark_failed();
            }
        }

        if pending.phase() == TransactionPhase::AwaitingResponse {
            trace!("waiting for a response frame");
            match timeout_at(deadline, &mut response_rx).await {
                Ok(Ok(frame)) => pending.record_response(frame),
                Ok(Err(_)) => debug!("connection ended before a response arrived"),
                Err(_) => debug!(?budget, "no response in time"),
            }
        }

        // Closing first means any frame the I/O task has not handed over yet
        // stays with it and is held; one that raced the deadline is kept here.
        response_rx.close();
        if let Ok(frame) = response_rx.try_recv() {
            pending.record_response(frame);
        }
        trace!("finished waiting for response");
        Ok(())
    }
}

impl Default for TransactionalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for TransactionalBackend {
    async fn start(
        &mut self,
        transport: Box<dyn Transport>,
        listener: SharedListener,
        settings: BackendSettings,
    ) -> Result<()> {
        if self.cmd_tx.is_some() {
            return Err(ClientError::AlreadyConnected);
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        let loop_listener = SharedListener::clone(&listener);
        self.io =
            IoTask::spawn(|shutdown_rx| io_loop(transport, cmd_rx, loop_listener, shutdown_rx));
        self.cmd_tx = Some(cmd_tx);
        self.listener = Some(listener);
        self.settings = settings;
        Ok(())
    }

    async fn send(&mut self, payload: String) -> Result<()> {
        let (Some(cmd_tx), Some(listener)) = (&self.cmd_tx, &self.listener) else {
            return Err(ClientError::NotConnected);
        };
        let listener = SharedListener::clone(listener);

        let mut pending = PendingTransaction::new(payload.clone());
        let (written_tx, written_rx) = oneshot::channel();
        let (response_tx, response_rx) = oneshot::channel();
        cmd_tx
            .send(Command::Request {
                payload,
                written: written_tx,
                response: response_tx,
            })
            .map_err(|_| ClientError::TransportClosed)?;
        let cmd_tx = cmd_tx.clone();

        self.await_outcome(&mut pending, written_rx, response_rx)
            .await?;

        listener.on_send(pending.payload());
        if let Some(response) = pending.response() {
            listener.on_receive(response);
        }
        let outcome = pending.finish();
        if outcome.success {
            debug!("successful request");
        } else {
            warn!("request failure");
        }
        listener.on_request(&outcome.request, outcome.response.as_deref(), outcome.success);

        if cmd_tx.send(Command::Resolved).is_err() {
            debug!("I/O task gone before the transaction was resolved");
        }
        Ok(())
    }

    async fn close(&mut self) {
        debug!("transactional backend: close requested");
        self.io.shutdown(self.settings.shutdown_timeout).await;
        self.cmd_tx = None;
        self.listener = None;
    }

    fn is_running(&self) -> bool {
        self.io.is_running()
    }
}

/// Multiplexes request commands, inbound frames and the shutdown signal.
///
/// At most one transaction is open at a time. While it is open, the first
/// frame after a successful write goes to the waiting caller and every other
/// frame is held until [`Command::Resolved`] arrives.
async fn io_loop(
    mut transport: Box<dyn Transport>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    listener: SharedListener,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("transactional I/O loop started");

    let mut awaiting: Option<oneshot::Sender<String>> = None;
    let mut held: Option<Vec<String>> = None;
    let mut peer_gone = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Request { payload, written, response }) => {
                        // A caller that was dropped mid-request never resolves.
                        release_held(&listener, held.take());
                        if peer_gone {
                            debug!("request after peer close, ending I/O loop");
                            break;
                        }
                        held = Some(Vec::new());

                        debug!(len = payload.len(), "writing request");
                        match transport.send(payload).await {
                            Ok(()) => {
                                // Register before confirming so the response cannot race past.
                                awaiting = Some(response);
                                let _ = written.send(Ok(()));
                            }
                            Err(e) => {
                                error!("transport send error: {e}");
                                let _ = written.send(Err(e));
                            }
                        }
                    }
                    Some(Command::Resolved) => {
                        awaiting = None;
                        release_held(&listener, held.take());
                        if peer_gone {
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
                if let Some(frames) = held.take().filter(|frames| !frames.is_empty()) {
                    debug!(count = frames.len(), "discarding frames of an unresolved transaction");
                }
                close_transport(transport.as_mut()).await;
                break;
            }

            incoming = transport.recv(), if !peer_gone => {
                match incoming {
                    Some(Ok(frame)) => {
                        let unclaimed = match awaiting.take() {
                            Some(tx) => tx.send(frame).err(),
                            None => Some(frame),
                        };
                        if let Some(frame) = unclaimed {
                            match held.as_mut() {
                                Some(frames) => {
                                    trace!(len = frame.len(), "holding frame until the transaction resolves");
                                    frames.push(frame);
                                }
                                None => {
                                    debug!(len = frame.len(), "frame outside a transaction");
                                    listener.on_receive(&frame);
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        if held.is_none() {
                            break;
                        }
                        awaiting = None;
                        peer_gone = true;
                    }
                    None => {
                        debug!("transport closed by peer");
                        if held.is_none() {
                            break;
                        }
                        // Let the caller report the open transaction before
                        // the held frames are released.
                        awaiting = None;
                        peer_gone = true;
                    }
                }
            }
        }
    }

    debug!("transactional I/O loop exited");
}

fn release_held(listener: &SharedListener, frames: Option<Vec<String>>) {
    for frame in frames.into_iter().flatten() {
        listener.on_receive(&frame);
    }
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
    use std::time::Duration;

    fn fast_settings() -> BackendSettings {
        BackendSettings {
            response_timeout: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn new_starts_idle_with_default_settings() {
        let backend = TransactionalBackend::new();
        assert_eq!(backend.settings, BackendSettings::default());
        assert!(!backend.is_running());
    }

    async fn started(
        echo: bool,
        fail_first_write: bool,
    ) -> (
        TransactionalBackend,
        mpsc::UnboundedSender<Option<Result<String>>>,
        crate::backend::test_support::Log,
    ) {
        let (mut transport, inbound, log) = mock_transport(echo);
        if fail_first_write {
            transport.fail_writes.push_back(true);
        }
        let mut backend = TransactionalBackend::new();
        backend
            .start(
                Box::new(transport),
                Arc::new(RecordingListener(Arc::clone(&log))),
                fast_settings(),
            )
            .await
            .unwrap();
        (backend, inbound, log)
    }

    #[tokio::test]
    async fn send_before_start_is_not_connected() {
        let mut backend = TransactionalBackend::new();
        let err = backend.send("x".into()).await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
    }

    #[tokio::test]
    async fn echoed_request_reports_full_transaction() {
        let (mut backend, _inbound, log) = started(true, false).await;

        backend.send("ping".into()).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Event::Written("ping".into()),
                Event::Send("ping".into()),
                Event::Receive("ping".into()),
                Event::Request("ping".into(), Some("ping".into()), true),
            ]
        );
        backend.close().await;
    }

    #[tokio::test]
    async fn silent_peer_resolves_after_timeout_without_response() {
        let (mut backend, _inbound, log) = started(false, false).await;

        let started_at = std::time::Instant::now();
        backend.send(String::new()).await.unwrap();
        assert!(started_at.elapsed() >= Duration::from_millis(90));

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Event::Written(String::new()),
                Event::Send(String::new()),
                Event::Request(String::new(), None, true),
            ]
        );
        backend.close().await;
    }

    #[tokio::test]
    async fn write_failure_reports_unsuccessful_request() {
        let (mut backend, _inbound, log) = started(true, true).await;

        backend.send("doomed".into()).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Event::Send("doomed".into()),
                Event::Request("doomed".into(), None, false),
            ]
        );
        backend.close().await;
    }

    #[tokio::test]
    async fn late_response_is_delivered_as_plain_receive() {
        let (mut backend, inbound, log) = started(false, false).await;

        backend.send("slow".into()).await.unwrap();
        inbound.send(Some(Ok("late".into()))).unwrap();
        wait_for(&log, |events| events.contains(&Event::Receive("late".into()))).await;

        let events = log.lock().unwrap().clone();
        assert_eq!(events.last(), Some(&Event::Receive("late".into())));
        assert!(events.contains(&Event::Request("slow".into(), None, true)));
        backend.close().await;
    }

    #[tokio::test]
    async fn multi_frame_response_is_delivered_in_arrival_order() {
        let (mut transport, inbound, log) = mock_transport(false);
        transport
            .replies
            .push_back(vec!["A".to_string(), "B".to_string()]);
        let mut backend = TransactionalBackend::new();
        backend
            .start(
                Box::new(transport),
                Arc::new(RecordingListener(Arc::clone(&log))),
                fast_settings(),
            )
            .await
            .unwrap();

        backend.send("ping".into()).await.unwrap();
        wait_for(&log, |events| events.contains(&Event::Receive("B".into()))).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Event::Written("ping".into()),
                Event::Send("ping".into()),
                Event::Receive("A".into()),
                Event::Request("ping".into(), Some("A".into()), true),
                Event::Receive("B".into()),
            ]
        );

        // Once resolved, frames flow straight to the listener again.
        inbound.send(Some(Ok("C".into()))).unwrap();
        wait_for(&log, |events| events.last() == Some(&Event::Receive("C".into()))).await;
        backend.close().await;
    }

    #[tokio::test]
    async fn frames_after_failed_write_follow_the_report() {
        let (mut transport, inbound, log) = mock_transport(false);
        transport.fail_writes.push_back(true);
        let mut backend = TransactionalBackend::new();
        backend
            .start(
                Box::new(transport),
                Arc::new(RecordingListener(Arc::clone(&log))),
                fast_settings(),
            )
            .await
            .unwrap();

        backend.send("doomed".into()).await.unwrap();
        inbound.send(Some(Ok("after".into()))).unwrap();
        wait_for(&log, |events| events.contains(&Event::Receive("after".into()))).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Event::Send("doomed".into()),
                Event::Request("doomed".into(), None, false),
                Event::Receive("after".into()),
            ]
        );
        backend.close().await;
    }

    #[tokio::test]
    async fn held_frames_survive_peer_close_mid_transaction() {
        let (mut transport, _inbound, log) = mock_transport(false);
        transport
            .replies
            .push_back(vec!["first".to_string(), "second".to_string()]);
        transport.hang_up = true;
        let mut backend = TransactionalBackend::new();
        backend
            .start(
                Box::new(transport),
                Arc::new(RecordingListener(Arc::clone(&log))),
                fast_settings(),
            )
            .await
            .unwrap();

        backend.send("ping".into()).await.unwrap();
        wait_for(&log, |events| events.contains(&Event::Receive("second".into()))).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Event::Written("ping".into()),
                Event::Send("ping".into()),
                Event::Receive("first".into()),
                Event::Request("ping".into(), Some("first".into()), true),
                Event::Receive("second".into()),
            ]
        );

        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while backend.is_running() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let err = backend.send("x".into()).await.unwrap_err();
        assert!(matches!(err, ClientError::TransportClosed));
        backend.close().await;
    }

    #[tokio::test]
    async fn unsolicited_frame_reaches_listener() {
        let (mut backend, inbound, log) = started(false, false).await;

        inbound.send(Some(Ok("hello".into()))).unwrap();
        wait_for(&log, |events| events == [Event::Receive("hello".into())]).await;
        backend.close().await;
    }

    #[tokio::test]
    async fn peer_close_before_send_yields_transport_closed() {
        let (mut backend, inbound, _log) = started(false, false).await;

        inbound.send(None).unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while backend.is_running() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let err = backend.send("x".into()).await.unwrap_err();
        assert!(matches!(err, ClientError::TransportClosed));
        backend.close().await;
    }

    #[tokio::test]
    async fn close_closes_transport_once() {
        let (mut backend, _inbound, log) = started(false, false).await;
        backend.close().await;
        backend.close().await;
        assert_eq!(*log.lock().unwrap(), vec![Event::Closed]);
        assert!(!backend.is_running());
    }
}
