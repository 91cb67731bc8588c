//! Asynchronous I/O backends.
//!
//! A [`Backend`] owns the connected [`Transport`] once the client hands it
//! over, drives it from a background task, and turns writes and reads into
//! [`Listener`](crate::Listener) callbacks. Two shapes are provided:
//!
//! | Backend                   | `send` returns when…                                  |
//! |---------------------------|-------------------------------------------------------|
//! | [`StreamingBackend`]      | the payload is queued                                 |
//! | [`TransactionalBackend`]  | the write resolved and a response arrived or timed out |
//!
//! Both expose the same contract to [`TcpClient`](crate::TcpClient), which
//! picks one through its type parameter.

mod streaming;
mod transactional;

pub use streaming::StreamingBackend;
pub use transactional::TransactionalBackend;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::listener::SharedListener;
use crate::transport::Transport;

/// Default upper bound on how long a transactional request waits.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default timeout for the graceful shutdown of the I/O task.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Timing knobs passed to [`Backend::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendSettings {
    /// How long a transactional request waits for write confirmation plus
    /// the first response frame.
    pub response_timeout: Duration,
    /// How long `close` waits for the I/O task before aborting it.
    ///
    /// A zero timeout aborts the task immediately.
    pub shutdown_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// The I/O driver underneath the client facade.
///
/// Receiving is not a method: once started, a backend pushes every inbound
/// frame to the listener on its own.
#[async_trait]
pub trait Backend: Send + 'static {
    /// Take ownership of a connected transport and start the I/O task.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AlreadyConnected`](crate::ClientError::AlreadyConnected)
    /// if the backend is already running.
    async fn start(
        &mut self,
        transport: Box<dyn Transport>,
        listener: SharedListener,
        settings: BackendSettings,
    ) -> Result<()>;

    /// Write one payload and report it to the listener.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`](crate::ClientError::NotConnected)
    /// before `start`, and [`ClientError::TransportClosed`](crate::ClientError::TransportClosed)
    /// once the I/O task has ended.
    async fn send(&mut self, payload: String) -> Result<()>;

    /// Stop the I/O task and close the transport. Safe to call repeatedly.
    async fn close(&mut self);

    /// Returns `true` while the I/O task is alive.
    fn is_running(&self) -> bool;
}

/// Handle to a backend's background I/O task.
///
/// Dropping the handle aborts the task.
#[derive(Debug, Default)]
pub(crate) struct IoTask {
    task: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl IoTask {
    /// Spawn the future built by `io_loop`, which receives the shutdown signal.
    pub(crate) fn spawn<F, Fut>(io_loop: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        Self {
            task: Some(tokio::spawn(io_loop(shutdown_rx))),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Signal the loop to shut down and wait for it, aborting after `timeout`.
    pub(crate) async fn shutdown(&mut self, timeout: Duration) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // If the loop doesn't exit in time, abort it so the task cannot
        // detach and hold the socket indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("I/O task terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("I/O task did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("I/O task aborted: {join_err}");
                    }
                }
            }
        }
    }
}

impl Drop for IoTask {
    fn drop(&mut self) {
        // No executor is available here to drive a graceful close.
        if let Some(task) = self.task.take() {
            task.abort();
        }
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
pub(crate) mod test_support {
    //! Scripted transport shared by the backend unit tests.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::error::ClientError;
    use crate::listener::Listener;
    use crate::transport::Transport;

    /// One observable event, from either the listener or the transport.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Event {
        Send(String),
        Receive(String),
        Request(String, Option<String>, bool),
        Written(String),
        Closed,
    }

    pub(crate) type Log = Arc<Mutex<Vec<Event>>>;

    pub(crate) struct RecordingListener(pub Log);

    impl Listener for RecordingListener {
        fn on_send(&self, payload: &str) {
            self.0.lock().unwrap().push(Event::Send(payload.into()));
        }

        fn on_receive(&self, payload: &str) {
            self.0.lock().unwrap().push(Event::Receive(payload.into()));
        }

        fn on_request(&self, request: &str, response: Option<&str>, success: bool) {
            self.0.lock().unwrap().push(Event::Request(
                request.into(),
                response.map(Into::into),
                success,
            ));
        }
    }

    pub(crate) type Inbound = Option<Result<String, ClientError>>;

    /// Transport whose inbound side is fed by the test through a channel.
    ///
    /// On each successful write the next entry of `replies`, if any, is fed
    /// back as that many frames, followed by a peer close when `hang_up` is
    /// set; otherwise `echo` returns non-empty payloads.
    pub(crate) struct MockTransport {
        pub log: Log,
        pub inbound: mpsc::UnboundedReceiver<Inbound>,
        pub fail_writes: VecDeque<bool>,
        pub replies: VecDeque<Vec<String>>,
        pub echo: bool,
        pub hang_up: bool,
        feed: mpsc::UnboundedSender<Inbound>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, payload: String) -> Result<(), ClientError> {
            if self.fail_writes.pop_front().unwrap_or(false) {
                return Err(ClientError::TransportSend("broken pipe".into()));
            }
            self.log.lock().unwrap().push(Event::Written(payload.clone()));
            if let Some(frames) = self.replies.pop_front() {
                for frame in frames {
                    let _ = self.feed.send(Some(Ok(frame)));
                }
                if self.hang_up {
                    let _ = self.feed.send(None);
                }
            } else if self.echo && !payload.is_empty() {
                let _ = self.feed.send(Some(Ok(payload)));
            }
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String, ClientError>> {
            match self.inbound.recv().await {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<(), ClientError> {
            self.log.lock().unwrap().push(Event::Closed);
            Ok(())
        }
    }

    /// Build a transport plus the handle used to push inbound frames.
    pub(crate) fn mock_transport(
        echo: bool,
    ) -> (MockTransport, mpsc::UnboundedSender<Inbound>, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = MockTransport {
            log: Arc::clone(&log),
            inbound: rx,
            fail_writes: VecDeque::new(),
            replies: VecDeque::new(),
            echo,
            hang_up: false,
            feed: tx.clone(),
        };
        (transport, tx, log)
    }

    /// Wait until `pred` holds for the log, or panic after one second.
    pub(crate) async fn wait_for(log: &Log, pred: impl Fn(&[Event]) -> bool) {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
        loop {
            if pred(&log.lock().unwrap()) {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("condition not reached; log = {:?}", log.lock().unwrap());
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}
