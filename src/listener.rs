//! Callback contract for observing a client.
//!
//! A [`Listener`] receives lifecycle events (`on_start`, `on_stop`) and
//! transaction events (`on_send`, `on_receive`). Backends that correlate a
//! request with its response additionally report the whole exchange through
//! [`on_request`](Listener::on_request).
//!
//! Every method has an empty default, so implementors only override what they
//! care about:
//!
//! ```
//! use tcp_client::Listener;
//!
//! struct PrintReceived;
//!
//! impl Listener for PrintReceived {
//!     fn on_receive(&self, payload: &str) {
//!         println!("received: {payload}");
//!     }
//! }
//! ```
//!
//! # Threading
//!
//! Callbacks may run on the caller's task or on the client's background I/O
//! task, so implementations must be `Send + Sync` and should return quickly.

use std::sync::Arc;

/// Observer of client lifecycle and transaction events.
pub trait Listener: Send + Sync + 'static {
    /// Called once by `connect`, before the socket attempt.
    fn on_start(&self) {}

    /// Called once by `close`, before the socket is torn down.
    fn on_stop(&self) {}

    /// Called once per outbound payload, including empty payloads.
    fn on_send(&self, _payload: &str) {}

    /// Called once per inbound frame.
    fn on_receive(&self, _payload: &str) {}

    /// Consolidated outcome of one request/response exchange.
    ///
    /// Only the transactional backend reports this; it fires after the
    /// corresponding `on_send`/`on_receive` calls.
    fn on_request(&self, _request: &str, _response: Option<&str>, _success: bool) {}
}

impl<L: Listener + ?Sized> Listener for Arc<L> {
    fn on_start(&self) {
        (**self).on_start();
    }

    fn on_stop(&self) {
        (**self).on_stop();
    }

    fn on_send(&self, payload: &str) {
        (**self).on_send(payload);
    }

    fn on_receive(&self, payload: &str) {
        (**self).on_receive(payload);
    }

    fn on_request(&self, request: &str, response: Option<&str>, success: bool) {
        (**self).on_request(request, response, success);
    }
}

/// Shared handle to a listener, as held by the client and its backend.
pub type SharedListener = Arc<dyn Listener>;

/// A listener that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl Listener for NoopListener {}

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
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counting {
        sends: Mutex<Vec<String>>,
    }

    impl Listener for Counting {
        fn on_send(&self, payload: &str) {
            self.sends.lock().unwrap().push(payload.to_string());
        }
    }

    #[test]
    fn arc_forwards_to_inner_listener() {
        let inner = Arc::new(Counting::default());
        let wrapped: Arc<Arc<Counting>> = Arc::new(Arc::clone(&inner));
        wrapped.on_send("a");
        wrapped.on_send("");
        assert_eq!(*inner.sends.lock().unwrap(), vec!["a".to_string(), String::new()]);
    }

    #[test]
    fn defaults_are_no_ops() {
        let listener: SharedListener = Arc::new(NoopListener);
        listener.on_start();
        listener.on_send("x");
        listener.on_receive("y");
        listener.on_request("x", Some("y"), true);
        listener.on_stop();
    }

    #[test]
    fn listener_is_object_safe() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn Listener>();
    }
}
