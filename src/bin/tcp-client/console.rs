//! Listener that narrates client events on the console.

use std::io::{self, Write};
use std::sync::Mutex;

use tcp_client::{Endpoint, Listener};

/// Prints every client event as one line.
///
/// Write errors are ignored; the console is best effort.
pub struct ConsoleListener {
    endpoint: Endpoint,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleListener {
    pub fn new(endpoint: Endpoint, out: Box<dyn Write + Send>) -> Self {
        Self {
            endpoint,
            out: Mutex::new(out),
        }
    }

    /// Writes to stdout when `verbose`, discards everything otherwise.
    pub fn for_console(endpoint: Endpoint, verbose: bool) -> Self {
        let out: Box<dyn Write + Send> = if verbose {
            Box::new(io::stdout())
        } else {
            Box::new(io::sink())
        };
        Self::new(endpoint, out)
    }

    pub fn line(&self, text: &str) {
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{text}");
            let _ = out.flush();
        }
    }
}

impl Listener for ConsoleListener {
    fn on_start(&self) {
        self.line(&format!("Connecting to {}", self.endpoint));
    }

    fn on_stop(&self) {
        self.line("Stopping connection");
    }

    fn on_send(&self, payload: &str) {
        if payload.is_empty() {
            self.line("Sent no message");
        } else {
            self.line(&format!("Sent message: {payload}"));
        }
    }

    fn on_receive(&self, payload: &str) {
        if payload.is_empty() {
            self.line("Received no message");
        } else {
            self.line(&format!("Received message: {payload}"));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Writer that appends into a shared buffer.
    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn narrates_a_full_exchange() {
        let buf = Shared::default();
        let listener = ConsoleListener::new(
            Endpoint::new("localhost", 7).unwrap(),
            Box::new(buf.clone()),
        );

        listener.on_start();
        listener.on_send("ping");
        listener.on_receive("pong");
        listener.on_send("");
        listener.on_receive("");
        listener.on_stop();

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            text,
            "Connecting to localhost:7\n\
             Sent message: ping\n\
             Received message: pong\n\
             Sent no message\n\
             Received no message\n\
             Stopping connection\n"
        );
    }
}
