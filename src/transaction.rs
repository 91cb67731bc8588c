//! State of one request/response exchange.

use std::fmt;

/// Where an in-flight transaction currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    /// The payload is queued or being written.
    Sending,
    /// The write completed; waiting for the first response frame.
    AwaitingResponse,
    /// A response arrived, the wait ended without one, or the write failed.
    Done,
}

impl fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sending => write!(f, "Sending"),
            Self::AwaitingResponse => write!(f, "AwaitingResponse"),
            Self::Done => write!(f, "Done"),
        }
    }
}

/// Mutable record of the single in-flight exchange.
///
/// Once `failed` is set it stays set; there is deliberately no way to clear it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    payload: String,
    response: Option<String>,
    sent: bool,
    received: bool,
    failed: bool,
}

impl PendingTransaction {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            response: None,
            sent: false,
            received: false,
            failed: false,
        }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    pub fn is_received(&self) -> bool {
        self.received
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// The write was confirmed.
    pub fn mark_sent(&mut self) {
        self.sent = true;
    }

    /// The write failed or could not be confirmed.
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    /// The first response frame arrived.
    pub fn record_response(&mut self, response: String) {
        self.response = Some(response);
        self.received = true;
    }

    pub fn phase(&self) -> TransactionPhase {
        if self.failed || self.received {
            TransactionPhase::Done
        } else if self.sent {
            TransactionPhase::AwaitingResponse
        } else {
            TransactionPhase::Sending
        }
    }

    /// Freeze the record into its final outcome.
    pub fn finish(self) -> Transaction {
        Transaction {
            success: !self.failed,
            request: self.payload,
            response: self.response,
        }
    }
}

/// Final outcome of one exchange, as reported through
/// [`Listener::on_request`](crate::Listener::on_request).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// The payload that was written.
    pub request: String,
    /// The first response frame, if one arrived in time.
    pub response: Option<String>,
    /// `false` if the write failed or was never confirmed.
    pub success: bool,
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

    #[test]
    fn new_transaction_is_sending() {
        let tx = PendingTransaction::new("ping");
        assert_eq!(tx.payload(), "ping");
        assert_eq!(tx.phase(), TransactionPhase::Sending);
        assert!(!tx.is_sent() && !tx.is_received() && !tx.is_failed());
    }

    #[test]
    fn phases_follow_sent_then_received() {
        let mut tx = PendingTransaction::new("ping");
        tx.mark_sent();
        assert_eq!(tx.phase(), TransactionPhase::AwaitingResponse);
        tx.record_response("pong".into());
        assert_eq!(tx.phase(), TransactionPhase::Done);
        assert_eq!(tx.response(), Some("pong"));
    }

    #[test]
    fn failed_is_monotonic() {
        let mut tx = PendingTransaction::new("ping");
        tx.mark_failed();
        tx.mark_sent();
        tx.record_response("late".into());
        assert!(tx.is_failed());
        assert!(!tx.finish().success);
    }

    #[test]
    fn finish_without_response_is_still_successful() {
        let mut tx = PendingTransaction::new("");
        tx.mark_sent();
        let outcome = tx.finish();
        assert_eq!(
            outcome,
            Transaction {
                request: String::new(),
                response: None,
                success: true,
            }
        );
    }
}
