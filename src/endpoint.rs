//! Remote peer address.

use std::fmt;

use crate::error::{ClientError, Result};

/// Immutable `host:port` pair identifying the remote peer.
///
/// The host is kept as given (name or literal address); resolution happens
/// when the connection is opened.
///
/// ```
/// use tcp_client::Endpoint;
///
/// let endpoint = Endpoint::new("127.0.0.1", 9000).unwrap();
/// assert_eq!(endpoint.to_string(), "127.0.0.1:9000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint, rejecting an empty host or port `0`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] when either field is unusable.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(ClientError::InvalidEndpoint("host must not be empty".into()));
        }
        if port == 0 {
            return Err(ClientError::InvalidEndpoint(format!(
                "port must be positive (host {host})"
            )));
        }
        Ok(Self { host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
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

    #[test]
    fn valid_endpoint_keeps_fields() {
        let endpoint = Endpoint::new("localhost", 8080).unwrap();
        assert_eq!(endpoint.host(), "localhost");
        assert_eq!(endpoint.port(), 8080);
    }

    #[test]
    fn empty_host_is_rejected() {
        let err = Endpoint::new("  ", 8080).unwrap_err();
        assert!(matches!(err, ClientError::InvalidEndpoint(_)));
    }

    #[test]
    fn zero_port_is_rejected() {
        let err = Endpoint::new("localhost", 0).unwrap_err();
        assert!(matches!(err, ClientError::InvalidEndpoint(_)));
    }

    #[test]
    fn display_is_host_colon_port() {
        let endpoint = Endpoint::new("example.org", 7).unwrap();
        assert_eq!(format!("{endpoint}"), "example.org:7");
    }
}
