//! Error taxonomy for tunnel setup and forwarding.
//!
//! Connection establishment distinguishes three failure classes:
//!
//! 1. **Authentication** — credential or permission problems. These will not
//!    resolve by retrying and are never retried, to avoid account lockouts.
//! 2. **Network** — transient transport problems (refused, reset, timed out,
//!    unreachable). Connection establishment may retry these with backoff.
//! 3. **Ssh** — protocol-level failures that are neither of the above.
//!
//! Errors coming out of `russh` are classified by message because the library
//! folds many conditions into a single error type; authentication patterns are
//! checked first so an error mentioning both wins the non-retryable class.

use thiserror::Error;

/// Errors raised while opening, running or probing a tunnel.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// Bad or rejected credentials. Fatal, never retried.
    #[error("ssh authentication failed: {0}")]
    Authentication(String),

    /// The tunnel endpoint is unreachable: connection refused, reset or
    /// timed out. Fatal to the current operation.
    #[error("network error: {0}")]
    Network(String),

    /// The local forwarding port could not be bound.
    #[error("failed to bind 127.0.0.1:{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// SSH protocol failure that is neither an authentication nor a
    /// network problem.
    #[error("ssh error: {0}")]
    Ssh(String),
}

impl TunnelError {
    /// Whether connection establishment may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TunnelError::Network(_))
    }
}

/// Authentication failure patterns. Checked before the network patterns so
/// that mixed messages classify as non-retryable.
const AUTH_ERRORS: &[&str] = &[
    "authentication failed",
    "password authentication failed",
    "key authentication failed",
    "agent authentication failed",
    "permission denied",
    "publickey",
    "auth fail",
    "no authentication",
    "all authentication methods failed",
];

/// Transient transport failure patterns.
const NETWORK_ERRORS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "timeout",
    "timed out",
    "network is unreachable",
    "no route to host",
    "host is down",
    "temporary failure",
    "resource temporarily unavailable",
    "handshake failed",
    "failed to connect",
    "broken pipe",
];

/// Classify a connection-time error message into a [`TunnelError`].
pub(crate) fn classify_connect_error(message: String) -> TunnelError {
    let lowered = message.to_lowercase();

    for pattern in AUTH_ERRORS {
        if lowered.contains(pattern) {
            return TunnelError::Authentication(message);
        }
    }

    for pattern in NETWORK_ERRORS {
        if lowered.contains(pattern) {
            return TunnelError::Network(message);
        }
    }

    TunnelError::Ssh(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_are_not_retryable() {
        for message in [
            "Authentication failed",
            "password authentication failed: wrong password",
            "Permission denied (publickey)",
            "all authentication methods failed",
        ] {
            let err = classify_connect_error(message.to_string());
            assert!(matches!(err, TunnelError::Authentication(_)), "{message}");
            assert!(!err.is_retryable(), "{message}");
        }
    }

    #[test]
    fn transport_failures_are_retryable() {
        for message in [
            "Connection refused",
            "connection reset by peer",
            "Connection timed out after 30s",
            "Network is unreachable",
            "handshake failed",
        ] {
            let err = classify_connect_error(message.to_string());
            assert!(matches!(err, TunnelError::Network(_)), "{message}");
            assert!(err.is_retryable(), "{message}");
        }
    }

    #[test]
    fn auth_takes_precedence_over_network() {
        let err = classify_connect_error("connection timed out during authentication failed".into());
        assert!(matches!(err, TunnelError::Authentication(_)));
    }

    #[test]
    fn unknown_errors_are_protocol_errors() {
        let err = classify_connect_error("key exchange produced garbage".into());
        assert!(matches!(err, TunnelError::Ssh(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn bind_errors_are_not_retryable() {
        let err = TunnelError::Bind {
            port: 9201,
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("9201"));
    }
}
