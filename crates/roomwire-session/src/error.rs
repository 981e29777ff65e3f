//! Error types for the session layer.

use roomwire_protocol::ProtocolError;
use roomwire_transport::TransportError;

/// Errors that end a physical connection, and possibly the session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The socket failed. Retried.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server sent something we cannot accept, or our own message
    /// stream is broken. Fatal.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A regular event skipped or repeated a sequence number. Fatal.
    #[error("event sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u32, got: u32 },

    /// Dialing or the ready handshake took too long. Retried.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// The stream ended without a close frame. Retried.
    #[error("connection lost")]
    Disconnected,

    /// Too many consecutive failed attempts.
    #[error("gave up after {attempts} attempts: {last}")]
    ReconnectLimit {
        attempts: u32,
        #[source]
        last: Box<SessionError>,
    },

    /// A connection duty panicked.
    #[error("connection task failed: {0}")]
    Internal(String),
}

impl SessionError {
    /// Whether a fresh connection attempt may recover from this error.
    ///
    /// Transport failures, timeouts and dropped streams retry. Protocol
    /// violations and terminal closes never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => !e.is_terminal(),
            Self::HandshakeTimeout | Self::Disconnected => true,
            Self::Protocol(_)
            | Self::SequenceGap { .. }
            | Self::ReconnectLimit { .. }
            | Self::Internal(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failures_retry() {
        let e = SessionError::from(TransportError::ReceiveFailed(std::io::Error::from(
            std::io::ErrorKind::ConnectionReset,
        )));
        assert!(e.is_retryable());
        assert!(SessionError::HandshakeTimeout.is_retryable());
        assert!(SessionError::Disconnected.is_retryable());
    }

    #[test]
    fn test_terminal_close_does_not_retry() {
        let e = SessionError::from(TransportError::ClosedByPeer {
            code: 1000,
            reason: String::new(),
        });
        assert!(!e.is_retryable());
    }

    #[test]
    fn test_protocol_violations_are_fatal() {
        assert!(!SessionError::SequenceGap { expected: 2, got: 4 }.is_retryable());
        assert!(!SessionError::from(ProtocolError::SeqOverflow).is_retryable());
    }
}
