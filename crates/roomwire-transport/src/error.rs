/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connecting to the remote endpoint failed.
    #[error("dial failed: {0}")]
    DialFailed(#[source] std::io::Error),

    /// The dial request could not be turned into a valid handshake.
    #[error("invalid dial request: {0}")]
    InvalidRequest(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The peer sent a frame the room protocol never uses.
    #[error("unexpected {0} frame")]
    InvalidFrame(&'static str),

    /// The remote peer sent a close frame.
    #[error("closed by peer: {code} {reason}")]
    ClosedByPeer { code: u16, reason: String },

    /// The connection was already closed locally.
    #[error("connection closed")]
    Closed,
}

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// The endpoint is going away (server shutdown, room ended).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// No close code was present in the close frame.
pub const CLOSE_NO_STATUS: u16 = 1005;

impl TransportError {
    /// Whether the peer closed the connection for good. Terminal closes are
    /// reported as a clean end of the session and never retried.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ClosedByPeer {
                code: CLOSE_NORMAL | CLOSE_GOING_AWAY,
                ..
            }
        )
    }
}
