//! The lobby's HTTP surface, as seen by the client.
//!
//! The crate does not ship an HTTP stack. Applications implement
//! [`LobbyTransport`] over whatever client they already use and hand it to
//! [`Client`](crate::Client).

use std::future::Future;

/// A `POST` to the lobby. `body` is codec-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl LobbyRequest {
    /// Returns the first value of header `name` (ASCII case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The lobby's answer. Only status 200 carries a codec-encoded
/// `LobbyResponse`; any other status is reported with its body as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl LobbyReply {
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }
}

/// Sends lobby requests.
pub trait LobbyTransport: Send + Sync {
    fn post(
        &self,
        request: LobbyRequest,
    ) -> impl Future<Output = Result<LobbyReply, LobbyError>> + Send;
}

/// Errors from a lobby call. Nothing is connected when one of these is
/// returned.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// No room matched the id, number or query.
    #[error("no room found: {0}")]
    NoRoomFound(String),

    /// The room has no free player slot.
    #[error("room is full: {0}")]
    RoomFull(String),

    /// The application reached its room quota.
    #[error("room limit reached: {0}")]
    RoomLimit(String),

    /// The lobby answered with a non-200 status.
    #[error("lobby returned {status}: {message}")]
    Http { status: u16, message: String },

    /// The request never got an answer.
    #[error("lobby request failed: {0}")]
    Request(String),

    /// A successful answer lacked what the call needs.
    #[error("invalid lobby response: {0}")]
    InvalidResponse(&'static str),
}
