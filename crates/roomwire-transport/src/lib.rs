//! Transport abstraction layer for Roomwire.
//!
//! Provides the [`Dialer`] and [`Connection`] traits that abstract over the
//! message-oriented duplex channel a room session runs on. The session layer
//! only sees whole binary frames; reliability, sequencing and resend live
//! above this crate, so any transport that can carry frames will do.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket dialer via `tokio-tungstenite`
//! - `mock`: in-memory dialer for tests of the layers above

mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::{CLOSE_GOING_AWAY, CLOSE_NO_STATUS, CLOSE_NORMAL, TransportError};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketDialer};

use std::fmt;
use std::future::Future;

/// Opaque identifier for a physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Where to connect and which headers to present.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DialRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl DialRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Adds a header, keeping any earlier value with the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the first value of header `name` (ASCII case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Opens new connections. One dial per physical connection attempt.
pub trait Dialer: Send + Sync + 'static {
    /// The connection type produced by this dialer.
    type Connection: Connection;

    /// Connects to `request.url`, presenting `request.headers`.
    fn dial(
        &self,
        request: &DialRequest,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single connection that can send and receive whole frames.
///
/// `send` and `recv` may be called concurrently from different tasks.
/// Concurrent `send` calls are serialized by the implementation, so only one
/// writer touches the underlying socket at a time.
pub trait Connection: Send + Sync + 'static {
    /// Sends one frame to the remote peer.
    fn send(&self, data: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next frame from the remote peer into `buf`, replacing
    /// its contents. Callers recycle `buf` across calls.
    ///
    /// Returns `Ok(false)` when the stream ends without a close frame. A close
    /// frame surfaces as [`TransportError::ClosedByPeer`].
    fn recv(&self, buf: &mut Vec<u8>) -> impl Future<Output = Result<bool, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
