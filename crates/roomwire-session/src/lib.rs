//! Reliable room connection for Roomwire.
//!
//! A room session survives socket drops. This crate owns everything between
//! the raw transport and the room's application logic:
//!
//! 1. **Handshake**: dial with signed auth headers, wait for the server's
//!    ready event before sending anything
//! 2. **Ordering**: regular events must arrive with consecutive sequence
//!    numbers; a gap ends the session
//! 3. **Resend**: outgoing messages sit in an [`Outbox`] and are replayed
//!    from the server's last received seq after each reconnect
//! 4. **Heartbeat**: signed pings every third of the client deadline
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← consumes Deliveries, posts to the Outbox
//!     ↕
//! Session Layer (this crate)  ← handshake, ordering, resend, heartbeat
//!     ↕
//! Transport Layer (below)  ← Dialer / Connection traits
//! ```

mod buffer;
mod config;
mod connection;
mod error;
mod outbox;

pub use buffer::{BufferLease, BufferPool};
pub use config::SessionConfig;
pub use connection::{
    CloseReason, ConnectRequest, Connection, ConnectionHandle, Delivery, HEADER_APP_ID,
    HEADER_AUTHORIZATION, HEADER_LAST_EVENT_SEQ, HEADER_USER_ID, SessionEvent,
};
pub use error::SessionError;
pub use outbox::Outbox;
