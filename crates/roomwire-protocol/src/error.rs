//! Error types for the protocol layer.
//!
//! Everything here except the lobby field errors is a protocol violation:
//! the session layer treats it as fatal and closes the room.

use roomwire_codec::CodecError;

/// Errors that can occur while framing, signing or parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The body of a frame failed to encode or decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The first byte of an outgoing frame is not a known message type.
    #[error("unknown message type {0}")]
    UnknownMsgType(u8),

    /// The first byte of an incoming frame is not a known event type.
    #[error("unknown event type {0}")]
    UnknownEventType(u8),

    /// A frame is too short to hold its header.
    #[error("frame too short: {len} bytes")]
    FrameTooShort { len: usize },

    /// A signed frame failed HMAC verification.
    #[error("invalid frame signature")]
    InvalidSignature,

    /// Producing another message would overwrite one that was never sent.
    #[error("message pool full: seq {seq} would evict an unsent message (capacity {capacity})")]
    PoolFull { seq: u32, capacity: usize },

    /// A resend asked for a message that has already been evicted.
    #[error("message seq {seq} is too old: latest {latest}, capacity {capacity}")]
    SeqTooOld {
        seq: u32,
        latest: u32,
        capacity: usize,
    },

    /// The 24-bit message sequence space is exhausted.
    #[error("message sequence number overflow")]
    SeqOverflow,

    /// A lobby document lacks a required field.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A lobby document field has the wrong type or range.
    #[error("invalid field `{0}`")]
    InvalidField(&'static str),

    /// Bearer auth data could not be generated or did not validate.
    #[error("invalid auth data: {0}")]
    InvalidAuthData(String),

    /// The message is invalid at the protocol level.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
