//! Error types for the room layer.

use roomwire_codec::CodecError;
use roomwire_protocol::ProtocolError;

/// Errors returned by room operations.
///
/// These are local refusals: nothing was sent. Failures reported by the
/// server arrive later through error-response handlers.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room has closed; no more messages can be sent.
    #[error("room {0} is closed")]
    Closed(String),

    /// A master-only operation was attempted by another player.
    #[error("{me} is not the master of room {room_id}")]
    NotMaster { room_id: String, me: String },

    /// The operation needs a player, but this client is only watching.
    #[error("{0} is not a player in this room")]
    NotPlayer(String),

    /// The target player is not in the roster.
    #[error("player {0} not found")]
    PlayerNotFound(String),

    /// An RPC with this name is already registered.
    #[error("rpc {0:?} is already registered")]
    RpcAlreadyRegistered(String),

    /// All 256 RPC ids are taken.
    #[error("rpc registry is full")]
    RpcRegistryFull,

    /// Encoding RPC arguments failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Posting the message failed (pool full, sequence overflow).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
