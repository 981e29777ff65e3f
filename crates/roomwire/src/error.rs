//! Unified error type for the Roomwire client.

use roomwire_codec::CodecError;
use roomwire_protocol::ProtocolError;
use roomwire_room::RoomError;
use roomwire_session::SessionError;
use roomwire_transport::TransportError;

use crate::LobbyError;

/// Top-level error that wraps every crate-specific error.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors, so code
/// using the `roomwire` crate handles a single type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Room(#[from] RoomError),

    /// A lobby call failed before any room was created.
    #[error(transparent)]
    Lobby(#[from] LobbyError),
}

impl Error {
    /// The lobby error, if this is one.
    pub fn as_lobby(&self) -> Option<&LobbyError> {
        match self {
            Self::Lobby(e) => Some(e),
            _ => None,
        }
    }
}
