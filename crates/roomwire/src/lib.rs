//! # Roomwire
//!
//! Client networking core for multiplayer game rooms.
//!
//! A [`Client`] talks to the lobby to create, join, watch or search rooms.
//! A successful join yields a [`Room`](roomwire_room::Room) that keeps a
//! reliable, ordered session with the room server: messages are signed and
//! sequenced, resent after a reconnect, and server events reach the
//! application only when it drains them with `process_callbacks`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roomwire::prelude::*;
//!
//! struct Game;
//!
//! impl EventReceiver for Game {
//!     fn on_other_player_joined(&mut self, _room: &Room, player: &Player) {
//!         println!("{} joined", player.id());
//!     }
//! }
//!
//! # struct Http;
//! # impl LobbyTransport for Http {
//! #     async fn post(&self, _: LobbyRequest) -> Result<LobbyReply, LobbyError> {
//! #         Err(LobbyError::Request("offline".into()))
//! #     }
//! # }
//! # async fn run() -> Result<(), roomwire::Error> {
//! let config = ClientConfig::new("my-app", "alice", "app-key", "https://lobby.example.com");
//! let client = Client::new(config, Http);
//! let mut room = client.create(RoomOption::new().max_players(4), Dict::new()).await?;
//! room.process_callbacks(&mut Game);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! - `roomwire-codec`: the binary value codec
//! - `roomwire-protocol`: messages, events, auth, lobby types and queries
//! - `roomwire-transport`: the dialer abstraction and WebSocket dialer
//! - `roomwire-session`: one reliable room connection
//! - `roomwire-room`: room state, callbacks and RPC

mod client;
mod error;
mod lobby;

pub use client::{Client, ClientConfig};
pub use error::Error;
pub use lobby::{LobbyError, LobbyReply, LobbyRequest, LobbyTransport};

pub use roomwire_codec as codec;
pub use roomwire_protocol as protocol;
pub use roomwire_room as room;
pub use roomwire_session as session;
pub use roomwire_transport as transport;

/// The types most applications need.
pub mod prelude {
    pub use roomwire_codec::{Dict, Registry, Value};
    pub use roomwire_protocol::{
        ClientInfo, Op, PropQuery, Query, RoomInfo, RoomOption, SearchByIdsReq,
        SearchByNumbersReq, SearchReq,
    };
    pub use roomwire_room::{
        EventReceiver, Player, RequestError, Room, RoomPropDiff, RoomState, RpcCall, RpcHandle,
    };
    pub use roomwire_session::{CloseReason, SessionConfig, SessionError};

    pub use crate::{
        Client, ClientConfig, Error, LobbyError, LobbyReply, LobbyRequest, LobbyTransport,
    };
}
