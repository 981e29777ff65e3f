//! Wire protocol for Roomwire.
//!
//! This crate defines what travels between a client and the room service,
//! on top of the binary codec in `roomwire-codec`:
//!
//! - **Messages** ([`MsgType`], [`MsgPayload`]): signed, sequenced frames
//!   the client sends to the room server.
//! - **Events** ([`Event`], [`decode_event`]): frames the room server
//!   pushes to the client.
//! - **Message pool** ([`MsgPool`]): the ring buffer that keeps sent
//!   messages around for resending after a reconnect.
//! - **Auth** ([`generate_auth_data`]): bearer tokens for lobby calls and
//!   room-socket connects.
//! - **Lobby types** ([`RoomInfo`], [`JoinedRoom`], [`LobbyResponse`], ...)
//!   and the search [`Query`] builder.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about sockets or tasks. It turns typed
//! requests into bytes and bytes into typed events.
//!
//! ```text
//! Room (state) → Protocol (Msg / Event) → Session (sequencing, resend) → Transport
//! ```

mod auth;
mod error;
mod event;
mod msg;
mod pool;
mod query;
mod types;

pub use auth::{bearer, generate_auth_data, generate_auth_data_at, validate_auth_data};
pub use error::ProtocolError;
pub use event::{Event, EventFrame, EventType, Pong, decode_event, encode_event};
pub use msg::{
    MAX_MSG_SEQ, MsgPayload, MsgSigner, MsgType, REGULAR_TYPE_START, RoomPropPayload,
    SIGNATURE_LEN, parse_msg_frame, parse_ping,
};
pub use pool::MsgPool;
pub use query::{Op, PropQuery, Query};
pub use types::{
    ClientInfo, CreateRoomReq, JoinRoomReq, JoinedRoom, LobbyResponse, LobbyResponseType,
    RoomInfo, RoomOption, SearchByIdsReq, SearchByNumbersReq, SearchReq,
};
