//! Client-side room for Roomwire.
//!
//! A [`Room`] mirrors the server's room state (info, roster, master) and
//! applies server events only when the application drains them with
//! [`Room::process_callbacks`]. Callbacks therefore fire in delivery order on
//! the application's own thread.
//!
//! # Key types
//!
//! - [`Room`]: room state, operations and the callback queue
//! - [`EventReceiver`]: the trait applications implement to hear about changes
//! - [`RpcHandle`] / [`RpcCall`]: registered remote procedure calls
//! - [`RoomState`]: running / paused / closed
//! - [`RoomPropDiff`]: partial room property changes, both ways

mod error;
mod receiver;
mod room;
mod rpc;
mod state;

pub use error::RoomError;
pub use receiver::EventReceiver;
pub use room::{RequestError, RequestFailure, Room, RoomUser};
pub use rpc::{MAX_RPCS, RpcCall, RpcHandle};
pub use state::{Player, RoomPropDiff, RoomState};
