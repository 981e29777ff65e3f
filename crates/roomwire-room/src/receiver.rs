//! The `EventReceiver` trait: how the application hears about room changes.
//!
//! `Room::process_callbacks` calls these methods in the order the server's
//! events arrived, on the caller's thread. Every method defaults to a no-op,
//! so an application implements only what it cares about.

use roomwire_codec::Dict;
use roomwire_session::{CloseReason, SessionError};

use crate::{Player, Room, RoomPropDiff};

/// Room callbacks. `room` reflects the state after the change.
#[allow(unused_variables)]
pub trait EventReceiver {
    /// This client joined as a player.
    fn on_joined(&mut self, room: &Room, me: &Player) {}

    /// This client came back after a reconnect the server noticed.
    fn on_rejoined(&mut self, room: &Room, me: &Player) {}

    fn on_other_player_joined(&mut self, room: &Room, player: &Player) {}

    fn on_other_player_rejoined(&mut self, room: &Room, player: &Player) {}

    /// A player left. `player` is no longer in `room.players()`.
    ///
    /// When the leaving player was master, [`on_master_switched`] fires
    /// first.
    ///
    /// [`on_master_switched`]: EventReceiver::on_master_switched
    fn on_player_left(&mut self, room: &Room, player: &Player) {}

    /// The master changed. Only fires when it actually differs.
    fn on_master_switched(&mut self, room: &Room, previous: &str, master: &Player) {}

    /// Room properties changed. `changes` holds only what differs.
    fn on_room_property_changed(&mut self, room: &Room, changes: &RoomPropDiff) {}

    /// A player's properties changed. `changed` holds only what differs.
    fn on_player_property_changed(&mut self, room: &Room, player: &Player, changed: &Dict) {}

    /// Final notification for a clean end (leave, server close, forced
    /// disconnect).
    fn on_closed(&mut self, room: &Room, reason: &CloseReason) {}

    /// Final notification for a failed session.
    fn on_error_closed(&mut self, room: &Room, error: &SessionError) {}
}

/// Ignores everything. Useful for draining a room nobody watches.
impl EventReceiver for () {}
