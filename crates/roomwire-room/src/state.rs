//! Room state machine and roster types.

use roomwire_codec::{Dict, Value};
use roomwire_protocol::{ClientInfo, RoomInfo, RoomPropPayload};

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// Whether the room is delivering callbacks.
///
/// ```text
/// Running ⇄ Paused
///    ↓        ↓
///      Closed
/// ```
///
/// - **Running**: `process_callbacks` drains the event queue.
/// - **Paused**: events keep arriving and queueing but nothing is drained.
/// - **Closed**: the final notification has been delivered. Nothing fires
///   again and no messages can be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Running,
    Paused,
    Closed,
}

impl RoomState {
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// The state after a pause request. Closed stays closed.
    pub fn paused(self) -> Self {
        match self {
            Self::Running | Self::Paused => Self::Paused,
            Self::Closed => Self::Closed,
        }
    }

    /// The state after a restart request. Closed stays closed.
    pub fn restarted(self) -> Self {
        match self {
            Self::Running | Self::Paused => Self::Running,
            Self::Closed => Self::Closed,
        }
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Paused => write!(f, "Paused"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// A player in the roster.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Player {
    id: String,
    props: Dict,
}

impl Player {
    pub fn new(id: impl Into<String>, props: Dict) -> Self {
        Self {
            id: id.into(),
            props,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn props(&self) -> &Dict {
        &self.props
    }

    /// Applies a partial update and returns the entries that actually
    /// changed. Keys absent from `diff` are left alone.
    pub(crate) fn apply_props(&mut self, diff: Dict) -> Dict {
        merge_props(&mut self.props, diff)
    }
}

impl From<ClientInfo> for Player {
    fn from(info: ClientInfo) -> Self {
        Self::new(info.id, info.props)
    }
}

/// Merges `diff` into `target`, last write wins, returning what changed.
fn merge_props(target: &mut Dict, diff: Dict) -> Dict {
    let mut changed = Dict::new();
    for (key, value) in diff {
        if target.get(&key) != Some(&value) {
            target.insert(key.clone(), value.clone());
            changed.insert(key, value);
        }
    }
    changed
}

// ---------------------------------------------------------------------------
// RoomPropDiff
// ---------------------------------------------------------------------------

/// A partial set of room properties.
///
/// Used both to request a change (`Room::change_room_property`) and to
/// report one (`EventReceiver::on_room_property_changed`). `None` and absent
/// dictionary keys mean "unchanged".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoomPropDiff {
    pub visible: Option<bool>,
    pub joinable: Option<bool>,
    pub watchable: Option<bool>,
    pub search_group: Option<u32>,
    pub max_players: Option<u32>,
    pub client_deadline: Option<u32>,
    pub public_props: Dict,
    pub private_props: Dict,
}

impl RoomPropDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(mut self, v: bool) -> Self {
        self.visible = Some(v);
        self
    }

    pub fn joinable(mut self, v: bool) -> Self {
        self.joinable = Some(v);
        self
    }

    pub fn watchable(mut self, v: bool) -> Self {
        self.watchable = Some(v);
        self
    }

    pub fn search_group(mut self, group: u32) -> Self {
        self.search_group = Some(group);
        self
    }

    pub fn max_players(mut self, n: u32) -> Self {
        self.max_players = Some(n);
        self
    }

    pub fn client_deadline(mut self, secs: u32) -> Self {
        self.client_deadline = Some(secs);
        self
    }

    pub fn public_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.public_props.insert(key.into(), value.into());
        self
    }

    pub fn private_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.private_props.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The wire payload for this change: flags not mentioned keep their
    /// current values from `info`.
    pub(crate) fn to_payload(&self, info: &RoomInfo) -> RoomPropPayload {
        RoomPropPayload {
            visible: self.visible.unwrap_or(info.visible),
            joinable: self.joinable.unwrap_or(info.joinable),
            watchable: self.watchable.unwrap_or(info.watchable),
            search_group: self.search_group.unwrap_or(info.search_group),
            max_players: self.max_players.unwrap_or(info.max_players),
            client_deadline: self.client_deadline.unwrap_or(info.client_deadline),
            public_props: self.public_props.clone(),
            private_props: self.private_props.clone(),
        }
    }

    /// Applies a server-confirmed change to `info` and returns only the
    /// parts that differ from what was there.
    pub(crate) fn apply(info: &mut RoomInfo, payload: RoomPropPayload) -> Self {
        fn update<T: PartialEq + Copy>(current: &mut T, new: T) -> Option<T> {
            if *current == new {
                None
            } else {
                *current = new;
                Some(new)
            }
        }

        Self {
            visible: update(&mut info.visible, payload.visible),
            joinable: update(&mut info.joinable, payload.joinable),
            watchable: update(&mut info.watchable, payload.watchable),
            search_group: update(&mut info.search_group, payload.search_group),
            max_players: update(&mut info.max_players, payload.max_players),
            client_deadline: update(&mut info.client_deadline, payload.client_deadline),
            public_props: merge_props(&mut info.public_props, payload.public_props),
            private_props: merge_props(&mut info.private_props, payload.private_props),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_is_sticky() {
        assert_eq!(RoomState::Running.paused(), RoomState::Paused);
        assert_eq!(RoomState::Paused.restarted(), RoomState::Running);
        assert_eq!(RoomState::Closed.restarted(), RoomState::Closed);
        assert_eq!(RoomState::Closed.paused(), RoomState::Closed);
        assert!(!RoomState::Paused.is_running());
    }

    #[test]
    fn test_player_props_report_only_changes() {
        let mut player = Player::new(
            "p1",
            Dict::from([("hp".into(), Value::Int(10)), ("team".into(), Value::from("red"))]),
        );
        let changed = player.apply_props(Dict::from([
            ("hp".into(), Value::Int(10)),
            ("team".into(), Value::from("blue")),
            ("ready".into(), Value::Bool(true)),
        ]));

        assert_eq!(changed.len(), 2);
        assert_eq!(changed.get("team"), Some(&Value::from("blue")));
        assert_eq!(player.props().get("hp"), Some(&Value::Int(10)));
        assert_eq!(player.props().len(), 3);
    }

    #[test]
    fn test_room_prop_apply_keeps_absent_keys() {
        let mut info = RoomInfo {
            id: "r1".into(),
            visible: true,
            joinable: true,
            client_deadline: 30,
            public_props: Dict::from([("map".into(), Value::from("forest"))]),
            ..RoomInfo::default()
        };
        let payload = RoomPropDiff::new()
            .joinable(false)
            .public_prop("mode", "ffa")
            .to_payload(&info);
        let diff = RoomPropDiff::apply(&mut info, payload);

        assert_eq!(diff.joinable, Some(false));
        assert_eq!(diff.visible, None);
        assert_eq!(diff.client_deadline, None);
        assert_eq!(diff.public_props.len(), 1);
        assert_eq!(info.public_props.len(), 2);
        assert!(!info.joinable);
    }

    #[test]
    fn test_empty_diff() {
        assert!(RoomPropDiff::new().is_empty());
        assert!(!RoomPropDiff::new().visible(true).is_empty());
    }
}
