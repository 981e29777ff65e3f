//! Lobby request and response types.
//!
//! Lobby bodies are codec-encoded dictionaries. Each type converts to and
//! from a [`Value::Dict`] with fixed field names; the HTTP layer only sees
//! the encoded bytes.

use roomwire_codec::{Dict, Registry, Value};

use crate::query::Query;
use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn as_dict<'a>(v: &'a Value, what: &'static str) -> Result<&'a Dict, ProtocolError> {
    v.as_dict().ok_or(ProtocolError::InvalidField(what))
}

fn field<'a>(d: &'a Dict, key: &'static str) -> Result<&'a Value, ProtocolError> {
    d.get(key).ok_or(ProtocolError::MissingField(key))
}

fn str_field(d: &Dict, key: &'static str) -> Result<String, ProtocolError> {
    field(d, key)?
        .as_str()
        .map(str::to_owned)
        .ok_or(ProtocolError::InvalidField(key))
}

fn u32_field(d: &Dict, key: &'static str) -> Result<u32, ProtocolError> {
    field(d, key)?
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or(ProtocolError::InvalidField(key))
}

fn bool_field(d: &Dict, key: &'static str) -> Result<bool, ProtocolError> {
    field(d, key)?
        .as_bool()
        .ok_or(ProtocolError::InvalidField(key))
}

/// Property dictionaries may be omitted; absence means empty.
fn props_field(d: &Dict, key: &'static str) -> Result<Dict, ProtocolError> {
    match d.get(key) {
        None | Some(Value::Null) => Ok(Dict::new()),
        Some(v) => as_dict(v, key).cloned(),
    }
}

fn list_field<'a>(d: &'a Dict, key: &'static str) -> Result<&'a [Value], ProtocolError> {
    match d.get(key) {
        None | Some(Value::Null) => Ok(&[]),
        Some(v) => v.as_list().ok_or(ProtocolError::InvalidField(key)),
    }
}

fn dict(entries: impl IntoIterator<Item = (&'static str, Value)>) -> Value {
    Value::Dict(entries.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
}

// ---------------------------------------------------------------------------
// ClientInfo
// ---------------------------------------------------------------------------

/// A player: an id plus its property dictionary.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClientInfo {
    pub id: String,
    pub props: Dict,
}

impl ClientInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            props: Dict::new(),
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn to_value(&self) -> Value {
        dict([
            ("id", Value::from(self.id.as_str())),
            ("props", Value::Dict(self.props.clone())),
        ])
    }

    pub fn from_value(v: &Value) -> Result<Self, ProtocolError> {
        let d = as_dict(v, "client")?;
        Ok(Self {
            id: str_field(d, "id")?,
            props: props_field(d, "props")?,
        })
    }
}

// ---------------------------------------------------------------------------
// RoomInfo
// ---------------------------------------------------------------------------

/// Room metadata as reported by the lobby.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoomInfo {
    pub id: String,
    /// Short numeric handle for joining by number. Zero when unassigned.
    pub number: u32,
    pub visible: bool,
    pub joinable: bool,
    pub watchable: bool,
    pub search_group: u32,
    pub max_players: u32,
    pub players: u32,
    pub watchers: u32,
    /// Seconds of silence after which the server drops a client.
    pub client_deadline: u32,
    pub public_props: Dict,
    pub private_props: Dict,
}

impl RoomInfo {
    pub fn to_value(&self) -> Value {
        dict([
            ("id", Value::from(self.id.as_str())),
            ("number", Value::UInt(self.number)),
            ("visible", Value::Bool(self.visible)),
            ("joinable", Value::Bool(self.joinable)),
            ("watchable", Value::Bool(self.watchable)),
            ("search_group", Value::UInt(self.search_group)),
            ("max_players", Value::UInt(self.max_players)),
            ("players", Value::UInt(self.players)),
            ("watchers", Value::UInt(self.watchers)),
            ("client_deadline", Value::UInt(self.client_deadline)),
            ("public_props", Value::Dict(self.public_props.clone())),
            ("private_props", Value::Dict(self.private_props.clone())),
        ])
    }

    pub fn from_value(v: &Value) -> Result<Self, ProtocolError> {
        let d = as_dict(v, "room")?;
        Ok(Self {
            id: str_field(d, "id")?,
            number: u32_field(d, "number")?,
            visible: bool_field(d, "visible")?,
            joinable: bool_field(d, "joinable")?,
            watchable: bool_field(d, "watchable")?,
            search_group: u32_field(d, "search_group")?,
            max_players: u32_field(d, "max_players")?,
            players: u32_field(d, "players")?,
            watchers: u32_field(d, "watchers")?,
            client_deadline: u32_field(d, "client_deadline")?,
            public_props: props_field(d, "public_props")?,
            private_props: props_field(d, "private_props")?,
        })
    }
}

// ---------------------------------------------------------------------------
// RoomOption
// ---------------------------------------------------------------------------

/// Settings for a room to be created.
///
/// ```rust
/// use roomwire_protocol::RoomOption;
///
/// let opt = RoomOption::new()
///     .max_players(4)
///     .with_number(true)
///     .public_prop("mode", "ranked");
/// assert_eq!(opt.max_players, 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RoomOption {
    pub visible: bool,
    pub joinable: bool,
    pub watchable: bool,
    pub with_number: bool,
    pub search_group: u32,
    pub max_players: u32,
    pub client_deadline: u32,
    pub public_props: Dict,
    pub private_props: Dict,
}

impl Default for RoomOption {
    fn default() -> Self {
        Self {
            visible: true,
            joinable: true,
            watchable: true,
            with_number: false,
            search_group: 0,
            max_players: 0,
            client_deadline: 0,
            public_props: Dict::new(),
            private_props: Dict::new(),
        }
    }
}

impl RoomOption {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(mut self, v: bool) -> Self {
        self.visible = v;
        self
    }

    pub fn joinable(mut self, v: bool) -> Self {
        self.joinable = v;
        self
    }

    pub fn watchable(mut self, v: bool) -> Self {
        self.watchable = v;
        self
    }

    pub fn with_number(mut self, v: bool) -> Self {
        self.with_number = v;
        self
    }

    pub fn search_group(mut self, group: u32) -> Self {
        self.search_group = group;
        self
    }

    /// Zero leaves the limit to the server.
    pub fn max_players(mut self, n: u32) -> Self {
        self.max_players = n;
        self
    }

    /// Zero leaves the deadline to the server.
    pub fn client_deadline(mut self, secs: u32) -> Self {
        self.client_deadline = secs;
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

    pub fn to_value(&self) -> Value {
        dict([
            ("visible", Value::Bool(self.visible)),
            ("joinable", Value::Bool(self.joinable)),
            ("watchable", Value::Bool(self.watchable)),
            ("with_number", Value::Bool(self.with_number)),
            ("search_group", Value::UInt(self.search_group)),
            ("max_players", Value::UInt(self.max_players)),
            ("client_deadline", Value::UInt(self.client_deadline)),
            ("public_props", Value::Dict(self.public_props.clone())),
            ("private_props", Value::Dict(self.private_props.clone())),
        ])
    }

    pub fn from_value(v: &Value) -> Result<Self, ProtocolError> {
        let d = as_dict(v, "option")?;
        Ok(Self {
            visible: bool_field(d, "visible")?,
            joinable: bool_field(d, "joinable")?,
            watchable: bool_field(d, "watchable")?,
            with_number: bool_field(d, "with_number")?,
            search_group: u32_field(d, "search_group")?,
            max_players: u32_field(d, "max_players")?,
            client_deadline: u32_field(d, "client_deadline")?,
            public_props: props_field(d, "public_props")?,
            private_props: props_field(d, "private_props")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Body of `POST /rooms`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRoomReq {
    pub option: RoomOption,
    pub client: ClientInfo,
}

impl CreateRoomReq {
    pub fn to_value(&self) -> Value {
        dict([
            ("option", self.option.to_value()),
            ("client", self.client.to_value()),
        ])
    }

    pub fn from_value(v: &Value) -> Result<Self, ProtocolError> {
        let d = as_dict(v, "create")?;
        Ok(Self {
            option: RoomOption::from_value(field(d, "option")?)?,
            client: ClientInfo::from_value(field(d, "client")?)?,
        })
    }
}

/// Body of the join and watch endpoints. `query` filters candidates for
/// random joins and is ignored elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRoomReq {
    pub client: ClientInfo,
    pub query: Option<Query>,
}

impl JoinRoomReq {
    pub fn to_value(&self, registry: &Registry) -> Result<Value, ProtocolError> {
        let query = match &self.query {
            Some(q) => q.to_value(registry)?,
            None => Value::Null,
        };
        Ok(dict([("client", self.client.to_value()), ("query", query)]))
    }
}

/// Body of `POST /rooms/search`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchReq {
    pub search_group: u32,
    /// Maximum rooms to return. Zero leaves the limit to the server.
    pub limit: u32,
    pub check_joinable: bool,
    pub check_watchable: bool,
    pub query: Option<Query>,
}

impl SearchReq {
    pub fn to_value(&self, registry: &Registry) -> Result<Value, ProtocolError> {
        let query = match &self.query {
            Some(q) => q.to_value(registry)?,
            None => Value::Null,
        };
        Ok(dict([
            ("search_group", Value::UInt(self.search_group)),
            ("limit", Value::UInt(self.limit)),
            ("check_joinable", Value::Bool(self.check_joinable)),
            ("check_watchable", Value::Bool(self.check_watchable)),
            ("query", query),
        ]))
    }
}

/// Body of `POST /rooms/search/ids`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchByIdsReq {
    pub ids: Vec<String>,
    pub query: Option<Query>,
}

impl SearchByIdsReq {
    pub fn to_value(&self, registry: &Registry) -> Result<Value, ProtocolError> {
        let query = match &self.query {
            Some(q) => q.to_value(registry)?,
            None => Value::Null,
        };
        let ids = self.ids.iter().map(|id| Value::from(id.as_str())).collect();
        Ok(dict([("ids", Value::List(ids)), ("query", query)]))
    }
}

/// Body of `POST /rooms/search/numbers`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchByNumbersReq {
    pub numbers: Vec<u32>,
    pub query: Option<Query>,
}

impl SearchByNumbersReq {
    pub fn to_value(&self, registry: &Registry) -> Result<Value, ProtocolError> {
        let query = match &self.query {
            Some(q) => q.to_value(registry)?,
            None => Value::Null,
        };
        Ok(dict([
            ("numbers", Value::UInts(self.numbers.clone())),
            ("query", query),
        ]))
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Everything needed to connect to a room after a successful join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRoom {
    pub room: RoomInfo,
    /// Players already in the room, including the caller.
    pub players: Vec<ClientInfo>,
    pub master_id: String,
    /// Room socket endpoint.
    pub url: String,
    /// Per-session key for signing room messages.
    pub auth_key: String,
}

impl JoinedRoom {
    pub fn to_value(&self) -> Value {
        dict([
            ("room", self.room.to_value()),
            (
                "players",
                Value::List(self.players.iter().map(ClientInfo::to_value).collect()),
            ),
            ("master_id", Value::from(self.master_id.as_str())),
            ("url", Value::from(self.url.as_str())),
            ("auth_key", Value::from(self.auth_key.as_str())),
        ])
    }

    pub fn from_value(v: &Value) -> Result<Self, ProtocolError> {
        let d = as_dict(v, "joined")?;
        Ok(Self {
            room: RoomInfo::from_value(field(d, "room")?)?,
            players: list_field(d, "players")?
                .iter()
                .map(ClientInfo::from_value)
                .collect::<Result<_, _>>()?,
            master_id: str_field(d, "master_id")?,
            url: str_field(d, "url")?,
            auth_key: str_field(d, "auth_key")?,
        })
    }
}

/// Outcome code of a lobby call.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LobbyResponseType {
    Ok = 0,
    RoomLimit = 1,
    NoRoomFound = 2,
    RoomFull = 3,
}

impl TryFrom<u8> for LobbyResponseType {
    type Error = ProtocolError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => Self::Ok,
            1 => Self::RoomLimit,
            2 => Self::NoRoomFound,
            3 => Self::RoomFull,
            _ => return Err(ProtocolError::InvalidField("type")),
        })
    }
}

/// Body of every lobby response.
#[derive(Debug, Clone, PartialEq)]
pub struct LobbyResponse {
    pub kind: LobbyResponseType,
    pub message: String,
    /// Present on successful create, join and watch.
    pub joined: Option<JoinedRoom>,
    /// Present on searches.
    pub rooms: Vec<RoomInfo>,
}

impl LobbyResponse {
    pub fn ok_joined(joined: JoinedRoom) -> Self {
        Self {
            kind: LobbyResponseType::Ok,
            message: String::new(),
            joined: Some(joined),
            rooms: Vec::new(),
        }
    }

    pub fn ok_rooms(rooms: Vec<RoomInfo>) -> Self {
        Self {
            kind: LobbyResponseType::Ok,
            message: String::new(),
            joined: None,
            rooms,
        }
    }

    pub fn failed(kind: LobbyResponseType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            joined: None,
            rooms: Vec::new(),
        }
    }

    pub fn to_value(&self) -> Value {
        dict([
            ("type", Value::Byte(self.kind as u8)),
            ("msg", Value::from(self.message.as_str())),
            (
                "joined",
                self.joined
                    .as_ref()
                    .map(JoinedRoom::to_value)
                    .unwrap_or_default(),
            ),
            (
                "rooms",
                Value::List(self.rooms.iter().map(RoomInfo::to_value).collect()),
            ),
        ])
    }

    pub fn from_value(v: &Value) -> Result<Self, ProtocolError> {
        let d = as_dict(v, "response")?;
        let kind = field(d, "type")?
            .as_u64()
            .and_then(|v| u8::try_from(v).ok())
            .ok_or(ProtocolError::InvalidField("type"))?;
        let joined = match d.get("joined") {
            None | Some(Value::Null) => None,
            Some(v) => Some(JoinedRoom::from_value(v)?),
        };
        Ok(Self {
            kind: LobbyResponseType::try_from(kind)?,
            message: match d.get("msg") {
                Some(v) => v
                    .as_str()
                    .map(str::to_owned)
                    .ok_or(ProtocolError::InvalidField("msg"))?,
                None => String::new(),
            },
            joined,
            rooms: list_field(d, "rooms")?
                .iter()
                .map(RoomInfo::from_value)
                .collect::<Result<_, _>>()?,
        })
    }
}
