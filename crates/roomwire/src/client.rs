//! `Client`: lobby calls that end in a connected [`Room`].
//!
//! Every call builds a typed request, encodes it, posts it through the
//! application's [`LobbyTransport`] and decodes the `LobbyResponse`. Join,
//! create and watch calls then build a `Room`, which dials the room socket
//! right away. Lobby failures come back as [`LobbyError`] before anything is
//! dialed.

use std::sync::Arc;

use roomwire_codec::{Dict, Registry, Value, decode_with, encode_with};
use roomwire_protocol::{
    ClientInfo, CreateRoomReq, JoinRoomReq, JoinedRoom, LobbyResponse, LobbyResponseType, Query,
    RoomInfo, RoomOption, SearchByIdsReq, SearchByNumbersReq, SearchReq, bearer,
    generate_auth_data,
};
use roomwire_room::{Room, RoomUser};
use roomwire_session::{HEADER_APP_ID, HEADER_AUTHORIZATION, HEADER_USER_ID, SessionConfig};
use roomwire_transport::Dialer;
#[cfg(feature = "websocket")]
use roomwire_transport::WebSocketDialer;
use serde::{Deserialize, Serialize};

use crate::{Error, LobbyError, LobbyReply, LobbyRequest, LobbyTransport};

/// Who the client is and where the lobby lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub app_id: String,
    pub user_id: String,
    /// Shared secret used to sign lobby auth data.
    pub app_key: String,
    /// Base URL, e.g. `https://lobby.example.com`. Paths are appended.
    pub lobby_url: String,
    /// Applied to every room this client connects to.
    pub session: SessionConfig,
}

impl ClientConfig {
    pub fn new(
        app_id: impl Into<String>,
        user_id: impl Into<String>,
        app_key: impl Into<String>,
        lobby_url: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            user_id: user_id.into(),
            app_key: app_key.into(),
            lobby_url: lobby_url.into(),
            session: SessionConfig::default(),
        }
    }

    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}

/// Entry point for lobby calls.
///
/// # Example
///
/// ```rust,ignore
/// let client = Client::new(ClientConfig::new("app", "alice", key, lobby_url), http);
/// let mut room = client.create(RoomOption::new().max_players(4), Dict::new()).await?;
/// room.process_callbacks(&mut my_receiver);
/// ```
pub struct Client<L, D> {
    config: ClientConfig,
    lobby: L,
    dialer: D,
    registry: Arc<Registry>,
}

#[cfg(feature = "websocket")]
impl<L: LobbyTransport> Client<L, WebSocketDialer> {
    /// A client whose rooms connect over WebSocket.
    pub fn new(config: ClientConfig, lobby: L) -> Self {
        Self::with_dialer(config, lobby, WebSocketDialer::new())
    }
}

impl<L: LobbyTransport, D: Dialer + Clone> Client<L, D> {
    /// A client whose rooms connect through `dialer`.
    pub fn with_dialer(config: ClientConfig, lobby: L, dialer: D) -> Self {
        Self {
            config,
            lobby,
            dialer,
            registry: Arc::new(Registry::new()),
        }
    }

    /// Uses `registry` for custom types in queries, properties and RPC
    /// arguments. Every room created afterwards shares it.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Creates a room and joins it as its first player and master.
    pub async fn create(&self, option: RoomOption, props: Dict) -> Result<Room, Error> {
        let req = CreateRoomReq {
            option,
            client: self.me(props),
        };
        self.join_call("/rooms", req.to_value()).await
    }

    /// Joins the room with id `room_id`.
    pub async fn join(&self, room_id: &str, props: Dict) -> Result<Room, Error> {
        let path = format!("/rooms/join/id/{room_id}");
        self.join_call(&path, self.join_body(None, props)?).await
    }

    /// Joins the room with the short number `number`.
    pub async fn join_by_number(&self, number: u32, props: Dict) -> Result<Room, Error> {
        let path = format!("/rooms/join/number/{number}");
        self.join_call(&path, self.join_body(None, props)?).await
    }

    /// Joins any joinable room in `search_group` matching `query`.
    pub async fn random_join(
        &self,
        search_group: u32,
        query: Option<Query>,
        props: Dict,
    ) -> Result<Room, Error> {
        let path = format!("/rooms/join/random/{search_group}");
        self.join_call(&path, self.join_body(query, props)?).await
    }

    /// Watches the room with id `room_id` without taking a player slot.
    pub async fn watch(&self, room_id: &str, props: Dict) -> Result<Room, Error> {
        let path = format!("/rooms/watch/id/{room_id}");
        self.join_call(&path, self.join_body(None, props)?).await
    }

    pub async fn watch_by_number(&self, number: u32, props: Dict) -> Result<Room, Error> {
        let path = format!("/rooms/watch/number/{number}");
        self.join_call(&path, self.join_body(None, props)?).await
    }

    /// Lists rooms in a search group.
    pub async fn search(&self, req: &SearchReq) -> Result<Vec<RoomInfo>, Error> {
        let body = req.to_value(&self.registry)?;
        Ok(self.call("/rooms/search", &body).await?.rooms)
    }

    /// Looks rooms up by id. Unknown ids are left out of the result.
    pub async fn search_by_ids(&self, req: &SearchByIdsReq) -> Result<Vec<RoomInfo>, Error> {
        let body = req.to_value(&self.registry)?;
        Ok(self.call("/rooms/search/ids", &body).await?.rooms)
    }

    pub async fn search_by_numbers(
        &self,
        req: &SearchByNumbersReq,
    ) -> Result<Vec<RoomInfo>, Error> {
        let body = req.to_value(&self.registry)?;
        Ok(self.call("/rooms/search/numbers", &body).await?.rooms)
    }

    fn me(&self, props: Dict) -> ClientInfo {
        ClientInfo {
            id: self.config.user_id.clone(),
            props,
        }
    }

    fn join_body(&self, query: Option<Query>, props: Dict) -> Result<Value, Error> {
        let req = JoinRoomReq {
            client: self.me(props),
            query,
        };
        Ok(req.to_value(&self.registry)?)
    }

    async fn join_call(&self, path: &str, body: Value) -> Result<Room, Error> {
        let joined = self
            .call(path, &body)
            .await?
            .joined
            .ok_or(LobbyError::InvalidResponse("missing joined room"))?;
        self.connect(joined)
    }

    fn connect(&self, joined: JoinedRoom) -> Result<Room, Error> {
        tracing::info!(
            room_id = %joined.room.id,
            players = joined.players.len(),
            "lobby call succeeded, connecting"
        );
        let user = RoomUser {
            app_id: self.config.app_id.clone(),
            user_id: self.config.user_id.clone(),
        };
        Ok(Room::connect(
            joined,
            user,
            self.dialer.clone(),
            self.config.session.clone(),
            Arc::clone(&self.registry),
        )?)
    }

    async fn call(&self, path: &str, body: &Value) -> Result<LobbyResponse, Error> {
        let auth = generate_auth_data(self.config.app_key.as_bytes(), &self.config.user_id)?;
        let request = LobbyRequest {
            url: format!("{}{path}", self.config.lobby_url.trim_end_matches('/')),
            headers: vec![
                (HEADER_APP_ID.to_owned(), self.config.app_id.clone()),
                (HEADER_USER_ID.to_owned(), self.config.user_id.clone()),
                (HEADER_AUTHORIZATION.to_owned(), bearer(&auth)),
            ],
            body: encode_with(body, &self.registry)?,
        };
        tracing::debug!(url = %request.url, "lobby request");

        let LobbyReply { status, body } = self.lobby.post(request).await?;
        if status != 200 {
            let message = String::from_utf8_lossy(&body).into_owned();
            tracing::warn!(path, status, %message, "lobby call rejected");
            return Err(LobbyError::Http { status, message }.into());
        }

        let response = LobbyResponse::from_value(&decode_with(&body, &self.registry)?)?;
        match response.kind {
            LobbyResponseType::Ok => Ok(response),
            LobbyResponseType::NoRoomFound => Err(LobbyError::NoRoomFound(response.message).into()),
            LobbyResponseType::RoomFull => Err(LobbyError::RoomFull(response.message).into()),
            LobbyResponseType::RoomLimit => Err(LobbyError::RoomLimit(response.message).into()),
        }
    }
}

impl<L, D> std::fmt::Debug for Client<L, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("app_id", &self.config.app_id)
            .field("user_id", &self.config.user_id)
            .field("lobby_url", &self.config.lobby_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config = ClientConfig::new("app", "alice", "key", "http://lobby");
        assert_eq!(config.session.max_reconnect, SessionConfig::default().max_reconnect);
        assert_eq!(config.lobby_url, "http://lobby");
    }
}
