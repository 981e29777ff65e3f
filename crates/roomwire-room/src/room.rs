//! The client-side room: a local mirror of the server's room state.
//!
//! The connection task never touches room state. It queues decoded events,
//! and the application applies them by calling [`Room::process_callbacks`]
//! on its own thread, so callbacks fire one at a time in delivery order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use roomwire_codec::{Dict, Registry, Value};
use roomwire_protocol::{
    Event, JoinedRoom, MsgPayload, MsgPool, MsgSigner, RoomInfo, parse_msg_frame,
};
use roomwire_session::{
    ConnectRequest, Connection, ConnectionHandle, Delivery, Outbox, SessionConfig, SessionEvent,
};
use roomwire_transport::Dialer;
use tokio::sync::mpsc;

use crate::rpc::{RpcCall, RpcRegistry};
use crate::{EventReceiver, Player, RoomError, RoomPropDiff, RoomState, RpcHandle};

/// How the server refused a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestFailure {
    /// The sender may not do this (for example, not the master).
    PermissionDenied,
    /// Some of the targeted players are not in the room.
    TargetNotFound { missing: Vec<String> },
}

/// A refused request, with the request itself decoded from the echo.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestError {
    pub seq: u32,
    pub failure: RequestFailure,
    pub payload: MsgPayload,
}

type ErrorHandler = Box<dyn FnOnce(&RequestError) + Send>;

/// Who is connecting to a room.
#[derive(Debug, Clone)]
pub struct RoomUser {
    pub app_id: String,
    pub user_id: String,
}

/// A joined (or watched) room.
///
/// Dropping a `Room` disconnects it without a leave message.
pub struct Room {
    info: RoomInfo,
    players: BTreeMap<String, Player>,
    me: String,
    master_id: String,
    state: RoomState,

    rtt: Duration,
    watchers: u32,
    last_msg_times: Dict,

    rpcs: RpcRegistry,
    error_handlers: HashMap<u32, ErrorHandler>,
    registry: Arc<Registry>,

    events: mpsc::UnboundedReceiver<Delivery>,
    handle: ConnectionHandle,
}

impl Room {
    /// Builds the room from a lobby response and starts its connection.
    ///
    /// Must be called inside a tokio runtime.
    pub fn connect<D: Dialer>(
        joined: JoinedRoom,
        user: RoomUser,
        dialer: D,
        config: SessionConfig,
        registry: Arc<Registry>,
    ) -> Result<Self, RoomError> {
        let JoinedRoom {
            room,
            players,
            master_id,
            url,
            auth_key,
        } = joined;

        let signer = MsgSigner::new(auth_key.as_bytes())?;
        let outbox = Arc::new(Outbox::new(MsgPool::new(
            config.pool_capacity,
            signer,
            Arc::clone(&registry),
        )));
        let (tx, events) = mpsc::unbounded_channel();
        let request = ConnectRequest {
            url,
            app_id: user.app_id,
            user_id: user.user_id.clone(),
            auth_key,
            client_deadline: room.client_deadline,
        };
        let handle = Connection::spawn(
            dialer,
            request,
            config,
            outbox,
            Arc::clone(&registry),
            tx,
        );

        let players: BTreeMap<String, Player> = players
            .into_iter()
            .map(|p| (p.id.clone(), Player::from(p)))
            .collect();
        tracing::info!(
            room_id = %room.id,
            me = %user.user_id,
            players = players.len(),
            "room connecting"
        );

        Ok(Self {
            watchers: room.watchers,
            info: room,
            players,
            me: user.user_id,
            master_id,
            state: RoomState::Running,
            rtt: Duration::ZERO,
            last_msg_times: Dict::new(),
            rpcs: RpcRegistry::default(),
            error_handlers: HashMap::new(),
            registry,
            events,
            handle,
        })
    }

    // -- accessors ----------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn info(&self) -> &RoomInfo {
        &self.info
    }

    /// The roster, keyed by player id.
    pub fn players(&self) -> &BTreeMap<String, Player> {
        &self.players
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn my_id(&self) -> &str {
        &self.me
    }

    /// This client's roster entry. `None` while watching.
    pub fn me(&self) -> Option<&Player> {
        self.players.get(&self.me)
    }

    pub fn master_id(&self) -> &str {
        &self.master_id
    }

    pub fn master(&self) -> Option<&Player> {
        self.players.get(&self.master_id)
    }

    pub fn is_master(&self) -> bool {
        self.me == self.master_id
    }

    /// Round trip of the last heartbeat.
    pub fn rtt(&self) -> Duration {
        self.rtt
    }

    pub fn watcher_count(&self) -> u32 {
        self.watchers
    }

    /// Unix milliseconds of the last message the server got from each
    /// player, as of the last heartbeat.
    pub fn last_msg_times(&self) -> &Dict {
        &self.last_msg_times
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Whether the final notification has been delivered.
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    // -- callback queue -----------------------------------------------------

    /// Stops [`process_callbacks`](Self::process_callbacks) from draining.
    /// Events keep queueing.
    pub fn pause(&mut self) {
        self.state = self.state.paused();
    }

    pub fn restart(&mut self) {
        self.state = self.state.restarted();
    }

    /// Applies every queued event and fires its callbacks. Returns how many
    /// events were handled.
    pub fn process_callbacks(&mut self, receiver: &mut impl EventReceiver) -> usize {
        let mut handled = 0;
        while self.state.is_running() {
            let Ok(delivery) = self.events.try_recv() else {
                break;
            };
            let (event, _lease) = delivery.into_parts();
            self.dispatch(event, receiver);
            handled += 1;
        }
        handled
    }

    fn dispatch(&mut self, event: SessionEvent, receiver: &mut impl EventReceiver) {
        match event {
            SessionEvent::Event(event) => self.apply_event(event, receiver),
            SessionEvent::Pong {
                rtt,
                watchers,
                last_msg_times,
            } => {
                self.rtt = rtt;
                self.watchers = watchers;
                self.info.watchers = watchers;
                self.last_msg_times = last_msg_times;
            }
            SessionEvent::Closed(reason) => {
                tracing::info!(room_id = %self.info.id, ?reason, "room closed");
                self.close();
                receiver.on_closed(self, &reason);
            }
            SessionEvent::Failed(error) => {
                tracing::warn!(room_id = %self.info.id, error = %error, "room closed by error");
                self.close();
                receiver.on_error_closed(self, &error);
            }
        }
    }

    fn close(&mut self) {
        self.state = RoomState::Closed;
        self.error_handlers.clear();
        self.events.close();
        self.handle.shutdown();
    }

    fn apply_event(&mut self, event: Event, receiver: &mut impl EventReceiver) {
        match event {
            Event::Joined(info) => {
                let id = self.add_player(info.into());
                let player = &self.players[&id];
                if id == self.me {
                    receiver.on_joined(self, player);
                } else {
                    receiver.on_other_player_joined(self, player);
                }
            }
            Event::Rejoined(info) => {
                let id = self.add_player(info.into());
                let player = &self.players[&id];
                if id == self.me {
                    receiver.on_rejoined(self, player);
                } else {
                    receiver.on_other_player_rejoined(self, player);
                }
            }
            Event::Left {
                client_id,
                master_id,
            } => {
                self.switch_master_to(master_id, receiver);
                match self.players.remove(&client_id) {
                    Some(player) => {
                        self.info.players = self.players.len() as u32;
                        tracing::debug!(room_id = %self.info.id, player = %client_id, "player left");
                        receiver.on_player_left(self, &player);
                    }
                    None => {
                        tracing::warn!(room_id = %self.info.id, player = %client_id, "left event for unknown player");
                    }
                }
            }
            Event::MasterSwitched { master_id } => self.switch_master_to(master_id, receiver),
            Event::RoomProp(payload) => {
                let changes = RoomPropDiff::apply(&mut self.info, payload);
                if let Some(deadline) = changes.client_deadline {
                    self.handle.set_client_deadline(deadline);
                }
                if !changes.is_empty() {
                    receiver.on_room_property_changed(self, &changes);
                }
            }
            Event::ClientProp { client_id, props } => {
                let Some(player) = self.players.get_mut(&client_id) else {
                    tracing::warn!(room_id = %self.info.id, player = %client_id, "property change for unknown player");
                    return;
                };
                let changed = player.apply_props(props);
                if !changed.is_empty() {
                    receiver.on_player_property_changed(self, &self.players[&client_id], &changed);
                }
            }
            Event::Message {
                sender_id,
                rpc_id,
                args,
            } => {
                if !self.rpcs.dispatch(rpc_id, &sender_id, &args, &self.registry) {
                    tracing::warn!(room_id = %self.info.id, rpc_id, sender = %sender_id, "no rpc registered for id");
                }
            }
            Event::Succeeded { msg_seq } => {
                self.error_handlers.remove(&msg_seq);
            }
            Event::PermissionDenied { msg } => {
                self.request_failed(&msg, RequestFailure::PermissionDenied);
            }
            Event::TargetNotFound { missing, msg } => {
                self.request_failed(&msg, RequestFailure::TargetNotFound { missing });
            }
            Event::PeerReady { .. } | Event::Pong(_) => {
                tracing::debug!(room_id = %self.info.id, "connection event reached the room");
            }
        }
    }

    /// Inserts or replaces a player and returns its id.
    fn add_player(&mut self, player: Player) -> String {
        let id = player.id().to_owned();
        tracing::debug!(room_id = %self.info.id, player = %id, "player joined");
        self.players.insert(id.clone(), player);
        self.info.players = self.players.len() as u32;
        id
    }

    /// Adopts `master_id`, firing the callback only when it changes.
    fn switch_master_to(&mut self, master_id: String, receiver: &mut impl EventReceiver) {
        if master_id == self.master_id {
            return;
        }
        let previous = std::mem::replace(&mut self.master_id, master_id);
        tracing::info!(room_id = %self.info.id, from = %previous, to = %self.master_id, "master switched");
        match self.players.get(&self.master_id) {
            Some(master) => receiver.on_master_switched(self, &previous, master),
            None => {
                tracing::warn!(room_id = %self.info.id, master = %self.master_id, "new master is not in the roster");
            }
        }
    }

    fn request_failed(&mut self, msg: &[u8], failure: RequestFailure) {
        let (seq, payload) = match parse_msg_frame(msg, &self.registry) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(room_id = %self.info.id, error = %e, "undecodable error response");
                return;
            }
        };
        let error = RequestError {
            seq,
            failure,
            payload,
        };
        match self.error_handlers.remove(&seq) {
            Some(handler) => handler(&error),
            None => {
                tracing::warn!(room_id = %self.info.id, seq, failure = ?error.failure, "request refused");
            }
        }
    }

    // -- registration -------------------------------------------------------

    /// Registers an RPC under `name`. Ids are assigned in call order.
    pub fn register_rpc<F>(&mut self, name: &str, handler: F) -> Result<RpcHandle, RoomError>
    where
        F: FnMut(RpcCall<'_>) + Send + 'static,
    {
        self.rpcs.register(name, Box::new(handler))
    }

    /// Calls `handler` if the server refuses the request sent as `seq`.
    /// A success response drops it.
    ///
    /// Register right after the call that returned `seq`; responses are only
    /// applied inside `process_callbacks`, so none can be missed.
    pub fn on_request_error<F>(&mut self, seq: u32, handler: F)
    where
        F: FnOnce(&RequestError) + Send + 'static,
    {
        if !self.state.is_closed() {
            self.error_handlers.insert(seq, Box::new(handler));
        }
    }

    // -- operations ---------------------------------------------------------

    fn ensure_open(&self) -> Result<(), RoomError> {
        if self.state.is_closed() || self.handle.is_closed() {
            return Err(RoomError::Closed(self.info.id.clone()));
        }
        Ok(())
    }

    fn ensure_master(&self) -> Result<(), RoomError> {
        if !self.is_master() {
            return Err(RoomError::NotMaster {
                room_id: self.info.id.clone(),
                me: self.me.clone(),
            });
        }
        Ok(())
    }

    fn ensure_player(&self, id: &str) -> Result<(), RoomError> {
        if !self.players.contains_key(id) {
            return Err(RoomError::PlayerNotFound(id.to_owned()));
        }
        Ok(())
    }

    fn post<F>(&self, f: F) -> Result<u32, RoomError>
    where
        F: FnOnce(&mut MsgPool) -> Result<u32, roomwire_protocol::ProtocolError>,
    {
        self.ensure_open()?;
        let seq = self.handle.post(f).inspect_err(|e| {
            tracing::warn!(room_id = %self.info.id, error = %e, "message not queued");
        })?;
        tracing::trace!(room_id = %self.info.id, seq, "message queued");
        Ok(seq)
    }

    fn encode_args(&self, args: &Value) -> Result<Vec<u8>, RoomError> {
        if matches!(args, Value::Null) {
            return Ok(Vec::new());
        }
        Ok(roomwire_codec::encode_with(args, &self.registry)?)
    }

    /// Asks the server to remove this client. The room closes when the
    /// server confirms.
    pub fn leave(&self, message: &str) -> Result<u32, RoomError> {
        self.post(|pool| pool.post_leave(message))
    }

    /// Drops the connection without telling the server. The final
    /// [`EventReceiver::on_closed`] still arrives through the queue.
    pub fn force_disconnect(&self) {
        tracing::info!(room_id = %self.info.id, "forcing disconnect");
        self.handle.shutdown();
    }

    /// Master only. Local state changes when the server echoes the change.
    pub fn change_room_property(&self, diff: RoomPropDiff) -> Result<u32, RoomError> {
        self.ensure_open()?;
        self.ensure_master()?;
        let payload = diff.to_payload(&self.info);
        self.post(|pool| pool.post_room_prop(payload))
    }

    /// Changes this player's properties. Watchers have none.
    pub fn change_my_property(&self, props: Dict) -> Result<u32, RoomError> {
        self.ensure_open()?;
        if !self.players.contains_key(&self.me) {
            return Err(RoomError::NotPlayer(self.me.clone()));
        }
        self.post(|pool| pool.post_client_prop(props))
    }

    /// Master only.
    pub fn switch_master(&self, new_master: &str) -> Result<u32, RoomError> {
        self.ensure_open()?;
        self.ensure_master()?;
        self.ensure_player(new_master)?;
        self.post(|pool| pool.post_switch_master(new_master))
    }

    /// Master only.
    pub fn kick(&self, target: &str, message: &str) -> Result<u32, RoomError> {
        self.ensure_open()?;
        self.ensure_master()?;
        self.ensure_player(target)?;
        self.post(|pool| pool.post_kick(target, message))
    }

    /// Calls `rpc` on every client in the room, including this one.
    pub fn rpc(&self, rpc: RpcHandle, args: &Value) -> Result<u32, RoomError> {
        let args = self.encode_args(args)?;
        self.post(|pool| pool.post_broadcast(rpc.id(), args))
    }

    pub fn rpc_to_master(&self, rpc: RpcHandle, args: &Value) -> Result<u32, RoomError> {
        let args = self.encode_args(args)?;
        self.post(|pool| pool.post_to_master(rpc.id(), args))
    }

    /// Calls `rpc` on the listed players only.
    pub fn rpc_to(&self, rpc: RpcHandle, targets: &[&str], args: &Value) -> Result<u32, RoomError> {
        let args = self.encode_args(args)?;
        let targets = targets.iter().map(|t| (*t).to_owned()).collect();
        self.post(|pool| pool.post_targets(targets, rpc.id(), args))
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.info.id)
            .field("me", &self.me)
            .field("master_id", &self.master_id)
            .field("players", &self.players.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use roomwire_protocol::ClientInfo;
    use roomwire_transport::mock;

    use super::*;

    fn joined(master: &str) -> JoinedRoom {
        JoinedRoom {
            room: RoomInfo {
                id: "room-1".into(),
                client_deadline: 30,
                ..RoomInfo::default()
            },
            players: vec![ClientInfo::new("alice"), ClientInfo::new("bob")],
            master_id: master.into(),
            url: "mock://room-1".into(),
            auth_key: "key".into(),
        }
    }

    fn room(master: &str) -> Room {
        let (dialer, _listener) = mock::pair();
        let user = RoomUser {
            app_id: "app".into(),
            user_id: "alice".into(),
        };
        Room::connect(
            joined(master),
            user,
            dialer,
            SessionConfig::default(),
            Arc::new(Registry::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_master_only_operations_are_refused_locally() {
        let room = room("bob");
        assert!(!room.is_master());
        assert!(matches!(
            room.kick("bob", "bye"),
            Err(RoomError::NotMaster { .. })
        ));
        assert!(matches!(
            room.switch_master("alice"),
            Err(RoomError::NotMaster { .. })
        ));
        assert!(matches!(
            room.change_room_property(RoomPropDiff::new().joinable(false)),
            Err(RoomError::NotMaster { .. })
        ));
        assert_eq!(room.master_id(), "bob");
    }

    #[tokio::test]
    async fn test_master_operations_do_not_mutate_state() {
        let room = room("alice");
        assert_eq!(room.switch_master("bob").unwrap(), 1);
        assert_eq!(room.master_id(), "alice");

        assert_eq!(
            room.change_room_property(RoomPropDiff::new().max_players(2))
                .unwrap(),
            2
        );
        assert_eq!(room.info().max_players, 0);

        assert!(matches!(
            room.kick("carol", "bye"),
            Err(RoomError::PlayerNotFound(id)) if id == "carol"
        ));
    }

    #[tokio::test]
    async fn test_pause_keeps_events_queued() {
        let mut room = room("alice");
        room.pause();
        room.force_disconnect();
        room.handle.closed().await;

        assert_eq!(room.process_callbacks(&mut ()), 0);
        assert!(!room.is_closed());

        room.restart();
        assert_eq!(room.process_callbacks(&mut ()), 1);
        assert!(room.is_closed());
        assert!(matches!(room.leave("bye"), Err(RoomError::Closed(_))));
    }
}
