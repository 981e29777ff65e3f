//! Integration tests for the room, driven by a hand-played server over the
//! in-memory transport.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use roomwire_codec::{Dict, Registry, Value};
use roomwire_protocol::{
    ClientInfo, Event, JoinedRoom, MsgPayload, MsgSigner, Pong, ProtocolError,
    REGULAR_TYPE_START, RoomInfo, RoomPropPayload, encode_event, parse_msg_frame, parse_ping,
};
use roomwire_room::{
    EventReceiver, Player, RequestFailure, Room, RoomError, RoomPropDiff, RoomUser,
};
use roomwire_session::{CloseReason, SessionConfig, SessionError};
use roomwire_transport::mock::{self, MockListener, ServerEnd};
use tokio::time::timeout;

const KEY: &str = "room-key";
const WAIT: Duration = Duration::from_secs(2);

// =========================================================================
// Recording receiver
// =========================================================================

#[derive(Default)]
struct Log {
    lines: Vec<String>,
    room_changes: Vec<RoomPropDiff>,
    player_changes: Vec<Dict>,
}

impl EventReceiver for Log {
    fn on_joined(&mut self, _room: &Room, me: &Player) {
        self.lines.push(format!("joined {}", me.id()));
    }

    fn on_other_player_joined(&mut self, _room: &Room, player: &Player) {
        self.lines.push(format!("other joined {}", player.id()));
    }

    fn on_other_player_rejoined(&mut self, _room: &Room, player: &Player) {
        self.lines.push(format!("other rejoined {}", player.id()));
    }

    fn on_player_left(&mut self, room: &Room, player: &Player) {
        assert!(room.player(player.id()).is_none());
        self.lines.push(format!("left {}", player.id()));
    }

    fn on_master_switched(&mut self, room: &Room, previous: &str, master: &Player) {
        assert_eq!(room.master_id(), master.id());
        self.lines.push(format!("master {previous}->{}", master.id()));
    }

    fn on_room_property_changed(&mut self, _room: &Room, changes: &RoomPropDiff) {
        self.room_changes.push(changes.clone());
    }

    fn on_player_property_changed(&mut self, _room: &Room, player: &Player, changed: &Dict) {
        self.lines.push(format!("props {}", player.id()));
        self.player_changes.push(changed.clone());
    }

    fn on_closed(&mut self, _room: &Room, reason: &CloseReason) {
        self.lines.push(format!("closed {reason:?}"));
    }

    fn on_error_closed(&mut self, _room: &Room, error: &SessionError) {
        self.lines.push(format!("error {error}"));
    }
}

// =========================================================================
// Hand-played server
// =========================================================================

struct Server {
    end: ServerEnd,
    seq: u32,
    signer: MsgSigner,
    _listener: MockListener,
}

impl Server {
    fn ready(&self) {
        self.end
            .send(encode_event(0, &Event::PeerReady { last_msg_seq: 0 }).unwrap());
    }

    fn event(&mut self, event: Event) {
        self.seq += 1;
        self.end.send(encode_event(self.seq, &event).unwrap());
    }

    async fn next_frame(&mut self) -> Vec<u8> {
        let frame = timeout(WAIT, self.end.recv())
            .await
            .expect("frame expected")
            .expect("client connected");
        self.signer.verify(&frame).expect("signed").to_vec()
    }

    /// Next regular message, unsigned, skipping heartbeats.
    async fn next_msg(&mut self) -> Vec<u8> {
        loop {
            let frame = self.next_frame().await;
            if frame[0] >= REGULAR_TYPE_START {
                return frame;
            }
        }
    }
}

fn room_info() -> RoomInfo {
    RoomInfo {
        id: "room-1".into(),
        number: 7,
        visible: true,
        joinable: true,
        watchable: true,
        max_players: 4,
        client_deadline: 30,
        ..RoomInfo::default()
    }
}

async fn setup(players: &[&str], master: &str) -> (Room, Server) {
    let (room, server) = connect(players, master, SessionConfig::default()).await;
    server.ready();
    (room, server)
}

/// Connects a room but leaves the handshake to the test.
async fn connect(players: &[&str], master: &str, config: SessionConfig) -> (Room, Server) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("roomwire_room=debug,roomwire_session=debug")
        .with_test_writer()
        .try_init();

    let (dialer, mut listener) = mock::pair();
    let joined = JoinedRoom {
        room: room_info(),
        players: players.iter().map(|id| ClientInfo::new(*id)).collect(),
        master_id: master.into(),
        url: "mock://room-1".into(),
        auth_key: KEY.into(),
    };
    let user = RoomUser {
        app_id: "app".into(),
        user_id: "alice".into(),
    };
    let room = Room::connect(
        joined,
        user,
        dialer,
        config,
        Arc::new(Registry::new()),
    )
    .unwrap();

    let end = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let server = Server {
        end,
        seq: 0,
        signer: MsgSigner::new(KEY.as_bytes()).unwrap(),
        _listener: listener,
    };
    (room, server)
}

/// Drains callbacks until `expected` events were handled.
async fn pump(room: &mut Room, log: &mut Log, expected: usize) {
    let deadline = Instant::now() + WAIT;
    let mut handled = 0;
    loop {
        handled += room.process_callbacks(log);
        if handled >= expected {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "only {handled} of {expected} events arrived"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn room_prop(deadline: u32, joinable: bool, public_props: Dict) -> Event {
    Event::RoomProp(RoomPropPayload {
        visible: true,
        joinable,
        watchable: true,
        search_group: 0,
        max_players: 4,
        client_deadline: deadline,
        public_props,
        private_props: Dict::new(),
    })
}

// =========================================================================
// Roster and master
// =========================================================================

#[tokio::test]
async fn test_create_join_leave_without_master_switch() {
    let (mut room, mut server) = setup(&["alice"], "alice").await;
    let mut log = Log::default();
    assert_eq!(room.me().map(Player::id), Some("alice"));
    assert_eq!(room.players().len(), 1);

    server.event(Event::Joined(ClientInfo::new("alice")));
    server.event(Event::Joined(ClientInfo::new("p2")));
    pump(&mut room, &mut log, 2).await;
    let roster: Vec<_> = room.players().keys().cloned().collect();
    assert_eq!(roster, ["alice", "p2"]);

    server.event(Event::Left {
        client_id: "p2".into(),
        master_id: "alice".into(),
    });
    pump(&mut room, &mut log, 1).await;

    assert_eq!(room.players().len(), 1);
    assert!(room.is_master());
    assert_eq!(log.lines, ["joined alice", "other joined p2", "left p2"]);
}

#[tokio::test]
async fn test_master_switch_fires_before_left() {
    let (mut room, mut server) = setup(&["alice", "p2"], "p2").await;
    let mut log = Log::default();

    server.event(Event::Left {
        client_id: "p2".into(),
        master_id: "alice".into(),
    });
    pump(&mut room, &mut log, 1).await;

    assert_eq!(log.lines, ["master p2->alice", "left p2"]);
    assert!(room.is_master());
    assert_eq!(room.master().map(Player::id), Some("alice"));
}

#[tokio::test]
async fn test_master_switched_event() {
    let (mut room, mut server) = setup(&["alice", "p2"], "alice").await;
    let mut log = Log::default();

    server.event(Event::MasterSwitched {
        master_id: "alice".into(),
    });
    server.event(Event::MasterSwitched {
        master_id: "p2".into(),
    });
    pump(&mut room, &mut log, 2).await;

    assert_eq!(log.lines, ["master alice->p2"]);
    assert!(matches!(
        room.kick("p2", "bye"),
        Err(RoomError::NotMaster { .. })
    ));
}

#[tokio::test]
async fn test_rejoin_of_other_player() {
    let (mut room, mut server) = setup(&["alice", "p2"], "alice").await;
    let mut log = Log::default();

    server.event(Event::Rejoined(ClientInfo::new("p2").with_prop("hp", 5)));
    pump(&mut room, &mut log, 1).await;

    assert_eq!(log.lines, ["other rejoined p2"]);
    assert_eq!(
        room.player("p2").unwrap().props().get("hp"),
        Some(&Value::from(5))
    );
}

// =========================================================================
// Properties
// =========================================================================

#[tokio::test]
async fn test_room_property_change_reports_only_differences() {
    let (mut room, mut server) = setup(&["alice"], "alice").await;
    let mut log = Log::default();

    let props = Dict::from([("map".into(), Value::from("forest"))]);
    server.event(room_prop(30, false, props.clone()));
    server.event(room_prop(30, false, props));
    pump(&mut room, &mut log, 2).await;

    assert_eq!(log.room_changes.len(), 1, "a no-op change is not reported");
    let change = &log.room_changes[0];
    assert_eq!(change.joinable, Some(false));
    assert_eq!(change.visible, None);
    assert_eq!(change.client_deadline, None);
    assert_eq!(change.public_props.len(), 1);
    assert!(!room.info().joinable);
    assert_eq!(room.info().public_props.get("map"), Some(&Value::from("forest")));
}

#[tokio::test]
async fn test_new_client_deadline_reaches_heartbeat() {
    let (mut room, mut server) = setup(&["alice"], "alice").await;
    let mut log = Log::default();

    // First heartbeat goes out right after the handshake.
    let ping = server.next_frame().await;
    assert!(parse_ping(&ping).is_ok());

    server.event(room_prop(1, true, Dict::new()));
    pump(&mut room, &mut log, 1).await;
    assert_eq!(log.room_changes[0].client_deadline, Some(1));

    let next = timeout(Duration::from_secs(1), server.next_frame()).await;
    assert!(next.is_ok(), "heartbeat follows the new deadline");
}

#[tokio::test]
async fn test_player_property_change() {
    let (mut room, mut server) = setup(&["alice", "p2"], "alice").await;
    let mut log = Log::default();

    let props = Dict::from([
        ("ready".into(), Value::Bool(true)),
        ("team".into(), Value::from("red")),
    ]);
    server.event(Event::ClientProp {
        client_id: "p2".into(),
        props: props.clone(),
    });
    server.event(Event::ClientProp {
        client_id: "p2".into(),
        props: Dict::from([("ready".into(), Value::Bool(true))]),
    });
    pump(&mut room, &mut log, 2).await;

    assert_eq!(log.lines, ["props p2"]);
    assert_eq!(log.player_changes, [props]);
}

#[tokio::test]
async fn test_change_my_property_waits_for_echo() {
    let (room, mut server) = setup(&["alice"], "alice").await;

    let props = Dict::from([("ready".into(), Value::Bool(true))]);
    assert_eq!(room.change_my_property(props.clone()).unwrap(), 1);
    assert!(room.me().unwrap().props().is_empty());

    let msg = server.next_msg().await;
    let (seq, payload) = parse_msg_frame(&msg, Registry::empty()).unwrap();
    assert_eq!(seq, 1);
    assert_eq!(payload, MsgPayload::ClientProp { props });
}

// =========================================================================
// RPC and error responses
// =========================================================================

#[tokio::test]
async fn test_rpc_round_trip() {
    let (mut room, mut server) = setup(&["alice", "p2"], "alice").await;
    let mut log = Log::default();

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let chat = room
        .register_rpc("chat", move |call| {
            let text = call.decode().unwrap();
            sink.lock().unwrap().push((call.sender_id().to_owned(), text));
        })
        .unwrap();
    assert!(matches!(
        room.register_rpc("chat", |_| {}),
        Err(RoomError::RpcAlreadyRegistered(_))
    ));

    room.rpc_to(chat, &["p2"], &Value::from("psst")).unwrap();
    let (_, payload) = parse_msg_frame(&server.next_msg().await, Registry::empty()).unwrap();
    match payload {
        MsgPayload::Targets {
            targets,
            rpc_id,
            args,
        } => {
            assert_eq!(targets, ["p2"]);
            assert_eq!(rpc_id, chat.id());
            assert_eq!(roomwire_codec::decode(&args).unwrap(), Value::from("psst"));
        }
        other => panic!("unexpected {other:?}"),
    }

    server.event(Event::Message {
        sender_id: "p2".into(),
        rpc_id: chat.id(),
        args: roomwire_codec::encode(&Value::from("hi")).unwrap(),
    });
    pump(&mut room, &mut log, 1).await;
    assert_eq!(
        received.lock().unwrap().as_slice(),
        &[("p2".to_owned(), Value::from("hi"))]
    );
}

#[tokio::test]
async fn test_error_response_reaches_handler_once() {
    let (mut room, mut server) = setup(&["alice", "p2"], "alice").await;
    let mut log = Log::default();
    let errors = Arc::new(Mutex::new(Vec::new()));

    let seq = room.switch_master("p2").unwrap();
    let sink = Arc::clone(&errors);
    room.on_request_error(seq, move |e| sink.lock().unwrap().push(e.clone()));
    let denied = server.next_msg().await;

    let ok_seq = room.kick("p2", "bye").unwrap();
    let sink = Arc::clone(&errors);
    room.on_request_error(ok_seq, move |e| sink.lock().unwrap().push(e.clone()));
    let kicked = server.next_msg().await;

    server.event(Event::PermissionDenied { msg: denied.clone() });
    server.event(Event::PermissionDenied { msg: denied });
    server.event(Event::Succeeded { msg_seq: ok_seq });
    server.event(Event::TargetNotFound {
        missing: vec!["p2".into()],
        msg: kicked,
    });
    pump(&mut room, &mut log, 4).await;

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].seq, seq);
    assert_eq!(errors[0].failure, RequestFailure::PermissionDenied);
    assert_eq!(
        errors[0].payload,
        MsgPayload::SwitchMaster {
            new_master: "p2".into()
        }
    );
    // Master-only requests never change local state.
    assert_eq!(room.master_id(), "alice");
    assert!(room.player("p2").is_some());
}

// =========================================================================
// Queue and lifecycle
// =========================================================================

#[tokio::test]
async fn test_pause_holds_events_until_restart() {
    let (mut room, mut server) = setup(&["alice"], "alice").await;
    let mut log = Log::default();

    room.pause();
    server.event(Event::Joined(ClientInfo::new("p2")));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(room.process_callbacks(&mut log), 0);
    assert!(room.player("p2").is_none());

    room.restart();
    pump(&mut room, &mut log, 1).await;
    assert_eq!(log.lines, ["other joined p2"]);
}

#[tokio::test]
async fn test_pong_updates_liveness() {
    let (mut room, mut server) = setup(&["alice"], "alice").await;
    let mut log = Log::default();

    let ts = parse_ping(&server.next_frame().await).unwrap();
    server.end.send(
        encode_event(
            0,
            &Event::Pong(Pong {
                ping_timestamp: ts,
                watchers: 4,
                last_msg_times: Dict::from([("alice".into(), Value::ULong(ts))]),
            }),
        )
        .unwrap(),
    );
    pump(&mut room, &mut log, 1).await;

    assert_eq!(room.watcher_count(), 4);
    assert!(room.rtt() < WAIT);
    assert_eq!(room.last_msg_times().get("alice"), Some(&Value::ULong(ts)));
    assert!(log.lines.is_empty());
}

#[tokio::test]
async fn test_server_close_is_the_final_notification() {
    let (mut room, mut server) = setup(&["alice"], "alice").await;
    let mut log = Log::default();
    let poke = room.register_rpc("poke", |_| {}).unwrap();

    room.leave("bye").unwrap();
    let (_, payload) = parse_msg_frame(&server.next_msg().await, Registry::empty()).unwrap();
    assert_eq!(
        payload,
        MsgPayload::Leave {
            message: "bye".into()
        }
    );
    server.end.close(1000, "left");
    pump(&mut room, &mut log, 1).await;

    assert!(room.is_closed());
    assert_eq!(log.lines.len(), 1);
    assert!(log.lines[0].starts_with("closed ByPeer"));
    assert!(matches!(
        room.rpc_to_master(poke, &Value::Null),
        Err(RoomError::Closed(_))
    ));
    assert_eq!(room.process_callbacks(&mut log), 0);
}

#[tokio::test]
async fn test_sequence_gap_closes_with_error() {
    let (mut room, mut server) = setup(&["alice"], "alice").await;
    let mut log = Log::default();

    server.seq = 5;
    server.event(Event::Joined(ClientInfo::new("p2")));
    pump(&mut room, &mut log, 1).await;

    assert!(room.is_closed());
    assert_eq!(log.lines.len(), 1);
    assert!(log.lines[0].starts_with("error event sequence gap"));
    assert!(room.player("p2").is_none());
}

#[tokio::test]
async fn test_full_message_pool_closes_with_error() {
    let config = SessionConfig {
        pool_capacity: 2,
        ..SessionConfig::default()
    };
    // No ready: nothing leaves the pool.
    let (mut room, _server) = connect(&["alice"], "alice", config).await;
    let mut log = Log::default();

    room.change_my_property(Dict::new()).unwrap();
    room.change_my_property(Dict::new()).unwrap();
    assert!(matches!(
        room.change_my_property(Dict::new()),
        Err(RoomError::Protocol(ProtocolError::PoolFull { seq: 3, capacity: 2 }))
    ));

    pump(&mut room, &mut log, 1).await;
    assert!(room.is_closed());
    assert_eq!(log.lines.len(), 1);
    assert!(log.lines[0].starts_with("error message pool full"), "{:?}", log.lines);
    assert!(matches!(
        room.change_my_property(Dict::new()),
        Err(RoomError::Closed(_))
    ));
    assert_eq!(room.process_callbacks(&mut log), 0);
}

#[tokio::test]
async fn test_force_disconnect() {
    let (mut room, _server) = setup(&["alice"], "alice").await;
    let mut log = Log::default();

    room.force_disconnect();
    pump(&mut room, &mut log, 1).await;
    assert_eq!(log.lines, [format!("closed {:?}", CloseReason::Shutdown)]);
}
