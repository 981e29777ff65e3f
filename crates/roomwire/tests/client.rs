//! End-to-end tests for the client: a scripted lobby plus the in-memory room
//! transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use roomwire::codec::{decode, encode};
use roomwire::prelude::*;
use roomwire::protocol::{
    CreateRoomReq, Event, JoinedRoom, LobbyResponse, LobbyResponseType, MsgPayload, MsgSigner,
    REGULAR_TYPE_START, encode_event, parse_msg_frame, validate_auth_data,
};
use roomwire::session::{HEADER_APP_ID, HEADER_AUTHORIZATION, HEADER_USER_ID};
use roomwire::transport::mock::{self, MockDialer, MockListener, ServerEnd};
use tokio::time::timeout;

const APP_KEY: &str = "app-secret";
const ROOM_KEY: &str = "room-key";
const WAIT: Duration = Duration::from_secs(2);

// =========================================================================
// Scripted lobby
// =========================================================================

#[derive(Clone, Default)]
struct MockLobby {
    requests: Arc<Mutex<Vec<LobbyRequest>>>,
    replies: Arc<Mutex<VecDeque<Result<LobbyReply, LobbyError>>>>,
}

impl MockLobby {
    fn reply(&self, response: &LobbyResponse) {
        let body = encode(&response.to_value()).unwrap();
        self.replies.lock().unwrap().push_back(Ok(LobbyReply::ok(body)));
    }

    fn reply_raw(&self, reply: Result<LobbyReply, LobbyError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn last_request(&self) -> LobbyRequest {
        self.requests.lock().unwrap().last().cloned().expect("a request")
    }

    fn last_body(&self) -> Value {
        decode(&self.last_request().body).unwrap()
    }
}

impl LobbyTransport for MockLobby {
    async fn post(&self, request: LobbyRequest) -> Result<LobbyReply, LobbyError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LobbyError::Request("no reply scripted".into())))
    }
}

// =========================================================================
// Helpers
// =========================================================================

#[derive(Default)]
struct Log {
    lines: Vec<String>,
}

impl EventReceiver for Log {
    fn on_other_player_joined(&mut self, _room: &Room, player: &Player) {
        self.lines.push(format!("joined {}", player.id()));
    }

    fn on_player_left(&mut self, _room: &Room, player: &Player) {
        self.lines.push(format!("left {}", player.id()));
    }

    fn on_master_switched(&mut self, _room: &Room, previous: &str, master: &Player) {
        self.lines.push(format!("master {previous}->{}", master.id()));
    }
}

fn setup() -> (Client<MockLobby, MockDialer>, MockLobby, MockListener) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("roomwire=debug,roomwire_room=debug")
        .with_test_writer()
        .try_init();

    let lobby = MockLobby::default();
    let (dialer, listener) = mock::pair();
    let config = ClientConfig::new("app", "alice", APP_KEY, "http://lobby.test/");
    let client = Client::with_dialer(config, lobby.clone(), dialer);
    (client, lobby, listener)
}

fn room_info(id: &str) -> RoomInfo {
    RoomInfo {
        id: id.into(),
        number: 12,
        visible: true,
        joinable: true,
        watchable: true,
        max_players: 4,
        client_deadline: 30,
        ..RoomInfo::default()
    }
}

fn joined(players: &[&str], master: &str) -> JoinedRoom {
    JoinedRoom {
        room: room_info("room-1"),
        players: players.iter().map(|id| ClientInfo::new(*id)).collect(),
        master_id: master.into(),
        url: "mock://room-1".into(),
        auth_key: ROOM_KEY.into(),
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

async fn accept(listener: &mut MockListener) -> ServerEnd {
    let end = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    end.send(encode_event(0, &Event::PeerReady { last_msg_seq: 0 }).unwrap());
    end
}

async fn pump(room: &mut Room, log: &mut Log, expected: usize) {
    let deadline = Instant::now() + WAIT;
    let mut handled = 0;
    while handled < expected {
        handled += room.process_callbacks(log);
        assert!(Instant::now() < deadline, "only {handled} of {expected} events arrived");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// =========================================================================
// Create → play → leave
// =========================================================================

#[tokio::test]
async fn test_create_join_leave_without_master_switch() {
    let (client, lobby, mut listener) = setup();
    lobby.reply(&LobbyResponse::ok_joined(joined(&["alice"], "alice")));

    let option = RoomOption::new().max_players(4).public_prop("mode", "duel");
    let mut props = Dict::new();
    props.insert("level".into(), Value::from(3));
    let mut room = client.create(option.clone(), props.clone()).await.unwrap();

    let request = lobby.last_request();
    assert_eq!(request.url, "http://lobby.test/rooms");
    let sent = CreateRoomReq::from_value(&lobby.last_body()).unwrap();
    assert_eq!(sent.option, option);
    assert_eq!(sent.client.id, "alice");
    assert_eq!(sent.client.props, props);

    assert_eq!(room.id(), "room-1");
    assert!(room.is_master());

    let mut end = accept(&mut listener).await;
    end.send(encode_event(1, &Event::Joined(ClientInfo::new("bob"))).unwrap());
    end.send(
        encode_event(
            2,
            &Event::Left {
                client_id: "bob".into(),
                master_id: "alice".into(),
            },
        )
        .unwrap(),
    );

    let mut log = Log::default();
    pump(&mut room, &mut log, 2).await;
    assert_eq!(log.lines, ["joined bob", "left bob"]);
    assert_eq!(room.master_id(), "alice");
    assert_eq!(room.players().len(), 1);

    room.leave("bye").unwrap();
    let signer = MsgSigner::new(ROOM_KEY.as_bytes()).unwrap();
    loop {
        let frame = timeout(WAIT, end.recv()).await.unwrap().unwrap();
        let unsigned = signer.verify(&frame).unwrap();
        if unsigned[0] < REGULAR_TYPE_START {
            continue;
        }
        let (seq, payload) = parse_msg_frame(unsigned, &Registry::new()).unwrap();
        assert_eq!(seq, 1);
        assert!(matches!(payload, MsgPayload::Leave { message } if message == "bye"));
        break;
    }
}

#[tokio::test]
async fn test_lobby_headers_carry_valid_auth() {
    let (client, lobby, mut listener) = setup();
    lobby.reply(&LobbyResponse::ok_joined(joined(&["bob", "alice"], "bob")));

    let _room = client.join("room-1", Dict::new()).await.unwrap();

    let request = lobby.last_request();
    assert_eq!(request.url, "http://lobby.test/rooms/join/id/room-1");
    assert_eq!(request.header_value(HEADER_APP_ID), Some("app"));
    assert_eq!(request.header_value(HEADER_USER_ID), Some("alice"));
    let auth = request.header_value(HEADER_AUTHORIZATION).unwrap();
    assert!(auth.starts_with("Bearer "));
    validate_auth_data(APP_KEY.as_bytes(), "alice", auth, now_secs(), 60).unwrap();
    assert!(validate_auth_data(b"other-key", "alice", auth, now_secs(), 60).is_err());

    // The room socket is dialed with the same identity.
    let end = accept(&mut listener).await;
    assert_eq!(end.request().header_value(HEADER_APP_ID), Some("app"));
    assert_eq!(end.request().header_value(HEADER_USER_ID), Some("alice"));
}

#[tokio::test]
async fn test_join_paths() {
    let (client, lobby, _listener) = setup();
    for _ in 0..4 {
        lobby.reply(&LobbyResponse::ok_joined(joined(&["bob", "alice"], "bob")));
    }

    client.join_by_number(12, Dict::new()).await.unwrap();
    assert_eq!(lobby.last_request().url, "http://lobby.test/rooms/join/number/12");

    client.watch("room-1", Dict::new()).await.unwrap();
    assert_eq!(lobby.last_request().url, "http://lobby.test/rooms/watch/id/room-1");

    client.watch_by_number(12, Dict::new()).await.unwrap();
    assert_eq!(lobby.last_request().url, "http://lobby.test/rooms/watch/number/12");

    let query = Query::new().equal("mode", "duel");
    client
        .random_join(3, Some(query), Dict::new())
        .await
        .unwrap();
    assert_eq!(lobby.last_request().url, "http://lobby.test/rooms/join/random/3");
    let body = lobby.last_body();
    let sent = body.as_dict().unwrap();
    assert!(!sent["query"].is_null());
    assert_eq!(sent["client"].as_dict().unwrap()["id"], Value::from("alice"));
}

// =========================================================================
// Failures
// =========================================================================

#[tokio::test]
async fn test_lobby_failures_are_typed_and_never_dial() {
    let (client, lobby, mut listener) = setup();
    lobby.reply(&LobbyResponse::failed(LobbyResponseType::NoRoomFound, "room-9"));
    lobby.reply(&LobbyResponse::failed(LobbyResponseType::RoomFull, "room-1"));
    lobby.reply(&LobbyResponse::failed(LobbyResponseType::RoomLimit, "quota"));

    let err = client.join("room-9", Dict::new()).await.unwrap_err();
    assert!(matches!(err.as_lobby(), Some(LobbyError::NoRoomFound(m)) if m == "room-9"));

    let err = client.join("room-1", Dict::new()).await.unwrap_err();
    assert!(matches!(err.as_lobby(), Some(LobbyError::RoomFull(_))));

    let err = client
        .create(RoomOption::new(), Dict::new())
        .await
        .unwrap_err();
    assert!(matches!(err.as_lobby(), Some(LobbyError::RoomLimit(m)) if m == "quota"));

    assert!(
        timeout(Duration::from_millis(50), listener.accept())
            .await
            .is_err(),
        "nothing should be dialed"
    );
}

#[tokio::test]
async fn test_non_200_is_an_http_error() {
    let (client, lobby, _listener) = setup();
    lobby.reply_raw(Ok(LobbyReply {
        status: 401,
        body: b"bad auth".to_vec(),
    }));

    let err = client.join("room-1", Dict::new()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Lobby(LobbyError::Http { status: 401, ref message }) if message == "bad auth"
    ));
}

#[tokio::test]
async fn test_transport_failure_propagates() {
    let (client, lobby, _listener) = setup();
    lobby.reply_raw(Err(LobbyError::Request("connection refused".into())));

    let err = client.search(&search_all()).await.unwrap_err();
    assert!(matches!(err, Error::Lobby(LobbyError::Request(_))));
}

#[tokio::test]
async fn test_ok_without_joined_room_is_invalid() {
    let (client, lobby, _listener) = setup();
    lobby.reply(&LobbyResponse::ok_rooms(Vec::new()));

    let err = client.join("room-1", Dict::new()).await.unwrap_err();
    assert!(matches!(err, Error::Lobby(LobbyError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_garbage_body_is_a_codec_error() {
    let (client, lobby, _listener) = setup();
    lobby.reply_raw(Ok(LobbyReply::ok(vec![0xff, 0xff])));

    let err = client.search(&search_all()).await.unwrap_err();
    assert!(matches!(err, Error::Codec(_) | Error::Protocol(_)));
}

// =========================================================================
// Search
// =========================================================================

fn search_all() -> SearchReq {
    SearchReq {
        search_group: 1,
        limit: 10,
        check_joinable: true,
        check_watchable: false,
        query: None,
    }
}

#[tokio::test]
async fn test_search_returns_rooms() {
    let (client, lobby, _listener) = setup();
    lobby.reply(&LobbyResponse::ok_rooms(vec![room_info("a"), room_info("b")]));

    let rooms = client.search(&search_all()).await.unwrap();
    let ids: Vec<_> = rooms.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["a", "b"]);

    assert_eq!(lobby.last_request().url, "http://lobby.test/rooms/search");
    let body = lobby.last_body();
    let sent = body.as_dict().unwrap();
    assert_eq!(sent["search_group"].as_u64(), Some(1));
    assert_eq!(sent["limit"].as_u64(), Some(10));
    assert_eq!(sent["check_joinable"], Value::Bool(true));
    assert!(sent["query"].is_null());
}

#[tokio::test]
async fn test_search_by_ids_and_numbers() {
    let (client, lobby, _listener) = setup();
    lobby.reply(&LobbyResponse::ok_rooms(vec![room_info("a")]));
    lobby.reply(&LobbyResponse::ok_rooms(Vec::new()));

    let rooms = client
        .search_by_ids(&SearchByIdsReq {
            ids: vec!["a".into(), "missing".into()],
            query: None,
        })
        .await
        .unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(lobby.last_request().url, "http://lobby.test/rooms/search/ids");
    let body = lobby.last_body();
    assert_eq!(body.as_dict().unwrap()["ids"].as_list().unwrap().len(), 2);

    let rooms = client
        .search_by_numbers(&SearchByNumbersReq {
            numbers: vec![12, 13],
            query: Some(Query::new().greater_than("level", 2)),
        })
        .await
        .unwrap();
    assert!(rooms.is_empty());
    assert_eq!(lobby.last_request().url, "http://lobby.test/rooms/search/numbers");
    let body = lobby.last_body();
    let sent = body.as_dict().unwrap();
    assert_eq!(sent["numbers"], Value::UInts(vec![12, 13]));
    assert!(!sent["query"].is_null());
}
