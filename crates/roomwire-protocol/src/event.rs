//! Incoming events (room server → client).
//!
//! Frame layout:
//!
//! ```text
//! [type:1][seq:4 BE, regular types only][body]
//! ```
//!
//! Events are not signed; the socket itself is authenticated at connect time.

use roomwire_codec::{Dict, Reader, Registry, Value, Writer};

use crate::msg::{REGULAR_TYPE_START, RoomPropPayload};
use crate::types::ClientInfo;
use crate::ProtocolError;

/// Event type tags.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    PeerReady = 1,
    Pong = 2,
    Joined = 30,
    Rejoined = 31,
    Left = 32,
    RoomProp = 33,
    ClientProp = 34,
    MasterSwitched = 35,
    Message = 36,
    Succeeded = 37,
    PermissionDenied = 38,
    TargetNotFound = 39,
}

impl EventType {
    pub fn is_regular(self) -> bool {
        self as u8 >= REGULAR_TYPE_START
    }
}

impl TryFrom<u8> for EventType {
    type Error = ProtocolError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            1 => Self::PeerReady,
            2 => Self::Pong,
            30 => Self::Joined,
            31 => Self::Rejoined,
            32 => Self::Left,
            33 => Self::RoomProp,
            34 => Self::ClientProp,
            35 => Self::MasterSwitched,
            36 => Self::Message,
            37 => Self::Succeeded,
            38 => Self::PermissionDenied,
            39 => Self::TargetNotFound,
            other => return Err(ProtocolError::UnknownEventType(other)),
        })
    }
}

/// Heartbeat reply.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pong {
    /// The timestamp the client put in its ping, echoed back.
    pub ping_timestamp: u64,
    pub watchers: u32,
    /// Unix milliseconds of the last message the server received from each
    /// player.
    pub last_msg_times: Dict,
}

/// A decoded event body.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Handshake: the server is ready and has received messages up to
    /// `last_msg_seq`.
    PeerReady { last_msg_seq: u32 },
    Pong(Pong),
    Joined(ClientInfo),
    Rejoined(ClientInfo),
    Left { client_id: String, master_id: String },
    RoomProp(RoomPropPayload),
    ClientProp { client_id: String, props: Dict },
    MasterSwitched { master_id: String },
    /// An RPC call. `args` stays encoded until the registered handler reads it.
    Message {
        sender_id: String,
        rpc_id: u8,
        args: Vec<u8>,
    },
    Succeeded { msg_seq: u32 },
    /// `msg` is the rejected message frame, without its signature.
    PermissionDenied { msg: Vec<u8> },
    TargetNotFound { missing: Vec<String>, msg: Vec<u8> },
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::PeerReady { .. } => EventType::PeerReady,
            Self::Pong(_) => EventType::Pong,
            Self::Joined(_) => EventType::Joined,
            Self::Rejoined(_) => EventType::Rejoined,
            Self::Left { .. } => EventType::Left,
            Self::RoomProp(_) => EventType::RoomProp,
            Self::ClientProp { .. } => EventType::ClientProp,
            Self::MasterSwitched { .. } => EventType::MasterSwitched,
            Self::Message { .. } => EventType::Message,
            Self::Succeeded { .. } => EventType::Succeeded,
            Self::PermissionDenied { .. } => EventType::PermissionDenied,
            Self::TargetNotFound { .. } => EventType::TargetNotFound,
        }
    }

    fn write_body(&self, w: &mut Writer<'_>) -> Result<(), ProtocolError> {
        match self {
            Self::PeerReady { last_msg_seq } => w.write_uint(*last_msg_seq),
            Self::Pong(p) => {
                w.write_ulong(p.ping_timestamp);
                w.write_uint(p.watchers);
                w.write_dict(&p.last_msg_times)?;
            }
            Self::Joined(c) | Self::Rejoined(c) => {
                w.write_str(&c.id)?;
                w.write_dict(&c.props)?;
            }
            Self::Left {
                client_id,
                master_id,
            } => {
                w.write_str(client_id)?;
                w.write_str(master_id)?;
            }
            Self::RoomProp(p) => p.write(w)?,
            Self::ClientProp { client_id, props } => {
                w.write_str(client_id)?;
                w.write_dict(props)?;
            }
            Self::MasterSwitched { master_id } => w.write_str(master_id)?,
            Self::Message {
                sender_id,
                rpc_id,
                args,
            } => {
                w.write_str(sender_id)?;
                w.write_byte(*rpc_id);
                w.write_raw(args);
            }
            Self::Succeeded { msg_seq } => w.write_uint(*msg_seq),
            Self::PermissionDenied { msg } => w.write_bytes(msg)?,
            Self::TargetNotFound { missing, msg } => {
                let list: Vec<Value> = missing.iter().map(|m| Value::from(m.as_str())).collect();
                w.write_list(&list)?;
                w.write_bytes(msg)?;
            }
        }
        Ok(())
    }

    fn read_body(ty: EventType, r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(match ty {
            EventType::PeerReady => Self::PeerReady {
                last_msg_seq: r.read_uint()?,
            },
            EventType::Pong => Self::Pong(Pong {
                ping_timestamp: r.read_ulong()?,
                watchers: r.read_uint()?,
                last_msg_times: r.read_dict()?,
            }),
            EventType::Joined => Self::Joined(read_client(r)?),
            EventType::Rejoined => Self::Rejoined(read_client(r)?),
            EventType::Left => Self::Left {
                client_id: r.read_str()?,
                master_id: r.read_str()?,
            },
            EventType::RoomProp => Self::RoomProp(RoomPropPayload::read(r)?),
            EventType::ClientProp => Self::ClientProp {
                client_id: r.read_str()?,
                props: r.read_dict()?,
            },
            EventType::MasterSwitched => Self::MasterSwitched {
                master_id: r.read_str()?,
            },
            EventType::Message => Self::Message {
                sender_id: r.read_str()?,
                rpc_id: r.read_byte()?,
                args: r.rest().to_vec(),
            },
            EventType::Succeeded => Self::Succeeded {
                msg_seq: r.read_uint()?,
            },
            EventType::PermissionDenied => Self::PermissionDenied {
                msg: r.read_bytes()?,
            },
            EventType::TargetNotFound => {
                let missing = r
                    .read_list()?
                    .into_iter()
                    .map(|v| match v {
                        Value::Str(s) => Ok(s),
                        _ => Err(ProtocolError::InvalidMessage(
                            "missing target is not a string".into(),
                        )),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Self::TargetNotFound {
                    missing,
                    msg: r.read_bytes()?,
                }
            }
        })
    }
}

fn read_client(r: &mut Reader<'_>) -> Result<ClientInfo, ProtocolError> {
    Ok(ClientInfo {
        id: r.read_str()?,
        props: r.read_dict()?,
    })
}

/// An event plus its sequence number (regular events only).
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    pub seq: Option<u32>,
    pub event: Event,
}

/// Decodes an incoming frame.
pub fn decode_event(frame: &[u8], registry: &Registry) -> Result<EventFrame, ProtocolError> {
    let Some((&ty, rest)) = frame.split_first() else {
        return Err(ProtocolError::FrameTooShort { len: 0 });
    };
    let ty = EventType::try_from(ty)?;
    let (seq, body) = if ty.is_regular() {
        if rest.len() < 4 {
            return Err(ProtocolError::FrameTooShort { len: frame.len() });
        }
        let (seq, body) = rest.split_at(4);
        (
            Some(u32::from_be_bytes([seq[0], seq[1], seq[2], seq[3]])),
            body,
        )
    } else {
        (None, rest)
    };
    let mut r = Reader::new(body, registry);
    let event = Event::read_body(ty, &mut r)?;
    Ok(EventFrame { seq, event })
}

/// Encodes an event the way the room server does. `seq` is ignored for
/// non-regular events.
pub fn encode_event(seq: u32, event: &Event) -> Result<Vec<u8>, ProtocolError> {
    let ty = event.event_type();
    let mut header = vec![ty as u8];
    if ty.is_regular() {
        header.extend_from_slice(&seq.to_be_bytes());
    }
    let mut w = Writer::from_vec(Registry::empty(), header);
    event.write_body(&mut w)?;
    Ok(w.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(frame: &[u8]) -> EventFrame {
        decode_event(frame, Registry::empty()).unwrap()
    }

    #[test]
    fn test_peer_ready_is_unsequenced() {
        let frame = encode_event(99, &Event::PeerReady { last_msg_seq: 7 }).unwrap();
        assert_eq!(frame[0], 1);
        assert_eq!(frame.len(), 1 + 5, "no seq field, then a tagged uint");
        assert_eq!(
            decode(&frame),
            EventFrame {
                seq: None,
                event: Event::PeerReady { last_msg_seq: 7 },
            }
        );
    }

    #[test]
    fn test_regular_event_carries_four_byte_seq() {
        let event = Event::MasterSwitched {
            master_id: "p1".into(),
        };
        let frame = encode_event(0x0102_0304, &event).unwrap();
        assert_eq!(&frame[..5], &[35, 1, 2, 3, 4]);
        let decoded = decode(&frame);
        assert_eq!(decoded.seq, Some(0x0102_0304));
        assert_eq!(decoded.event, event);
    }

    #[test]
    fn test_message_keeps_args_encoded() {
        let args = roomwire_codec::encode(&Value::from("hello")).unwrap();
        let frame = encode_event(
            3,
            &Event::Message {
                sender_id: "p2".into(),
                rpc_id: 9,
                args: args.clone(),
            },
        )
        .unwrap();
        match decode(&frame).event {
            Event::Message {
                sender_id,
                rpc_id,
                args: got,
            } => {
                assert_eq!(sender_id, "p2");
                assert_eq!(rpc_id, 9);
                assert_eq!(got, args);
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn test_bodies_decode_back() {
        let mut props = Dict::new();
        props.insert("team".into(), Value::from("red"));
        let mut times = Dict::new();
        times.insert("p1".into(), Value::ULong(1_000));
        let events = vec![
            Event::Pong(Pong {
                ping_timestamp: 42,
                watchers: 3,
                last_msg_times: times,
            }),
            Event::Joined(ClientInfo {
                id: "p2".into(),
                props: props.clone(),
            }),
            Event::Left {
                client_id: "p2".into(),
                master_id: "p1".into(),
            },
            Event::ClientProp {
                client_id: "p1".into(),
                props,
            },
            Event::Succeeded { msg_seq: 12 },
            Event::PermissionDenied {
                msg: vec![33, 0, 0, 1, 14, 0],
            },
            Event::TargetNotFound {
                missing: vec!["x".into()],
                msg: vec![34, 0, 0, 2],
            },
        ];
        for event in events {
            let frame = encode_event(5, &event).unwrap();
            assert_eq!(decode(&frame).event, event);
        }
    }

    #[test]
    fn test_truncated_and_unknown_frames() {
        assert!(matches!(
            decode_event(&[], Registry::empty()),
            Err(ProtocolError::FrameTooShort { len: 0 })
        ));
        assert!(matches!(
            decode_event(&[30, 0, 0], Registry::empty()),
            Err(ProtocolError::FrameTooShort { len: 3 })
        ));
        assert!(matches!(
            decode_event(&[200], Registry::empty()),
            Err(ProtocolError::UnknownEventType(200))
        ));
    }
}
