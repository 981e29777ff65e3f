//! Outgoing messages (client → room server).
//!
//! Frame layout:
//!
//! ```text
//! [type:1][seq:3, regular types only][body][HMAC-SHA256:32]
//! ```
//!
//! The body is a sequence of codec values. RPC messages end with the raw,
//! already-encoded RPC arguments so the server can forward them untouched.

use hmac::{Hmac, Mac};
use roomwire_codec::{Dict, Reader, Registry, Value, Writer};
use sha2::Sha256;

use crate::ProtocolError;

type HmacSha256 = Hmac<Sha256>;

/// Message and event types at or above this value are "regular": they
/// carry a sequence number and are delivered exactly once, in order.
pub const REGULAR_TYPE_START: u8 = 30;

/// Size of an HMAC-SHA256 signature.
pub const SIGNATURE_LEN: usize = 32;

/// Largest sequence number that fits in the 3-byte header field.
pub const MAX_MSG_SEQ: u32 = 0x00FF_FFFF;

/// Message type tags.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    Ping = 1,
    Leave = 30,
    RoomProp = 31,
    ClientProp = 32,
    SwitchMaster = 33,
    Targets = 34,
    ToMaster = 35,
    Broadcast = 36,
    Kick = 37,
}

impl MsgType {
    pub fn is_regular(self) -> bool {
        self as u8 >= REGULAR_TYPE_START
    }
}

impl TryFrom<u8> for MsgType {
    type Error = ProtocolError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            1 => Self::Ping,
            30 => Self::Leave,
            31 => Self::RoomProp,
            32 => Self::ClientProp,
            33 => Self::SwitchMaster,
            34 => Self::Targets,
            35 => Self::ToMaster,
            36 => Self::Broadcast,
            37 => Self::Kick,
            other => return Err(ProtocolError::UnknownMsgType(other)),
        })
    }
}

/// Room-wide settings plus a partial property diff. Shared by the
/// `RoomProp` message and the `RoomProp` event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoomPropPayload {
    pub visible: bool,
    pub joinable: bool,
    pub watchable: bool,
    pub search_group: u32,
    pub max_players: u32,
    /// Seconds of silence after which the server drops a client.
    pub client_deadline: u32,
    pub public_props: Dict,
    pub private_props: Dict,
}

impl RoomPropPayload {
    pub(crate) fn write(&self, w: &mut Writer<'_>) -> Result<(), ProtocolError> {
        w.write_bool(self.visible);
        w.write_bool(self.joinable);
        w.write_bool(self.watchable);
        w.write_uint(self.search_group);
        w.write_uint(self.max_players);
        w.write_uint(self.client_deadline);
        w.write_dict(&self.public_props)?;
        w.write_dict(&self.private_props)?;
        Ok(())
    }

    pub(crate) fn read(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            visible: r.read_bool()?,
            joinable: r.read_bool()?,
            watchable: r.read_bool()?,
            search_group: r.read_uint()?,
            max_players: r.read_uint()?,
            client_deadline: r.read_uint()?,
            public_props: r.read_dict()?,
            private_props: r.read_dict()?,
        })
    }
}

/// The typed body of a regular message.
///
/// The room keeps no copy of what it sent; when the server rejects a
/// request it echoes the frame back and the payload is reconstructed from
/// it with [`parse_msg_frame`].
#[derive(Debug, Clone, PartialEq)]
pub enum MsgPayload {
    Leave { message: String },
    RoomProp(RoomPropPayload),
    ClientProp { props: Dict },
    SwitchMaster { new_master: String },
    Targets {
        targets: Vec<String>,
        rpc_id: u8,
        args: Vec<u8>,
    },
    ToMaster { rpc_id: u8, args: Vec<u8> },
    Broadcast { rpc_id: u8, args: Vec<u8> },
    Kick { target: String, message: String },
}

impl MsgPayload {
    pub fn msg_type(&self) -> MsgType {
        match self {
            Self::Leave { .. } => MsgType::Leave,
            Self::RoomProp(_) => MsgType::RoomProp,
            Self::ClientProp { .. } => MsgType::ClientProp,
            Self::SwitchMaster { .. } => MsgType::SwitchMaster,
            Self::Targets { .. } => MsgType::Targets,
            Self::ToMaster { .. } => MsgType::ToMaster,
            Self::Broadcast { .. } => MsgType::Broadcast,
            Self::Kick { .. } => MsgType::Kick,
        }
    }

    pub(crate) fn write_body(&self, w: &mut Writer<'_>) -> Result<(), ProtocolError> {
        match self {
            Self::Leave { message } => w.write_str(message)?,
            Self::RoomProp(p) => p.write(w)?,
            Self::ClientProp { props } => w.write_dict(props)?,
            Self::SwitchMaster { new_master } => w.write_str(new_master)?,
            Self::Targets {
                targets,
                rpc_id,
                args,
            } => {
                let list: Vec<Value> = targets.iter().map(|t| Value::from(t.as_str())).collect();
                w.write_list(&list)?;
                w.write_byte(*rpc_id);
                w.write_raw(args);
            }
            Self::ToMaster { rpc_id, args } | Self::Broadcast { rpc_id, args } => {
                w.write_byte(*rpc_id);
                w.write_raw(args);
            }
            Self::Kick { target, message } => {
                w.write_str(target)?;
                w.write_str(message)?;
            }
        }
        Ok(())
    }

    pub(crate) fn read_body(ty: MsgType, r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(match ty {
            MsgType::Ping => {
                return Err(ProtocolError::InvalidMessage(
                    "ping has no regular payload".into(),
                ));
            }
            MsgType::Leave => Self::Leave {
                message: r.read_str()?,
            },
            MsgType::RoomProp => Self::RoomProp(RoomPropPayload::read(r)?),
            MsgType::ClientProp => Self::ClientProp {
                props: r.read_dict()?,
            },
            MsgType::SwitchMaster => Self::SwitchMaster {
                new_master: r.read_str()?,
            },
            MsgType::Targets => {
                let targets = r
                    .read_list()?
                    .into_iter()
                    .map(|v| match v {
                        Value::Str(s) => Ok(s),
                        _ => Err(ProtocolError::InvalidMessage(
                            "rpc target is not a string".into(),
                        )),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let rpc_id = r.read_byte()?;
                Self::Targets {
                    targets,
                    rpc_id,
                    args: r.rest().to_vec(),
                }
            }
            MsgType::ToMaster => Self::ToMaster {
                rpc_id: r.read_byte()?,
                args: r.rest().to_vec(),
            },
            MsgType::Broadcast => Self::Broadcast {
                rpc_id: r.read_byte()?,
                args: r.rest().to_vec(),
            },
            MsgType::Kick => Self::Kick {
                target: r.read_str()?,
                message: r.read_str()?,
            },
        })
    }
}

/// Writes the unsigned part of a regular message frame.
pub(crate) fn build_msg_frame(
    seq: u32,
    payload: &MsgPayload,
    registry: &Registry,
) -> Result<Vec<u8>, ProtocolError> {
    if seq > MAX_MSG_SEQ {
        return Err(ProtocolError::SeqOverflow);
    }
    let [_, a, b, c] = seq.to_be_bytes();
    let header = vec![payload.msg_type() as u8, a, b, c];
    let mut w = Writer::from_vec(registry, header);
    payload.write_body(&mut w)?;
    Ok(w.into_bytes())
}

/// Parses an unsigned regular message frame back into its seq and payload.
pub fn parse_msg_frame(
    frame: &[u8],
    registry: &Registry,
) -> Result<(u32, MsgPayload), ProtocolError> {
    let Some(&ty) = frame.first() else {
        return Err(ProtocolError::FrameTooShort { len: 0 });
    };
    let ty = MsgType::try_from(ty)?;
    if !ty.is_regular() {
        return Err(ProtocolError::InvalidMessage(format!(
            "{ty:?} is not a regular message"
        )));
    }
    if frame.len() < 4 {
        return Err(ProtocolError::FrameTooShort { len: frame.len() });
    }
    let seq = u32::from_be_bytes([0, frame[1], frame[2], frame[3]]);
    let mut r = Reader::new(&frame[4..], registry);
    let payload = MsgPayload::read_body(ty, &mut r)?;
    Ok((seq, payload))
}

/// Signs frames with the per-session key handed out by the lobby.
#[derive(Clone)]
pub struct MsgSigner {
    mac: HmacSha256,
}

impl MsgSigner {
    pub fn new(key: &[u8]) -> Result<Self, ProtocolError> {
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| ProtocolError::InvalidAuthData(e.to_string()))?;
        Ok(Self { mac })
    }

    /// Appends the signature of `frame` to it.
    pub fn sign(&self, frame: &mut Vec<u8>) {
        let mut mac = self.mac.clone();
        mac.update(frame);
        frame.extend_from_slice(&mac.finalize().into_bytes());
    }

    /// Checks the trailing signature and returns the unsigned frame.
    pub fn verify<'a>(&self, frame: &'a [u8]) -> Result<&'a [u8], ProtocolError> {
        if frame.len() < SIGNATURE_LEN + 1 {
            return Err(ProtocolError::FrameTooShort { len: frame.len() });
        }
        let (data, sig) = frame.split_at(frame.len() - SIGNATURE_LEN);
        let mut mac = self.mac.clone();
        mac.update(data);
        mac.verify_slice(sig)
            .map_err(|_| ProtocolError::InvalidSignature)?;
        Ok(data)
    }

    /// Builds a signed, unsequenced heartbeat carrying the sender's clock.
    pub fn ping(&self, timestamp_ms: u64) -> Vec<u8> {
        let mut w = Writer::from_vec(Registry::empty(), vec![MsgType::Ping as u8]);
        w.write_ulong(timestamp_ms);
        let mut frame = w.into_bytes();
        self.sign(&mut frame);
        frame
    }
}

impl std::fmt::Debug for MsgSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MsgSigner(..)")
    }
}

/// Reads the timestamp out of an unsigned ping frame.
pub fn parse_ping(frame: &[u8]) -> Result<u64, ProtocolError> {
    match frame.split_first() {
        Some((&ty, body)) if ty == MsgType::Ping as u8 => {
            Ok(Reader::new(body, Registry::empty()).read_ulong()?)
        }
        Some((&ty, _)) => Err(ProtocolError::InvalidMessage(format!(
            "expected ping, got message type {ty}"
        ))),
        None => Err(ProtocolError::FrameTooShort { len: 0 }),
    }
}
