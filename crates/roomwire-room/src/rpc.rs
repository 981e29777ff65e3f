//! RPC registry.
//!
//! Each registered handler gets a one-byte id in registration order. Every
//! client of a room must register the same RPCs in the same order so the
//! ids agree.

use roomwire_codec::{CodecError, Reader, Registry, Value};

use crate::RoomError;

/// Highest number of RPCs a room can register.
pub const MAX_RPCS: usize = 256;

/// Token returned by `Room::register_rpc`, used to call the RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RpcHandle(u8);

impl RpcHandle {
    /// The id sent on the wire.
    pub fn id(self) -> u8 {
        self.0
    }
}

/// An incoming RPC call. Arguments stay encoded until the handler asks for
/// them.
#[derive(Debug, Clone, Copy)]
pub struct RpcCall<'a> {
    sender_id: &'a str,
    args: &'a [u8],
    registry: &'a Registry,
}

impl<'a> RpcCall<'a> {
    pub fn sender_id(&self) -> &'a str {
        self.sender_id
    }

    pub fn raw_args(&self) -> &'a [u8] {
        self.args
    }

    /// A reader over the arguments, for handlers that decode field by field.
    pub fn reader(&self) -> Reader<'a> {
        Reader::new(self.args, self.registry)
    }

    /// Decodes the arguments as one value. An empty payload is `Null`.
    pub fn decode(&self) -> Result<Value, CodecError> {
        if self.args.is_empty() {
            return Ok(Value::Null);
        }
        self.reader().read_value()
    }
}

pub(crate) type RpcHandler = Box<dyn FnMut(RpcCall<'_>) + Send>;

#[derive(Default)]
pub(crate) struct RpcRegistry {
    entries: Vec<(String, RpcHandler)>,
}

impl RpcRegistry {
    pub(crate) fn register(
        &mut self,
        name: &str,
        handler: RpcHandler,
    ) -> Result<RpcHandle, RoomError> {
        if self.entries.iter().any(|(n, _)| n == name) {
            return Err(RoomError::RpcAlreadyRegistered(name.to_owned()));
        }
        let id = u8::try_from(self.len()).map_err(|_| RoomError::RpcRegistryFull)?;
        self.entries.push((name.to_owned(), handler));
        Ok(RpcHandle(id))
    }

    /// Calls the handler for `rpc_id`. False if none is registered.
    pub(crate) fn dispatch(
        &mut self,
        rpc_id: u8,
        sender_id: &str,
        args: &[u8],
        registry: &Registry,
    ) -> bool {
        let Some((name, handler)) = self.entries.get_mut(usize::from(rpc_id)) else {
            return false;
        };
        tracing::trace!(rpc = %name, sender = sender_id, "dispatching rpc");
        handler(RpcCall {
            sender_id,
            args,
            registry,
        });
        true
    }

    /// Number of registered RPCs. The next registration gets this id.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
