//! Ring buffer of sequenced, signed outgoing messages.
//!
//! Every `post_*` call assigns the next sequence number and stores the signed
//! frame in slot `seq % capacity`. The sender takes frames by seq; after a
//! reconnect it rewinds to whatever the server reports as received, so a
//! frame stays available until `capacity` newer messages have been posted.

use std::sync::Arc;

use roomwire_codec::{Dict, Registry};

use crate::msg::{MAX_MSG_SEQ, MsgPayload, MsgSigner, RoomPropPayload, build_msg_frame};
use crate::ProtocolError;

#[derive(Debug, Default, Clone)]
struct Slot {
    seq: u32,
    frame: Vec<u8>,
}

/// Fixed-capacity pool of outgoing messages.
#[derive(Debug)]
pub struct MsgPool {
    slots: Vec<Slot>,
    /// Latest assigned seq. Zero before the first post.
    latest: u32,
    /// Highest seq handed out by [`take`](Self::take).
    taken: u32,
    signer: MsgSigner,
    registry: Arc<Registry>,
}

impl MsgPool {
    /// Creates a pool with room for `capacity` messages (at least one).
    pub fn new(capacity: usize, signer: MsgSigner, registry: Arc<Registry>) -> Self {
        Self {
            slots: vec![Slot::default(); capacity.max(1)],
            latest: 0,
            taken: 0,
            signer,
            registry,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The most recently assigned sequence number.
    pub fn latest(&self) -> u32 {
        self.latest
    }

    pub fn signer(&self) -> &MsgSigner {
        &self.signer
    }

    fn slot_index(&self, seq: u32) -> usize {
        seq as usize % self.slots.len()
    }

    /// Serializes, signs and stores `payload`, returning its seq.
    pub fn post(&mut self, payload: &MsgPayload) -> Result<u32, ProtocolError> {
        if self.latest >= MAX_MSG_SEQ {
            return Err(ProtocolError::SeqOverflow);
        }
        let seq = self.latest + 1;
        let idx = self.slot_index(seq);
        if self.slots[idx].seq > self.taken {
            return Err(ProtocolError::PoolFull {
                seq,
                capacity: self.capacity(),
            });
        }

        let mut frame = build_msg_frame(seq, payload, &self.registry)?;
        self.signer.sign(&mut frame);

        let slot = &mut self.slots[idx];
        slot.seq = seq;
        slot.frame = frame;
        self.latest = seq;
        Ok(seq)
    }

    pub fn post_leave(&mut self, message: &str) -> Result<u32, ProtocolError> {
        self.post(&MsgPayload::Leave {
            message: message.to_owned(),
        })
    }

    pub fn post_room_prop(&mut self, prop: RoomPropPayload) -> Result<u32, ProtocolError> {
        self.post(&MsgPayload::RoomProp(prop))
    }

    pub fn post_client_prop(&mut self, props: Dict) -> Result<u32, ProtocolError> {
        self.post(&MsgPayload::ClientProp { props })
    }

    pub fn post_switch_master(&mut self, new_master: &str) -> Result<u32, ProtocolError> {
        self.post(&MsgPayload::SwitchMaster {
            new_master: new_master.to_owned(),
        })
    }

    pub fn post_targets(
        &mut self,
        targets: Vec<String>,
        rpc_id: u8,
        args: Vec<u8>,
    ) -> Result<u32, ProtocolError> {
        self.post(&MsgPayload::Targets {
            targets,
            rpc_id,
            args,
        })
    }

    pub fn post_to_master(&mut self, rpc_id: u8, args: Vec<u8>) -> Result<u32, ProtocolError> {
        self.post(&MsgPayload::ToMaster { rpc_id, args })
    }

    pub fn post_broadcast(&mut self, rpc_id: u8, args: Vec<u8>) -> Result<u32, ProtocolError> {
        self.post(&MsgPayload::Broadcast { rpc_id, args })
    }

    pub fn post_kick(&mut self, target: &str, message: &str) -> Result<u32, ProtocolError> {
        self.post(&MsgPayload::Kick {
            target: target.to_owned(),
            message: message.to_owned(),
        })
    }

    /// Returns a copy of the signed frame for `seq`.
    ///
    /// `Ok(None)` means `seq` has not been posted yet. A seq that has been
    /// overwritten (or was never valid) is [`ProtocolError::SeqTooOld`].
    pub fn take(&mut self, seq: u32) -> Result<Option<Vec<u8>>, ProtocolError> {
        if seq > self.latest {
            return Ok(None);
        }
        let too_old = || ProtocolError::SeqTooOld {
            seq,
            latest: self.latest,
            capacity: self.slots.len(),
        };
        if seq == 0 || u64::from(seq) + self.slots.len() as u64 <= u64::from(self.latest) {
            return Err(too_old());
        }
        let slot = &self.slots[self.slot_index(seq)];
        if slot.seq != seq {
            return Err(too_old());
        }
        let frame = slot.frame.clone();
        self.taken = self.taken.max(seq);
        Ok(Some(frame))
    }
}
