//! Inbound messages as seen by the server's game loop.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

use crate::core::opcode::{MessageKind, Opcode};
use crate::core::packet::{HardPacket, Packet};
use crate::core::serialization;
use crate::error::Result;
use crate::protocol::decode::DecodedMessage;
use crate::service::session::Session;
use crate::utils::queue::ThreadSafeQueue;

/// Queue the server's sessions push inbound messages onto.
pub type EventQueue = ThreadSafeQueue<GameEvent>;

/// One inbound message, tagged with the session it arrived on.
///
/// Holding an event keeps its session alive, so a consumer can always reply
/// even if the peer disconnected in the meantime; the reply then fails with
/// `ConnectionClosed`.
#[derive(Clone)]
pub struct GameEvent {
    pub opcode: Opcode,
    /// Decrypted payload, opcode bytes included.
    pub payload: Bytes,
    pub session: Arc<Session>,
}

impl GameEvent {
    pub fn new(message: DecodedMessage, session: Arc<Session>) -> Self {
        Self {
            opcode: message.opcode,
            payload: message.payload,
            session,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.opcode.kind()
    }

    pub fn decode_hard<P: HardPacket>(&self) -> Result<P> {
        P::decode(&self.payload)
    }

    pub fn decode_structured<T: DeserializeOwned>(&self) -> Result<T> {
        serialization::decode_structured(&self.payload).map(|(_, fields)| fields)
    }

    /// Send `packet` back on the originating session.
    pub fn reply(&self, packet: Packet) -> Result<()> {
        self.session.send_packet(packet)
    }
}

impl fmt::Debug for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameEvent")
            .field("opcode", &self.opcode)
            .field("len", &self.payload.len())
            .field("session", &self.session.id())
            .finish()
    }
}
