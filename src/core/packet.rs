//! # Packets
//!
//! [`Packet`] is one unencrypted application message body, exactly as it is
//! handed to the cipher. It is cheap to clone (reference-counted [`Bytes`])
//! and never mutated after construction.
//!
//! Fixed-layout messages implement [`HardPacket`]: plain `#[repr(C)]` structs
//! made only of byte arrays, so their memory image *is* the wire image with no
//! padding and no host-endianness surprises.

use bytemuck::{Pod, Zeroable};
use bytes::Bytes;
use serde::Serialize;
use std::fmt;

use crate::core::opcode::{Opcode, OPCODE_SIZE};
use crate::core::serialization;
use crate::error::{ProtocolError, Result};

/// An immutable, serialized application message body.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Packet {
    body: Bytes,
}

impl Packet {
    /// Wrap an already serialized buffer.
    pub fn from_bytes(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }

    /// Copy the bytes of a fixed-layout message.
    pub fn from_hard<P: HardPacket>(packet: &P) -> Self {
        Self {
            body: Bytes::copy_from_slice(bytemuck::bytes_of(packet)),
        }
    }

    /// Build a structured message: opcode followed by bincode-encoded fields.
    pub fn structured<T: Serialize>(opcode: Opcode, fields: &T) -> Result<Self> {
        serialization::encode_structured(opcode, fields).map(Self::from_bytes)
    }

    /// Build a structured message that carries nothing beyond its opcode.
    pub fn structured_empty(opcode: Opcode) -> Result<Self> {
        serialization::encode_opcode_only(opcode).map(Self::from_bytes)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Opcode in the first two bytes, if the body is long enough.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::peek(&self.body)
    }
}

impl From<Vec<u8>> for Packet {
    fn from(body: Vec<u8>) -> Self {
        Self::from_bytes(body)
    }
}

impl From<Bytes> for Packet {
    fn from(body: Bytes) -> Self {
        Self { body }
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("opcode", &self.opcode())
            .field("len", &self.body.len())
            .finish()
    }
}

/// A fixed-layout message whose first field is its opcode.
///
/// Implementors must be `#[repr(C)]` with alignment 1 so that
/// `size_of::<Self>()` equals the wire size.
pub trait HardPacket: Pod {
    /// Opcode stored in the first two bytes. Must be a hard-range opcode.
    const OPCODE: Opcode;

    /// Exact size on the wire.
    const SIZE: usize = std::mem::size_of::<Self>();

    /// Read a message from the front of a decrypted payload.
    ///
    /// Trailing bytes beyond [`Self::SIZE`] are ignored.
    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::SIZE {
            return Err(ProtocolError::MalformedPayload {
                opcode: Opcode::peek(payload).map_or(0, Opcode::get),
                expected: Self::SIZE,
                actual: payload.len(),
            });
        }
        match Opcode::peek(payload) {
            Some(op) if op == Self::OPCODE => {}
            Some(op) => return Err(ProtocolError::InvalidOpcode(op.get())),
            None => return Err(ProtocolError::InvalidOpcode(0)),
        }
        Ok(bytemuck::pod_read_unaligned(&payload[..Self::SIZE]))
    }
}

/// Smallest fixed layout any hard opcode may carry.
pub const MIN_HARD_SIZE: usize = MovePacket::SIZE;

/// Minimum payload size accepted for a hard opcode.
///
/// Known layouts report their full size. Unknown hard opcodes must still be
/// at least as long as the smallest known layout.
pub fn hard_layout_size(opcode: Opcode) -> usize {
    match opcode {
        Opcode::MOVE => MovePacket::SIZE,
        _ => MIN_HARD_SIZE,
    }
}

/// Entity movement update: `[u16 opcode][u32 entity id][f32 x][f32 y][f32 z]`.
#[derive(Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct MovePacket {
    opcode: [u8; 2],
    entity_id: [u8; 4],
    x: [u8; 4],
    y: [u8; 4],
    z: [u8; 4],
}

const _: () = assert!(std::mem::size_of::<MovePacket>() == 18);

impl MovePacket {
    pub fn new(entity_id: u32, x: f32, y: f32, z: f32) -> Self {
        Self {
            opcode: Opcode::MOVE.to_le_bytes(),
            entity_id: entity_id.to_le_bytes(),
            x: x.to_le_bytes(),
            y: y.to_le_bytes(),
            z: z.to_le_bytes(),
        }
    }

    pub fn entity_id(&self) -> u32 {
        u32::from_le_bytes(self.entity_id)
    }

    pub fn position(&self) -> (f32, f32, f32) {
        (
            f32::from_le_bytes(self.x),
            f32::from_le_bytes(self.y),
            f32::from_le_bytes(self.z),
        )
    }
}

impl HardPacket for MovePacket {
    const OPCODE: Opcode = Opcode::MOVE;
}

impl fmt::Debug for MovePacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, y, z) = self.position();
        f.debug_struct("MovePacket")
            .field("entity_id", &self.entity_id())
            .field("x", &x)
            .field("y", &y)
            .field("z", &z)
            .finish()
    }
}
