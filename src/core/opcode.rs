//! # Opcodes
//!
//! A 16-bit opcode leads every plaintext payload, little-endian. Its numeric
//! range is the only thing that tells the two message formats apart:
//!
//! ```text
//! 0    ..= 999   structured message  [opcode][bincode fields]
//! 1000 ..= 65535 hard message        [opcode][fixed layout]
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// First opcode value that denotes a fixed-layout hard packet.
pub const HARD_OPCODE_BASE: u16 = 1000;

/// Bytes occupied by the opcode field at the start of every payload.
pub const OPCODE_SIZE: usize = 2;

/// Wire format of a payload, decided by its opcode range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Schema-encoded message, opcode below [`HARD_OPCODE_BASE`].
    Structured,
    /// Fixed-layout message, opcode at or above [`HARD_OPCODE_BASE`].
    Hard,
}

/// Logical message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Opcode(u16);

impl Opcode {
    pub const NONE: Opcode = Opcode(0);
    pub const PING: Opcode = Opcode(1);
    pub const LOGIN: Opcode = Opcode(2);
    pub const MOVE: Opcode = Opcode(1001);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn kind(self) -> MessageKind {
        if self.0 < HARD_OPCODE_BASE {
            MessageKind::Structured
        } else {
            MessageKind::Hard
        }
    }

    #[inline]
    pub const fn is_structured(self) -> bool {
        self.0 < HARD_OPCODE_BASE
    }

    #[inline]
    pub const fn is_hard(self) -> bool {
        !self.is_structured()
    }

    pub const fn to_le_bytes(self) -> [u8; OPCODE_SIZE] {
        self.0.to_le_bytes()
    }

    /// Read the opcode from the first two bytes of a plaintext payload.
    ///
    /// Returns `None` when the payload is too short to carry one.
    #[inline]
    pub fn peek(payload: &[u8]) -> Option<Opcode> {
        match payload {
            [lo, hi, ..] => Some(Opcode(u16::from_le_bytes([*lo, *hi]))),
            _ => None,
        }
    }

    /// Name of a well-known opcode, if this is one.
    pub fn name(self) -> Option<&'static str> {
        match self {
            Opcode::NONE => Some("NONE"),
            Opcode::PING => Some("PING"),
            Opcode::LOGIN => Some("LOGIN"),
            Opcode::MOVE => Some("MOVE"),
            _ => None,
        }
    }
}

impl From<u16> for Opcode {
    fn from(value: u16) -> Self {
        Opcode(value)
    }
}

impl From<Opcode> for u16 {
    fn from(opcode: Opcode) -> Self {
        opcode.0
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}({})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}
