//! Classification of decrypted payloads.
//!
//! Both wire formats begin with the same little-endian opcode field, so one
//! read of the first two bytes yields the opcode for either kind; the range
//! then decides the kind. Hard payloads are additionally checked against the
//! size of their fixed layout.

use bytes::Bytes;

use crate::core::opcode::{MessageKind, Opcode, OPCODE_SIZE};
use crate::core::packet::hard_layout_size;
use crate::error::{ProtocolError, Result};

/// A classified inbound message, payload still in its raw plaintext form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub opcode: Opcode,
    pub kind: MessageKind,
    /// Full plaintext, opcode bytes included.
    pub payload: Bytes,
}

/// Classify a decrypted payload.
///
/// Fails with [`ProtocolError::MalformedPayload`] when the payload cannot hold
/// an opcode, or is a hard message shorter than its layout. Callers drop the
/// message and keep the connection.
pub fn decode_payload(payload: Bytes) -> Result<DecodedMessage> {
    let opcode = Opcode::peek(&payload).ok_or(ProtocolError::MalformedPayload {
        opcode: 0,
        expected: OPCODE_SIZE,
        actual: payload.len(),
    })?;

    let kind = opcode.kind();
    if kind == MessageKind::Hard {
        let expected = hard_layout_size(opcode);
        if payload.len() < expected {
            return Err(ProtocolError::MalformedPayload {
                opcode: opcode.get(),
                expected,
                actual: payload.len(),
            });
        }
    }

    Ok(DecodedMessage {
        opcode,
        kind,
        payload,
    })
}
