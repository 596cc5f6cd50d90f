//! # Structured Envelope
//!
//! Structured (schema-encoded) messages share one envelope:
//!
//! ```text
//! [opcode: u16 LE][fields: bincode]
//! ```
//!
//! The opcode doubles as the envelope's message type, so classification and
//! envelope parsing read the same two bytes. Field schemas are owned by the
//! application: any `serde` type works, and an opcode with no fields is just
//! the two opcode bytes.
//!
//! ## Usage
//! ```rust
//! use hybrid_protocol::core::opcode::Opcode;
//! use hybrid_protocol::core::serialization::{decode_structured, encode_structured};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Login {
//!     name: String,
//! }
//!
//! let bytes = encode_structured(Opcode::LOGIN, &Login { name: "ada".into() })?;
//! let (opcode, login): (Opcode, Login) = decode_structured(&bytes)?;
//! assert_eq!(opcode, Opcode::LOGIN);
//! assert_eq!(login.name, "ada");
//! # Ok::<(), hybrid_protocol::error::ProtocolError>(())
//! ```

use serde::{de::DeserializeOwned, Serialize};

use crate::core::opcode::{Opcode, OPCODE_SIZE};
use crate::error::{ProtocolError, Result};

/// Encode a structured message body.
pub fn encode_structured<T: Serialize>(opcode: Opcode, fields: &T) -> Result<Vec<u8>> {
    ensure_structured(opcode)?;
    let size = bincode::serialized_size(fields)? as usize;
    let mut buf = Vec::with_capacity(OPCODE_SIZE + size);
    buf.extend_from_slice(&opcode.to_le_bytes());
    bincode::serialize_into(&mut buf, fields)?;
    Ok(buf)
}

/// Encode a structured message with no fields.
pub fn encode_opcode_only(opcode: Opcode) -> Result<Vec<u8>> {
    ensure_structured(opcode)?;
    Ok(opcode.to_le_bytes().to_vec())
}

/// Decode a structured message body into its opcode and fields.
pub fn decode_structured<T: DeserializeOwned>(payload: &[u8]) -> Result<(Opcode, T)> {
    let opcode = Opcode::peek(payload).ok_or(ProtocolError::MalformedPayload {
        opcode: 0,
        expected: OPCODE_SIZE,
        actual: payload.len(),
    })?;
    ensure_structured(opcode)?;
    let fields = bincode::deserialize(&payload[OPCODE_SIZE..])?;
    Ok((opcode, fields))
}

/// The encoded fields following the opcode, without decoding them.
pub fn structured_fields(payload: &[u8]) -> &[u8] {
    payload.get(OPCODE_SIZE..).unwrap_or_default()
}

#[inline]
fn ensure_structured(opcode: Opcode) -> Result<()> {
    if opcode.is_structured() {
        Ok(())
    } else {
        Err(ProtocolError::InvalidOpcode(opcode.get()))
    }
}
