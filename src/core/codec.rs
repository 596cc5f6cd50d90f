//! # Frame Codec
//!
//! Tokio codec for the length-prefixed wire framing shared by both directions:
//!
//! ```text
//! [Length(4, u32 LE)] [Encrypted body(Length)]
//! ```
//!
//! The codec moves opaque ciphertext; encryption happens above it. The
//! declared length is checked against the limit as soon as the 4-byte prefix
//! is available, before any buffer is reserved for the body.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest encrypted body a peer may declare (64 KiB).
pub const MAX_BODY_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_body_size: usize,
}

impl FrameCodec {
    /// Limits above [`MAX_BODY_SIZE`] are lowered to it.
    pub fn new(max_body_size: usize) -> Self {
        Self {
            max_body_size: max_body_size.min(MAX_BODY_SIZE),
        }
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_BODY_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let declared = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if declared > self.max_body_size {
            return Err(ProtocolError::OversizedPacket(declared));
        }

        let frame_len = LENGTH_PREFIX_SIZE + declared;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(src.split_to(declared)))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, body: Bytes, dst: &mut BytesMut) -> Result<()> {
        if body.len() > self.max_body_size {
            return Err(ProtocolError::OversizedPacket(body.len()));
        }
        dst.reserve(LENGTH_PREFIX_SIZE + body.len());
        dst.put_u32_le(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}
