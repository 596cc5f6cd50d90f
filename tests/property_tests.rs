//! Property-based tests using proptest
//!
//! These tests check protocol invariants across randomly generated inputs:
//! cipher reversibility, opcode classification, framing limits and payload
//! validation.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::{BufMut, Bytes, BytesMut};
use hybrid_protocol::core::codec::{FrameCodec, MAX_BODY_SIZE};
use hybrid_protocol::core::opcode::{MessageKind, Opcode, HARD_OPCODE_BASE};
use hybrid_protocol::core::packet::{HardPacket, MovePacket, Packet};
use hybrid_protocol::error::ProtocolError;
use hybrid_protocol::protocol::decode::decode_payload;
use hybrid_protocol::utils::crypto::{Cipher, BLOCK_SIZE};
use proptest::prelude::*;
use tokio_util::codec::Decoder;

fn cipher_strategy() -> impl Strategy<Value = Cipher> {
    (any::<[u8; 32]>(), any::<[u8; 16]>()).prop_map(|(key, iv)| Cipher::new(key, iv))
}

// Property: decrypt(encrypt(p)) == p for any key, IV and plaintext
proptest! {
    #[test]
    fn prop_cipher_roundtrip(
        cipher in cipher_strategy(),
        plain in prop::collection::vec(any::<u8>(), 0..4096),
    ) {
        let sealed = cipher.encrypt(&plain).expect("encrypt");
        let opened = cipher.decrypt(&sealed).expect("decrypt");
        prop_assert_eq!(opened, plain);
    }
}

// Property: ciphertext is always whole blocks and strictly longer than the plaintext
proptest! {
    #[test]
    fn prop_ciphertext_length(plain in prop::collection::vec(any::<u8>(), 0..2048)) {
        let cipher = Cipher::new([3; 32], [5; 16]);
        let sealed = cipher.encrypt(&plain).unwrap();
        prop_assert_eq!(sealed.len() % BLOCK_SIZE, 0);
        prop_assert!(sealed.len() > plain.len());
        prop_assert_eq!(sealed.len(), Cipher::ciphertext_len(plain.len()));
    }
}

// Property: classification depends only on the opcode range
proptest! {
    #[test]
    fn prop_classification_boundary(raw in any::<u16>()) {
        let opcode = Opcode::new(raw);
        let expected = if raw < HARD_OPCODE_BASE {
            MessageKind::Structured
        } else {
            MessageKind::Hard
        };
        prop_assert_eq!(opcode.kind(), expected);
        prop_assert_eq!(Opcode::peek(&raw.to_le_bytes()), Some(opcode));
    }
}

// Property: a declared length above the limit always fails before any body is read
proptest! {
    #[test]
    fn prop_oversize_header_rejected(declared in (MAX_BODY_SIZE as u32 + 1)..=u32::MAX) {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        buf.put_u32_le(declared);

        let result = codec.decode(&mut buf);
        prop_assert!(
            matches!(result, Err(ProtocolError::OversizedPacket(n)) if n == declared as usize),
            "expected oversize rejection"
        );
    }
}

// Property: move packets survive the wire layout unchanged
proptest! {
    #[test]
    fn prop_move_packet_fields(
        id in any::<u32>(),
        x in -1.0e6f32..1.0e6,
        y in -1.0e6f32..1.0e6,
        z in -1.0e6f32..1.0e6,
    ) {
        let packet = Packet::from_hard(&MovePacket::new(id, x, y, z));
        let message = decode_payload(packet.into_bytes()).unwrap();
        prop_assert_eq!(message.kind, MessageKind::Hard);

        let decoded = MovePacket::decode(&message.payload).unwrap();
        prop_assert_eq!(decoded.entity_id(), id);
        prop_assert_eq!(decoded.position(), (x, y, z));
    }
}

// Property: any truncation of a move packet is reported as malformed, never panics
proptest! {
    #[test]
    fn prop_truncated_move_is_malformed(len in 0usize..MovePacket::SIZE) {
        let full = Packet::from_hard(&MovePacket::new(1, 2.0, 3.0, 4.0)).into_bytes();
        let result = decode_payload(full.slice(..len));
        let is_malformed = matches!(result, Err(ProtocolError::MalformedPayload { .. }));
        prop_assert!(is_malformed);
    }
}

// Property: decoding arbitrary plaintext never panics
proptest! {
    #[test]
    fn prop_decode_arbitrary_payload(data in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = decode_payload(Bytes::from(data));
    }
}

// Property: decrypting arbitrary bytes fails cleanly or yields some plaintext, never panics
proptest! {
    #[test]
    fn prop_decrypt_garbage(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let cipher = Cipher::new([1; 32], [2; 16]);
        if let Err(e) = cipher.decrypt(&data) {
            prop_assert!(matches!(e, ProtocolError::DecryptionFailure));
        }
    }
}
