#![allow(clippy::unwrap_used, clippy::expect_used)]

use bytes::{Bytes, BytesMut};
use hybrid_protocol::core::codec::FrameCodec;
use hybrid_protocol::core::packet::{HardPacket, MovePacket, Packet};
use hybrid_protocol::protocol::decode::decode_payload;
use hybrid_protocol::utils::crypto::Cipher;
use tokio_util::codec::{Decoder, Encoder};

#[test]
fn stress_seal_frame_open_large_series() {
    // Full send/receive path without sockets: encrypt, frame, deframe, decrypt, classify
    let cipher = Cipher::new([0x11; 32], [0x22; 16]);
    let mut codec = FrameCodec::default();
    let mut buf = BytesMut::new();

    for size in [2usize, 18, 64, 512, 4096, 65_519] {
        let mut plain = vec![0u8; size];
        plain[..2].copy_from_slice(&1u16.to_le_bytes());
        for _ in 0..200 {
            let sealed = cipher.encrypt(&plain).unwrap();
            codec.encode(Bytes::from(sealed), &mut buf).unwrap();
            let frame = codec.decode(&mut buf).unwrap().expect("frame");
            let opened = cipher.decrypt(&frame).unwrap();
            let message = decode_payload(opened.into()).unwrap();
            assert_eq!(message.payload.len(), size);
            assert!(buf.is_empty());
        }
    }
}

#[test]
fn stress_move_burst_in_one_buffer() {
    let cipher = Cipher::new([0x33; 32], [0x44; 16]);
    let mut codec = FrameCodec::default();
    let mut buf = BytesMut::new();

    for i in 0..10_000u32 {
        let packet = Packet::from_hard(&MovePacket::new(i, i as f32, 0.0, -(i as f32)));
        let sealed = cipher.encrypt(packet.body()).unwrap();
        codec.encode(Bytes::from(sealed), &mut buf).unwrap();
    }

    let mut next = 0u32;
    while let Some(frame) = codec.decode(&mut buf).unwrap() {
        let opened = cipher.decrypt(&frame).unwrap();
        let message = decode_payload(opened.into()).unwrap();
        let mv = MovePacket::decode(&message.payload).unwrap();
        assert_eq!(mv.entity_id(), next);
        next += 1;
    }
    assert_eq!(next, 10_000);
}
