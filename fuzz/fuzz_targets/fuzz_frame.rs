#![no_main]

use bytes::BytesMut;
use hybrid_protocol::core::codec::FrameCodec;
use hybrid_protocol::protocol::decode::decode_payload;
use hybrid_protocol::utils::crypto::Cipher;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Untrusted bytes through the whole receive path: deframe, decrypt, classify
    let cipher = Cipher::new([0x42; 32], [0x24; 16]);
    let mut codec = FrameCodec::default();
    let mut buf = BytesMut::from(data);

    while let Ok(Some(frame)) = codec.decode(&mut buf) {
        if let Ok(plain) = cipher.decrypt(&frame) {
            let _ = decode_payload(plain.into());
        }
    }
});
