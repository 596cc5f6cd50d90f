#![no_main]

use bytes::Bytes;
use hybrid_protocol::core::packet::{HardPacket, MovePacket};
use hybrid_protocol::protocol::decode::decode_payload;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decrypted plaintext from a peer that holds the key but sends garbage
    if let Ok(message) = decode_payload(Bytes::copy_from_slice(data)) {
        let _ = MovePacket::decode(&message.payload);
    }
});
