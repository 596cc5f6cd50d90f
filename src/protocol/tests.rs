// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::opcode::{MessageKind, Opcode};
use crate::core::packet::{HardPacket, MovePacket, Packet, MIN_HARD_SIZE};
use crate::core::serialization::decode_structured;
use crate::error::ProtocolError;
use crate::protocol::decode::decode_payload;
use crate::protocol::dispatcher::PacketDispatcher;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Login {
    name: String,
    token: u64,
}

struct Peer {
    name: &'static str,
}

#[test]
fn test_structured_classification() {
    let login = Login {
        name: "ada".into(),
        token: 99,
    };
    let packet = Packet::structured(Opcode::LOGIN, &login).unwrap();
    let msg = decode_payload(packet.into_bytes()).unwrap();

    assert_eq!(msg.opcode, Opcode::LOGIN);
    assert_eq!(msg.kind, MessageKind::Structured);
    let (opcode, decoded): (Opcode, Login) = decode_structured(&msg.payload).unwrap();
    assert_eq!(opcode, Opcode::LOGIN);
    assert_eq!(decoded, login);
}

#[test]
fn test_hard_classification() {
    let packet = Packet::from_hard(&MovePacket::new(7, 1.0, 2.0, 3.0));
    let msg = decode_payload(packet.into_bytes()).unwrap();

    assert_eq!(msg.opcode, Opcode::MOVE);
    assert_eq!(msg.kind, MessageKind::Hard);
    let mv = MovePacket::decode(&msg.payload).unwrap();
    assert_eq!(mv.entity_id(), 7);
    assert_eq!(mv.position(), (1.0, 2.0, 3.0));
}

#[test]
fn test_classification_boundary() {
    let below = decode_payload(Bytes::from(999u16.to_le_bytes().to_vec())).unwrap();
    assert_eq!(below.kind, MessageKind::Structured);

    let mut body = vec![0u8; MIN_HARD_SIZE];
    body[..2].copy_from_slice(&1000u16.to_le_bytes());
    let at = decode_payload(Bytes::from(body)).unwrap();
    assert_eq!(at.kind, MessageKind::Hard);
}

#[test]
fn test_short_hard_payload_is_malformed() {
    let full = Packet::from_hard(&MovePacket::new(1, 0.0, 0.0, 0.0)).into_bytes();
    let err = decode_payload(full.slice(..9)).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::MalformedPayload {
            opcode: 1001,
            expected: 18,
            actual: 9
        }
    ));
    assert!(!err.is_fatal());
}

#[test]
fn test_payload_without_opcode_is_malformed() {
    for len in 0..2 {
        let err = decode_payload(Bytes::from(vec![0xAB; len])).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MalformedPayload { opcode: 0, expected: 2, actual } if actual == len
        ));
    }
}

#[test]
fn test_dispatch_routes_by_opcode() {
    let dispatcher: PacketDispatcher<Peer> = PacketDispatcher::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = seen.clone();
    dispatcher
        .register_handler(Opcode::MOVE, move |peer: &Arc<Peer>, payload: &[u8]| {
            let mv = MovePacket::decode(payload).unwrap();
            log.lock().unwrap().push((peer.name, mv.entity_id()));
        })
        .unwrap();

    let peer = Arc::new(Peer { name: "p1" });
    let packet = Packet::from_hard(&MovePacket::new(5, 0.0, 0.0, 0.0));
    assert!(dispatcher
        .dispatch(&peer, Opcode::MOVE, packet.body())
        .unwrap());
    assert_eq!(*seen.lock().unwrap(), vec![("p1", 5)]);
}

#[test]
fn test_dispatch_miss_is_not_an_error() {
    let dispatcher: PacketDispatcher<Peer> = PacketDispatcher::new();
    let peer = Arc::new(Peer { name: "p1" });
    assert!(!dispatcher.dispatch(&peer, Opcode::PING, &[1, 0]).unwrap());
    assert!(dispatcher.is_empty());
}

#[test]
fn test_last_registration_wins() {
    let dispatcher: PacketDispatcher<Peer> = PacketDispatcher::new();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let f = first.clone();
    dispatcher
        .register_handler(Opcode::PING, move |_: &Arc<Peer>, _: &[u8]| {
            f.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    let s = second.clone();
    dispatcher
        .register_handler(Opcode::PING, move |_: &Arc<Peer>, _: &[u8]| {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let peer = Arc::new(Peer { name: "p1" });
    dispatcher.dispatch(&peer, Opcode::PING, &[1, 0]).unwrap();
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.len(), 1);
}

#[test]
fn test_handler_may_register_during_dispatch() {
    let dispatcher: PacketDispatcher<Peer> = PacketDispatcher::new();
    let inner = dispatcher.clone();
    dispatcher
        .register_handler(Opcode::LOGIN, move |_: &Arc<Peer>, _: &[u8]| {
            inner
                .register_handler(Opcode::PING, |_: &Arc<Peer>, _: &[u8]| {})
                .unwrap();
        })
        .unwrap();

    let peer = Arc::new(Peer { name: "p1" });
    dispatcher.dispatch(&peer, Opcode::LOGIN, &[2, 0]).unwrap();
    assert!(dispatcher.has_handler(Opcode::PING));
}
