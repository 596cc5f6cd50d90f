//! End-to-end tests over real sockets on localhost

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use hybrid_protocol::core::opcode::{MessageKind, Opcode};
use hybrid_protocol::core::packet::{HardPacket, MovePacket, Packet};
use hybrid_protocol::error::ProtocolError;
use hybrid_protocol::protocol::dispatcher::PacketDispatcher;
use hybrid_protocol::protocol::event::{EventQueue, GameEvent};
use hybrid_protocol::service::client::Client;
use hybrid_protocol::transport::connection::ConnectionLimits;
use hybrid_protocol::transport::server::Server;
use hybrid_protocol::utils::crypto::Cipher;
use hybrid_protocol::utils::metrics::Metrics;
use hybrid_protocol::utils::thread_pool::ThreadPool;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Login {
    name: String,
}

struct TestServer {
    addr: SocketAddr,
    events: Arc<EventQueue>,
    cipher: Arc<Cipher>,
    metrics: Arc<Metrics>,
    stop: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(|server| server).await
    }

    async fn start_with(configure: impl FnOnce(Server) -> Server) -> Self {
        let cipher = Arc::new(Cipher::new([0x5A; 32], [0xA5; 16]));
        let events = Arc::new(EventQueue::new());
        let server = Server::bind("127.0.0.1:0", cipher.clone(), events.clone())
            .await
            .expect("bind");
        let server = configure(server);
        let addr = server.local_addr().unwrap();
        let metrics = server.metrics();

        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(server.run_until(async move {
            let _ = stopped.await;
        }));

        Self {
            addr,
            events,
            cipher,
            metrics,
            stop: Some(stop),
        }
    }

    async fn client(&self) -> Arc<Client> {
        Client::connect(self.addr, self.cipher.clone(), PacketDispatcher::new())
            .await
            .expect("connect")
    }

    async fn next_event(&self) -> GameEvent {
        let events = self.events.clone();
        tokio::task::spawn_blocking(move || events.wait_pop_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .expect("event within 5s")
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

fn frame(body: &[u8]) -> Vec<u8> {
    let mut wire = (body.len() as u32).to_le_bytes().to_vec();
    wire.extend_from_slice(body);
    wire
}

async fn expect_closed_by_peer(stream: &mut TcpStream) {
    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("server should close the socket");
    assert!(matches!(read, Ok(0) | Err(_)), "unexpected read: {read:?}");
}

#[tokio::test]
async fn test_login_then_move() {
    let server = TestServer::start().await;
    let client = server.client().await;

    let login = Login { name: "ada".into() };
    client
        .send_packet(Packet::structured(Opcode::LOGIN, &login).unwrap())
        .unwrap();
    client
        .send_packet(Packet::from_hard(&MovePacket::new(7, 1.0, 2.0, 3.0)))
        .unwrap();

    let first = server.next_event().await;
    assert_eq!(first.opcode, Opcode::LOGIN);
    assert_eq!(first.kind(), MessageKind::Structured);
    assert_eq!(first.decode_structured::<Login>().unwrap(), login);

    let second = server.next_event().await;
    assert_eq!(second.opcode, Opcode::MOVE);
    assert_eq!(second.kind(), MessageKind::Hard);
    let mv: MovePacket = second.decode_hard().unwrap();
    assert_eq!(mv.entity_id(), 7);
    assert_eq!(mv.position(), (1.0, 2.0, 3.0));

    assert!(Arc::ptr_eq(&first.session, &second.session));
    assert_eq!(server.metrics.snapshot().messages_received, 2);
}

#[tokio::test]
async fn test_empty_login_then_move() {
    let server = TestServer::start().await;
    let client = server.client().await;

    client
        .send_packet(Packet::structured_empty(Opcode::LOGIN).unwrap())
        .unwrap();
    client
        .send_packet(Packet::from_hard(&MovePacket::new(8, 4.0, 5.0, 6.0)))
        .unwrap();

    let login = server.next_event().await;
    assert_eq!(login.opcode, Opcode::LOGIN);
    assert_eq!(login.kind(), MessageKind::Structured);
    assert_eq!(&login.payload[..], &Opcode::LOGIN.to_le_bytes());

    let moved = server.next_event().await;
    let mv: MovePacket = moved.decode_hard().unwrap();
    assert_eq!(mv.entity_id(), 8);
    assert!(Arc::ptr_eq(&login.session, &moved.session));
}

#[tokio::test(flavor = "current_thread")]
async fn test_packet_sent_before_drop_is_delivered() {
    let server = TestServer::start().await;
    let client = server.client().await;

    client
        .send_packet(Packet::from_hard(&MovePacket::new(77, 0.0, 0.0, 0.0)))
        .unwrap();
    drop(client);

    let event = server.next_event().await;
    let mv: MovePacket = event.decode_hard().unwrap();
    assert_eq!(mv.entity_id(), 77);

    let session = event.session.clone();
    eventually("session sees the client go away", || session.is_closed()).await;
}

#[tokio::test]
async fn test_malformed_hard_packet_dropped_connection_kept() {
    let server = TestServer::start().await;
    let client = server.client().await;

    let full = Packet::from_hard(&MovePacket::new(1, 0.0, 0.0, 0.0)).into_bytes();
    client.send_packet(Packet::from_bytes(full.slice(..9))).unwrap();
    client
        .send_packet(Packet::from_hard(&MovePacket::new(2, 5.0, 5.0, 5.0)))
        .unwrap();

    let event = server.next_event().await;
    let mv: MovePacket = event.decode_hard().unwrap();
    assert_eq!(mv.entity_id(), 2);
    assert!(!event.session.is_closed());
    assert!(server.events.is_empty());
    assert_eq!(server.metrics.snapshot().malformed_payloads, 1);
}

#[tokio::test]
async fn test_oversize_header_closes_connection() {
    let server = TestServer::start().await;
    let mut raw = TcpStream::connect(server.addr).await.unwrap();

    raw.write_all(&70_000u32.to_le_bytes()).await.unwrap();
    expect_closed_by_peer(&mut raw).await;

    let metrics = server.metrics.clone();
    eventually("framing error counted", || {
        metrics.snapshot().framing_errors == 1
    })
    .await;
    assert!(server.events.is_empty());
}

#[tokio::test]
async fn test_undecryptable_body_closes_connection() {
    let server = TestServer::start().await;
    let mut raw = TcpStream::connect(server.addr).await.unwrap();

    raw.write_all(&frame(&[0xEE; 15])).await.unwrap();
    expect_closed_by_peer(&mut raw).await;

    let metrics = server.metrics.clone();
    eventually("crypto error counted", || metrics.snapshot().crypto_errors == 1).await;
}

#[tokio::test]
async fn test_body_at_exact_limit_accepted() {
    let server = TestServer::start().await;
    let client = server.client().await;

    // 65535 plaintext bytes encrypt to exactly 65536.
    let mut body = vec![0u8; 65_535];
    body[..2].copy_from_slice(&Opcode::PING.to_le_bytes());
    assert_eq!(Cipher::ciphertext_len(body.len()), 65_536);
    client.send_packet(Packet::from(body)).unwrap();

    let event = server.next_event().await;
    assert_eq!(event.opcode, Opcode::PING);
    assert_eq!(event.payload.len(), 65_535);
}

#[tokio::test]
async fn test_send_over_limit_refused_locally() {
    let server = TestServer::start().await;
    let client = server.client().await;

    let result = client.send_packet(Packet::from(vec![1u8; 65_536]));
    assert!(matches!(result, Err(ProtocolError::OversizedPacket(65_552))));
    assert!(!client.is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_order_preserved() {
    let server = TestServer::start().await;
    let client = server.client().await;

    for i in 0..200u32 {
        client
            .send_packet(Packet::from_hard(&MovePacket::new(i, 0.0, 0.0, i as f32)))
            .unwrap();
    }

    for i in 0..200u32 {
        let mv: MovePacket = server.next_event().await.decode_hard().unwrap();
        assert_eq!(mv.entity_id(), i);
    }
}

#[tokio::test]
async fn test_reply_reaches_client_dispatcher() {
    let server = TestServer::start().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let dispatcher = PacketDispatcher::new();
    dispatcher
        .register_handler(Opcode::MOVE, move |_: &Arc<Client>, payload: &[u8]| {
            let _ = tx.send(payload.to_vec());
        })
        .unwrap();
    let client = Client::connect(server.addr, server.cipher.clone(), dispatcher)
        .await
        .unwrap();

    client
        .send_packet(Packet::structured(Opcode::LOGIN, &Login { name: "bo".into() }).unwrap())
        .unwrap();
    let event = server.next_event().await;
    event
        .reply(Packet::from_hard(&MovePacket::new(99, 1.5, 2.5, 3.5)))
        .unwrap();

    let payload = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload.len(), MovePacket::SIZE);
    assert_eq!(&payload[2..6], &99u32.to_le_bytes());
}

#[tokio::test]
async fn test_unhandled_opcode_counts_a_miss() {
    let server = TestServer::start().await;
    let client = server.client().await;

    client
        .send_packet(Packet::structured_empty(Opcode::PING).unwrap())
        .unwrap();
    let event = server.next_event().await;
    event.reply(Packet::structured_empty(Opcode::PING).unwrap()).unwrap();

    let metrics = client.metrics().clone();
    eventually("dispatch miss counted", || {
        metrics.snapshot().dispatch_misses == 1
    })
    .await;
    assert!(!client.is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_replies_from_worker_threads() {
    let server = TestServer::start().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let dispatcher = PacketDispatcher::new();
    dispatcher
        .register_handler(Opcode::MOVE, move |_: &Arc<Client>, payload: &[u8]| {
            let _ = tx.send(payload[2..6].to_vec());
        })
        .unwrap();
    let client = Client::connect(server.addr, server.cipher.clone(), dispatcher)
        .await
        .unwrap();

    let pool = ThreadPool::new(2).unwrap();
    let events = server.events.clone();
    let consumer = pool
        .submit(move || {
            for _ in 0..50 {
                let event = events
                    .wait_pop_timeout(Duration::from_secs(5))
                    .expect("event");
                event.reply(Packet::from(event.payload.to_vec())).unwrap();
            }
        })
        .unwrap();

    for i in 0..50u32 {
        client
            .send_packet(Packet::from_hard(&MovePacket::new(i, 0.0, 0.0, 0.0)))
            .unwrap();
    }

    for i in 0..50u32 {
        let id = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(id, i.to_le_bytes().to_vec());
    }
    tokio::task::spawn_blocking(move || consumer.wait())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let server = TestServer::start().await;
    let client = server.client().await;

    client
        .send_packet(Packet::structured_empty(Opcode::PING).unwrap())
        .unwrap();
    let event = server.next_event().await;

    client.close();
    client.close();
    assert!(client.is_closed());
    assert!(matches!(
        client.send_packet(Packet::structured_empty(Opcode::PING).unwrap()),
        Err(ProtocolError::ConnectionClosed)
    ));
    assert_eq!(client.metrics().snapshot().connections_active, 0);

    let session = event.session.clone();
    eventually("session closed", || session.is_closed()).await;
    assert!(matches!(
        event.reply(Packet::structured_empty(Opcode::PING).unwrap()),
        Err(ProtocolError::ConnectionClosed)
    ));
}

#[tokio::test(flavor = "current_thread")]
async fn test_backpressure_bounds_outbound_queue() {
    let server = TestServer::start().await;
    let limits = ConnectionLimits {
        max_pending_packets: 4,
        pending_high_water: 2,
        ..ConnectionLimits::default()
    };
    let client = Client::connect_with_limits(
        server.addr,
        server.cipher.clone(),
        PacketDispatcher::new(),
        limits,
    )
    .await
    .unwrap();

    // Nothing yields between sends, so the drain task cannot run yet.
    for i in 0..4u32 {
        client
            .send_packet(Packet::from_hard(&MovePacket::new(i, 0.0, 0.0, 0.0)))
            .unwrap();
    }
    assert_eq!(client.pending_packets(), 4);
    assert!(matches!(
        client.send_packet(Packet::from_hard(&MovePacket::new(4, 0.0, 0.0, 0.0))),
        Err(ProtocolError::Backpressure(4))
    ));
    assert_eq!(client.metrics().snapshot().backpressure_rejections, 1);

    let c = client.clone();
    eventually("queue drained", || c.pending_packets() == 0).await;
    for i in 0..4u32 {
        let mv: MovePacket = server.next_event().await.decode_hard().unwrap();
        assert_eq!(mv.entity_id(), i);
    }
}

#[tokio::test]
async fn test_connection_limit_refuses_extra_peers() {
    let server = TestServer::start_with(|s| s.with_max_connections(1)).await;

    let first = server.client().await;
    first
        .send_packet(Packet::structured_empty(Opcode::PING).unwrap())
        .unwrap();
    server.next_event().await;

    let mut second = TcpStream::connect(server.addr).await.unwrap();
    expect_closed_by_peer(&mut second).await;
    assert!(!first.is_closed());
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let mut server = TestServer::start().await;
    let client = server.client().await;
    client
        .send_packet(Packet::structured_empty(Opcode::PING).unwrap())
        .unwrap();
    let event = server.next_event().await;

    server.stop();
    let session = event.session.clone();
    eventually("session closed", || session.is_closed()).await;
    let c = client.clone();
    eventually("client closed", || c.is_closed()).await;
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = Client::connect(addr, Arc::new(Cipher::generate().unwrap()), PacketDispatcher::new()).await;
    assert!(matches!(result, Err(ProtocolError::Io(_))));
}

#[tokio::test]
async fn test_connect_with_config_requires_key() {
    let config = hybrid_protocol::config::NetworkConfig::default();
    let result = Client::connect_with_config(&config, PacketDispatcher::new()).await;
    assert!(matches!(result, Err(ProtocolError::ConfigError(_))));
}
