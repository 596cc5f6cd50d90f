//! # Session
//!
//! Server side of one accepted connection. Inbound messages are pushed onto
//! the server's [`EventQueue`] as [`GameEvent`]s.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, instrument};

use crate::core::packet::Packet;
use crate::error::Result;
use crate::protocol::event::{EventQueue, GameEvent};
use crate::transport::connection::{Connection, ConnectionId, ConnectionLimits, Role};
use crate::utils::crypto::Cipher;
use crate::utils::metrics::Metrics;

/// Server-side end of one client connection.
///
/// Every inbound message becomes a [`GameEvent`] on the shared event queue.
/// The session stays alive while its read task runs or any event still
/// refers to it.
#[derive(Debug)]
pub struct Session {
    conn: Arc<Connection>,
}

impl Session {
    /// Wrap an accepted socket and start reading from it.
    #[instrument(skip_all)]
    pub fn start(
        stream: TcpStream,
        cipher: Arc<Cipher>,
        events: Arc<EventQueue>,
        limits: ConnectionLimits,
        metrics: Arc<Metrics>,
    ) -> Result<Arc<Session>> {
        let (conn, frames) = Connection::split(stream, Role::Session, cipher, limits, metrics)?;
        let session = Arc::new(Session { conn });

        let reader = Arc::clone(&session);
        tokio::spawn(async move {
            let target = Arc::clone(&reader);
            reader
                .conn
                .read_loop(frames, move |message| {
                    events.push(GameEvent::new(message, Arc::clone(&target)));
                })
                .await;
            debug!(conn = %reader.id(), "Session reader finished");
        });

        Ok(session)
    }

    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.conn.peer_addr()
    }

    /// Queue a packet for this client. Safe to call from any thread.
    pub fn send_packet(&self, packet: Packet) -> Result<()> {
        self.conn.send_packet(packet)
    }

    pub fn close(&self) {
        self.conn.close();
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    pub fn pending_packets(&self) -> usize {
        self.conn.pending_packets()
    }
}
