//! # Client
//!
//! Outbound connection whose inbound messages are routed through a
//! [`PacketDispatcher`].

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, error, instrument, warn};

use crate::config::NetworkConfig;
use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dispatcher::PacketDispatcher;
use crate::transport::connection::{Connection, ConnectionId, ConnectionLimits, Role};
use crate::utils::crypto::Cipher;
use crate::utils::metrics::Metrics;

/// Client end of a connection.
///
/// Inbound messages are routed through a [`PacketDispatcher`] on the reactor
/// thread that read them; handlers receive the client itself so they can
/// answer. Dropping the last handle held outside the handlers closes the
/// connection once every packet already queued has been written.
#[derive(Debug)]
pub struct Client {
    conn: Arc<Connection>,
    metrics: Arc<Metrics>,
}

impl Client {
    /// Connect with default limits.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        cipher: Arc<Cipher>,
        dispatcher: PacketDispatcher<Client>,
    ) -> Result<Arc<Client>> {
        Self::connect_with_limits(addr, cipher, dispatcher, ConnectionLimits::default()).await
    }

    pub async fn connect_with_limits<A: ToSocketAddrs>(
        addr: A,
        cipher: Arc<Cipher>,
        dispatcher: PacketDispatcher<Client>,
        limits: ConnectionLimits,
    ) -> Result<Arc<Client>> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            error!(error = %e, "{}", constants::ERR_CONNECT_FAILED);
            ProtocolError::Io(e)
        })?;
        Self::start(stream, cipher, dispatcher, limits)
    }

    /// Connect using the address, timeout, limits and key from `config`.
    #[instrument(skip_all, fields(address = %config.client.address))]
    pub async fn connect_with_config(
        config: &NetworkConfig,
        dispatcher: PacketDispatcher<Client>,
    ) -> Result<Arc<Client>> {
        let cipher = Arc::new(config.cipher()?);
        let limits = config.transport.limits();
        let timeout = config.client.connection_timeout;

        match tokio::time::timeout(
            timeout,
            Self::connect_with_limits(config.client.address.as_str(), cipher, dispatcher, limits),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(timeout_ms = timeout.as_millis() as u64, "{}", constants::ERR_CONNECT_FAILED);
                Err(ProtocolError::Timeout)
            }
        }
    }

    fn start(
        stream: TcpStream,
        cipher: Arc<Cipher>,
        dispatcher: PacketDispatcher<Client>,
        limits: ConnectionLimits,
    ) -> Result<Arc<Client>> {
        let metrics = Arc::new(Metrics::new());
        let (conn, frames) =
            Connection::split(stream, Role::Client, cipher, limits, Arc::clone(&metrics))?;
        let client = Arc::new(Client { conn, metrics });

        // The reader only holds a weak handle so dropping the client ends it.
        let weak = Arc::downgrade(&client);
        let conn = Arc::clone(&client.conn);
        tokio::spawn(async move {
            let reader = Arc::clone(&conn);
            reader
                .read_loop(frames, move |message| {
                    let Some(client) = weak.upgrade() else {
                        conn.close_after_flush();
                        return;
                    };
                    match dispatcher.dispatch(&client, message.opcode, &message.payload) {
                        Ok(true) => {}
                        Ok(false) => client.metrics.dispatch_miss(),
                        Err(e) => warn!(error = %e, opcode = %message.opcode, "Dispatch failed"),
                    }
                })
                .await;
            debug!("Client reader finished");
        });

        Ok(client)
    }

    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.conn.peer_addr()
    }

    /// Queue a packet for the server. Safe to call from any thread.
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

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.conn.close_after_flush();
    }
}
