//! # Connection
//!
//! One TCP socket, one [`Cipher`], one outbound FIFO.
//!
//! The socket is split on construction. The read half is returned to the
//! caller as a [`FramedRead`] and driven by [`Connection::read_loop`], so at
//! most one read is ever outstanding. The write half lives inside the
//! connection and is only touched by the drain task, which is started by the
//! first [`Connection::send_packet`] on an idle connection and runs until the
//! queue is empty. That gives one write in flight and FIFO order.
//!
//! Lifetimes are shared: the read task, the drain task and every user handle
//! hold an `Arc<Connection>`, and the socket is released once the last one
//! goes away after [`Connection::close`]. [`Connection::close_after_flush`]
//! lets an owner walk away without losing packets it already queued.

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::core::codec::{FrameCodec, LENGTH_PREFIX_SIZE, MAX_BODY_SIZE};
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::protocol::decode::{decode_payload, DecodedMessage};
use crate::utils::crypto::Cipher;
use crate::utils::metrics::Metrics;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier, rendered as `conn-N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Per-connection size and queue limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Largest encrypted body accepted or sent.
    pub max_body_size: usize,
    /// Outbound queue depth at which `send_packet` starts refusing.
    pub max_pending_packets: usize,
    /// Outbound queue depth that triggers a warning.
    pub pending_high_water: usize,
}

impl ConnectionLimits {
    /// Copy with `max_body_size` lowered to [`MAX_BODY_SIZE`] if above it.
    pub fn clamped(self) -> Self {
        if self.max_body_size > MAX_BODY_SIZE {
            warn!(
                requested = self.max_body_size,
                max = MAX_BODY_SIZE,
                "Body size limit above protocol maximum, clamping"
            );
        }
        Self {
            max_body_size: self.max_body_size.min(MAX_BODY_SIZE),
            ..self
        }
    }
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_body_size: MAX_BODY_SIZE,
            max_pending_packets: 1024,
            pending_high_water: 256,
        }
    }
}

/// Which end of the conversation this connection is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Session,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Session => f.write_str("session"),
        }
    }
}

#[derive(Default)]
struct Outbound {
    queue: VecDeque<Packet>,
    writing: bool,
    close_when_drained: bool,
}

type FrameWriter = FramedWrite<OwnedWriteHalf, FrameCodec>;

/// Reader half handed back by [`Connection::split`].
pub type FrameReader = FramedRead<OwnedReadHalf, FrameCodec>;

pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    role: Role,
    cipher: Arc<Cipher>,
    limits: ConnectionLimits,
    writer: tokio::sync::Mutex<Option<FrameWriter>>,
    outbound: Mutex<Outbound>,
    closed: AtomicBool,
    writes_in_flight: AtomicUsize,
    peak_writes_in_flight: AtomicUsize,
    shutdown: CancellationToken,
    runtime: Handle,
    metrics: Arc<Metrics>,
}

impl Connection {
    /// Take ownership of a connected socket.
    ///
    /// Must be called inside a Tokio runtime. That runtime runs every write
    /// for this connection, even when `send_packet` is called from elsewhere.
    pub fn split(
        stream: TcpStream,
        role: Role,
        cipher: Arc<Cipher>,
        limits: ConnectionLimits,
        metrics: Arc<Metrics>,
    ) -> Result<(Arc<Self>, FrameReader)> {
        let runtime = Handle::try_current().map_err(|e| ProtocolError::Custom(e.to_string()))?;
        let limits = limits.clamped();
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        let codec = FrameCodec::new(limits.max_body_size);

        let conn = Arc::new(Self {
            id: ConnectionId::next(),
            peer,
            role,
            cipher,
            limits,
            writer: tokio::sync::Mutex::new(Some(FramedWrite::new(write_half, codec.clone()))),
            outbound: Mutex::new(Outbound::default()),
            closed: AtomicBool::new(false),
            writes_in_flight: AtomicUsize::new(0),
            peak_writes_in_flight: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
            runtime,
            metrics,
        });

        conn.metrics.connection_established();
        info!(conn = %conn.id, peer = %peer, role = %role, "Connection opened");
        Ok((conn, FramedRead::new(read_half, codec)))
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn limits(&self) -> ConnectionLimits {
        self.limits
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Packets queued but not yet written.
    pub fn pending_packets(&self) -> usize {
        self.outbound.lock().queue.len()
    }

    /// Highest number of socket writes ever outstanding at once. Stays at 1
    /// once anything has been sent.
    pub fn peak_writes_in_flight(&self) -> usize {
        self.peak_writes_in_flight.load(Ordering::Acquire)
    }

    /// Queue `packet` for delivery.
    ///
    /// Returns once the packet is queued, not when it is written. Fails with
    /// `ConnectionClosed` after [`close`](Self::close), `OversizedPacket` if
    /// the encrypted body would exceed the frame limit, and `Backpressure`
    /// when the outbound queue is full.
    pub fn send_packet(self: &Arc<Self>, packet: Packet) -> Result<()> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }

        let encrypted_len = Cipher::ciphertext_len(packet.len());
        if encrypted_len > self.limits.max_body_size {
            return Err(ProtocolError::OversizedPacket(encrypted_len));
        }

        let start_drain = {
            let mut outbound = self.outbound.lock();
            let depth = outbound.queue.len();
            if depth >= self.limits.max_pending_packets {
                self.metrics.backpressure_rejection();
                warn!(conn = %self.id, pending = depth, "Outbound queue full, rejecting packet");
                return Err(ProtocolError::Backpressure(depth));
            }

            outbound.queue.push_back(packet);
            if outbound.queue.len() == self.limits.pending_high_water {
                warn!(
                    conn = %self.id,
                    pending = self.limits.pending_high_water,
                    "Outbound queue reached high-water mark"
                );
            }

            !std::mem::replace(&mut outbound.writing, true)
        };

        if start_drain {
            let conn = Arc::clone(self);
            self.runtime.spawn(async move { conn.drain().await });
        }
        Ok(())
    }

    /// Write queued packets one at a time until the queue is empty.
    async fn drain(self: Arc<Self>) {
        let mut close_now = false;
        loop {
            let packet = {
                let mut outbound = self.outbound.lock();
                match outbound.queue.pop_front() {
                    Some(packet) if !self.is_closed() => packet,
                    _ => {
                        outbound.writing = false;
                        close_now = outbound.close_when_drained;
                        break;
                    }
                }
            };

            if let Err(e) = self.write_one(&packet).await {
                match e {
                    ProtocolError::EncryptionFailure => self.metrics.crypto_error(),
                    _ => self.metrics.connection_error(),
                }
                error!(conn = %self.id, error = %e, "Write failed, closing connection");
                self.close();
            }
        }

        if close_now {
            debug!(conn = %self.id, "Outbound queue flushed, closing");
            self.close();
        }
        if self.is_closed() {
            self.writer.lock().await.take();
        }
    }

    async fn write_one(&self, packet: &Packet) -> Result<()> {
        let body = self.cipher.encrypt(packet.body())?;
        let wire_len = body.len() + LENGTH_PREFIX_SIZE;

        let mut writer = self.writer.lock().await;
        let Some(framed) = writer.as_mut() else {
            return Err(ProtocolError::ConnectionClosed);
        };

        let in_flight = self.writes_in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_writes_in_flight.fetch_max(in_flight, Ordering::AcqRel);
        let sent = framed.send(Bytes::from(body)).await;
        self.writes_in_flight.fetch_sub(1, Ordering::AcqRel);
        sent?;

        self.metrics.message_sent(wire_len as u64);
        trace!(conn = %self.id, bytes = wire_len, "Frame written");
        Ok(())
    }

    /// Close the connection. Idempotent.
    ///
    /// Queued packets are discarded and the read loop stops at its next
    /// suspension point.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shutdown.cancel();
        let abandoned = {
            let mut outbound = self.outbound.lock();
            let n = outbound.queue.len();
            outbound.queue.clear();
            n
        };
        // A drain task holding the lock releases the writer itself.
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }

        self.metrics.connection_closed();
        info!(conn = %self.id, peer = %self.peer, abandoned, "Connection closed");
    }

    /// Close once every packet already queued has been written.
    ///
    /// Closes immediately when nothing is being written. Otherwise the drain
    /// task closes the connection after the queue empties.
    pub fn close_after_flush(&self) {
        if self.is_closed() {
            return;
        }

        let idle = {
            let mut outbound = self.outbound.lock();
            if outbound.writing {
                outbound.close_when_drained = true;
            }
            !outbound.writing
        };
        if idle {
            self.close();
        } else {
            debug!(conn = %self.id, pending = self.pending_packets(), "Closing after flush");
        }
    }

    /// Read, decrypt and classify frames until the peer goes away or a fatal
    /// error occurs, handing each message to `deliver`.
    ///
    /// Malformed payloads are logged and skipped. The connection is closed
    /// when the loop ends.
    #[instrument(skip_all, fields(conn = %self.id))]
    pub async fn read_loop<F>(self: &Arc<Self>, mut frames: FrameReader, mut deliver: F)
    where
        F: FnMut(DecodedMessage),
    {
        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = frames.next() => next,
            };

            let frame: BytesMut = match next {
                Some(Ok(frame)) => frame,
                Some(Err(ProtocolError::OversizedPacket(len))) => {
                    self.metrics.framing_error();
                    error!(declared = len, "Declared length exceeds limit, closing connection");
                    break;
                }
                Some(Err(e)) => {
                    self.metrics.connection_error();
                    debug!(error = %e, "Read failed");
                    break;
                }
                None => {
                    debug!("Peer closed connection");
                    break;
                }
            };

            self.metrics
                .message_received((frame.len() + LENGTH_PREFIX_SIZE) as u64);

            let plain = match self.cipher.decrypt(&frame) {
                Ok(plain) => plain,
                Err(e) => {
                    self.metrics.crypto_error();
                    error!(error = %e, len = frame.len(), "Decryption failed, closing connection");
                    break;
                }
            };

            match decode_payload(Bytes::from(plain)) {
                Ok(message) => deliver(message),
                Err(e) => {
                    self.metrics.malformed_payload();
                    error!(error = %e, "Dropping malformed payload");
                }
            }
        }

        self.close();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("role", &self.role)
            .field("closed", &self.is_closed())
            .finish()
    }
}
