//! # Hybrid Protocol
//!
//! Encrypted, length-framed binary messaging for game clients and servers.
//!
//! Every frame on the wire is a 4-byte little-endian length followed by an
//! AES-256-CBC encrypted body. Decrypted bodies start with a 16-bit opcode:
//! values below 1000 are *structured* messages (bincode fields after the
//! opcode), values from 1000 up are *hard* messages with a fixed byte layout
//! for high-frequency traffic such as movement.
//!
//! ## Roles
//! - [`Server`] accepts connections and turns each into a [`Session`]. Every
//!   inbound message becomes a [`GameEvent`] on a shared [`EventQueue`] that
//!   the simulation drains, typically from a [`ThreadPool`].
//! - [`Client`] connects to a server and routes inbound messages through a
//!   [`PacketDispatcher`].
//!
//! Both roles send with `send_packet`, which queues the packet and returns;
//! one write per connection is in flight at a time and order is preserved.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hybrid_protocol::prelude::*;
//!
//! # async fn demo() -> hybrid_protocol::error::Result<()> {
//! let cipher = Arc::new(Cipher::generate()?);
//! let events = Arc::new(EventQueue::new());
//! let server = Server::bind("127.0.0.1:7777", cipher.clone(), events.clone()).await?;
//! tokio::spawn(server.run());
//!
//! let client = Client::connect("127.0.0.1:7777", cipher, PacketDispatcher::new()).await?;
//! client.send_packet(Packet::from_hard(&MovePacket::new(7, 1.0, 2.0, 3.0)))?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::core::opcode::{MessageKind, Opcode};
pub use crate::core::packet::{HardPacket, MovePacket, Packet};
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::dispatcher::{PacketDispatcher, PacketHandler};
pub use crate::protocol::event::{EventQueue, GameEvent};
pub use crate::service::client::Client;
pub use crate::service::session::Session;
pub use crate::transport::server::Server;
pub use crate::utils::crypto::Cipher;
pub use crate::utils::thread_pool::ThreadPool;

/// Everything needed to stand up a client or server.
pub mod prelude {
    pub use crate::config::NetworkConfig;
    pub use crate::core::opcode::{MessageKind, Opcode};
    pub use crate::core::packet::{HardPacket, MovePacket, Packet};
    pub use crate::error::{ProtocolError, Result};
    pub use crate::protocol::dispatcher::PacketDispatcher;
    pub use crate::protocol::event::{EventQueue, GameEvent};
    pub use crate::service::client::Client;
    pub use crate::service::session::Session;
    pub use crate::transport::connection::ConnectionLimits;
    pub use crate::transport::server::Server;
    pub use crate::utils::crypto::Cipher;
    pub use crate::utils::thread_pool::ThreadPool;
}
