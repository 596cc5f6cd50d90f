//! # Error Types
//!
//! Error handling for the hybrid protocol core.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side is
//! [`ProtocolError`].
//!
//! ## Error Categories
//! - **Framing**: a peer declared a body larger than the frame limit
//! - **I/O**: socket read/write failures
//! - **Cryptographic**: AES-CBC encryption/decryption or key material failures
//! - **Payload**: a decrypted message too short for its fixed layout
//! - **Local**: backpressure, closed connections, configuration, task failures
//!
//! Framing, I/O and cryptographic failures are fatal for the connection they
//! occur on. Payload errors only drop the offending message. A missing handler
//! is not an error at all: the dispatcher reports it as `Ok(false)`.
//!
//! ## Example Usage
//! ```rust
//! use hybrid_protocol::error::{ProtocolError, Result};
//! use hybrid_protocol::utils::crypto::Cipher;
//! use tracing::error;
//!
//! fn open(cipher: &Cipher, body: &[u8]) -> Result<Vec<u8>> {
//!     cipher.decrypt(body)
//! }
//!
//! let cipher = Cipher::new([1; 32], [2; 16]);
//! match open(&cipher, &[0u8; 5]) {
//!     Err(e @ ProtocolError::DecryptionFailure) => error!(error = %e, "Dropping peer"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Thread pool errors
    pub const ERR_POOL_SHUT_DOWN: &str = "Thread pool is shut down";
    pub const ERR_TASK_ABANDONED: &str = "Task panicked or was dropped before completing";
    pub const ERR_ZERO_WORKERS: &str = "Thread pool needs at least one worker";

    /// Connection errors
    pub const ERR_CONNECT_FAILED: &str = "Connect failed";
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
}

/// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Encryption failed")]
    EncryptionFailure,

    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// A decrypted payload is shorter than the layout its opcode requires.
    /// `opcode` is 0 when the payload cannot even hold an opcode.
    #[error("Malformed payload for opcode {opcode}: expected at least {expected} bytes, got {actual}")]
    MalformedPayload {
        opcode: u16,
        expected: usize,
        actual: usize,
    },

    #[error("Opcode {0} is not valid for this message kind")]
    InvalidOpcode(u16),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Outbound queue full: {0} packets pending")]
    Backpressure(usize),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether this error terminates the connection it was raised on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::OversizedPacket(_)
                | ProtocolError::EncryptionFailure
                | ProtocolError::DecryptionFailure
                | ProtocolError::ConnectionClosed
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
