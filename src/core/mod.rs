//! # Core Protocol Components
//!
//! Wire-level types shared by clients and servers.
//!
//! ## Components
//! - **Opcode**: 16-bit message identifier whose range selects the format
//! - **Packet**: immutable plaintext message body, plus fixed-layout hard packets
//! - **Serialization**: the structured-message envelope
//! - **Codec**: Tokio codec for length-prefixed framing
//!
//! ## Wire Format
//! ```text
//! [Length(4)] [AES-256-CBC(Payload)(Length)]
//! Payload = [Opcode(2)] [structured fields | fixed layout]
//! ```
//!
//! ## Security
//! - Maximum encrypted body: 64 KiB, checked before allocation
//! - No integrity protection: CBC with a pre-shared key and IV

pub mod codec;
pub mod opcode;
pub mod packet;
pub mod serialization;
