//! # Protocol
//!
//! What happens to a frame after it has been decrypted: classification into
//! structured or hard messages, handler dispatch on the client side, and
//! event hand-off to the simulation on the server side.

pub mod decode;
pub mod dispatcher;
pub mod event;

#[cfg(test)]
mod tests;
