//! # Endpoints
//!
//! The two roles a connection can play. A [`client::Client`] dispatches
//! inbound messages to registered handlers; a [`session::Session`] is the
//! server's view of one client and forwards messages to the event queue.

pub mod client;
pub mod session;
