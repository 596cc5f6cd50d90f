//! # Transport
//!
//! TCP plumbing: the per-socket [`connection::Connection`] state machine and
//! the accepting [`server::Server`].

pub mod connection;
pub mod server;
