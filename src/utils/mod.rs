//! # Utility Modules
//!
//! Supporting utilities for cryptography, queues, background work, logging
//! and metrics.
//!
//! ## Components
//! - **Crypto**: AES-256-CBC packet cipher with a pre-shared key and IV
//! - **Queue**: blocking/non-blocking MPMC FIFO for handing events across threads
//! - **Thread Pool**: fixed worker threads with result handles
//! - **Logging**: `tracing` subscriber backed by an ordered background writer
//! - **Metrics**: thread-safe observability counters
//!
//! ## Security
//! - Key material is zeroed when a cipher is dropped (zeroize crate)
//! - Random keys come from the OS RNG (getrandom)

pub mod crypto;
pub mod logging;
pub mod metrics;
pub mod queue;
pub mod thread_pool;

pub use metrics::{Metrics, MetricsSnapshot};
pub use queue::ThreadSafeQueue;
pub use thread_pool::{TaskHandle, ThreadPool};
