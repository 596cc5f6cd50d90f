//! Observability and Metrics
//!
//! Counters for connection and message activity. A [`Server`] or [`Client`]
//! owns one `Arc<Metrics>` and shares it with every connection it creates,
//! so counts are scoped to that endpoint rather than the whole process.
//!
//! Uses atomic counters for thread-safe metrics collection.
//!
//! [`Server`]: crate::transport::server::Server
//! [`Client`]: crate::service::client::Client

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

#[derive(Debug)]
pub struct Metrics {
    /// Total connections established
    pub connections_total: AtomicU64,
    /// Currently open connections
    pub connections_active: AtomicU64,
    /// Frames written
    pub messages_sent: AtomicU64,
    /// Frames read
    pub messages_received: AtomicU64,
    /// Bytes written, length prefix included
    pub bytes_sent: AtomicU64,
    /// Bytes read, length prefix included
    pub bytes_received: AtomicU64,
    /// Connections ended by socket errors
    pub connection_errors: AtomicU64,
    /// Connections ended by an oversized length prefix
    pub framing_errors: AtomicU64,
    /// Connections ended by encryption or decryption failures
    pub crypto_errors: AtomicU64,
    /// Payloads dropped for being shorter than their layout
    pub malformed_payloads: AtomicU64,
    /// Payloads with no registered handler
    pub dispatch_misses: AtomicU64,
    /// `send_packet` calls refused because the outbound queue was full
    pub backpressure_rejections: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            framing_errors: AtomicU64::new(0),
            crypto_errors: AtomicU64::new(0),
            malformed_payloads: AtomicU64::new(0),
            dispatch_misses: AtomicU64::new(0),
            backpressure_rejections: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self, byte_count: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn message_received(&self, byte_count: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn framing_error(&self) {
        self.framing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn crypto_error(&self) {
        self.crypto_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_payload(&self) {
        self.malformed_payloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatch_miss(&self) {
        self.dispatch_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn backpressure_rejection(&self) {
        self.backpressure_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            crypto_errors: self.crypto_errors.load(Ordering::Relaxed),
            malformed_payloads: self.malformed_payloads.load(Ordering::Relaxed),
            dispatch_misses: self.dispatch_misses.load(Ordering::Relaxed),
            backpressure_rejections: self.backpressure_rejections.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            messages_sent = snapshot.messages_sent,
            messages_received = snapshot.messages_received,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            connection_errors = snapshot.connection_errors,
            framing_errors = snapshot.framing_errors,
            crypto_errors = snapshot.crypto_errors,
            malformed_payloads = snapshot.malformed_payloads,
            dispatch_misses = snapshot.dispatch_misses,
            backpressure_rejections = snapshot.backpressure_rejections,
            uptime_seconds = snapshot.uptime_seconds,
            "Protocol metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub connection_errors: u64,
    pub framing_errors: u64,
    pub crypto_errors: u64,
    pub malformed_payloads: u64,
    pub dispatch_misses: u64,
    pub backpressure_rejections: u64,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_counters() {
        let metrics = Metrics::new();
        metrics.connection_established();
        metrics.connection_established();
        metrics.connection_closed();
        let snap = metrics.snapshot();
        assert_eq!(snap.connections_total, 2);
        assert_eq!(snap.connections_active, 1);
    }

    #[test]
    fn test_message_counters() {
        let metrics = Metrics::new();
        metrics.message_sent(20);
        metrics.message_received(36);
        metrics.message_received(4);
        let snap = metrics.snapshot();
        assert_eq!(snap.messages_sent, 1);
        assert_eq!(snap.bytes_sent, 20);
        assert_eq!(snap.messages_received, 2);
        assert_eq!(snap.bytes_received, 40);
    }
}
