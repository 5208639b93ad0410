//! Statistics for broker connections

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live per-connection counters
///
/// Updated concurrently by the connection's own tasks and by the dispatcher
/// running on other connections, so every field is atomic.
#[derive(Debug)]
pub struct ConnectionStats {
    connected_at: Instant,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    publishes_received: AtomicU64,
    deliveries: AtomicU64,
    dropped_deliveries: AtomicU64,
    encode_failures: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self {
            connected_at: Instant::now(),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            publishes_received: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            dropped_deliveries: AtomicU64::new(0),
            encode_failures: AtomicU64::new(0),
        }
    }

    /// A frame was decoded from the peer
    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame of `bytes` was written and flushed to the peer
    pub fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// The peer published a message
    pub fn record_publish(&self) {
        self.publishes_received.fetch_add(1, Ordering::Relaxed);
    }

    /// A fan-out copy was queued for this connection
    pub fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    /// A fan-out copy was discarded because the outbound queue was full
    pub fn record_dropped(&self) {
        self.dropped_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    /// An outbound message failed to encode and was skipped
    pub fn record_encode_failure(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the connection was accepted
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            publishes_received: self.publishes_received.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            dropped_deliveries: self.dropped_deliveries.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain copy of connection counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Frames decoded from the peer
    pub messages_received: u64,
    /// Frames written to the peer
    pub messages_sent: u64,
    /// Bytes written to the peer
    pub bytes_sent: u64,
    /// PUBLISH messages received from the peer
    pub publishes_received: u64,
    /// Fan-out copies queued for the peer
    pub deliveries: u64,
    /// Fan-out copies dropped on a full queue
    pub dropped_deliveries: u64,
    /// Outbound messages skipped after an encode failure
    pub encode_failures: u64,
}

impl std::ops::Add for StatsSnapshot {
    type Output = StatsSnapshot;

    fn add(self, other: StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            messages_received: self.messages_received + other.messages_received,
            messages_sent: self.messages_sent + other.messages_sent,
            bytes_sent: self.bytes_sent + other.bytes_sent,
            publishes_received: self.publishes_received + other.publishes_received,
            deliveries: self.deliveries + other.deliveries,
            dropped_deliveries: self.dropped_deliveries + other.dropped_deliveries,
            encode_failures: self.encode_failures + other.encode_failures,
        }
    }
}

impl std::iter::Sum for StatsSnapshot {
    fn sum<I: Iterator<Item = StatsSnapshot>>(iter: I) -> Self {
        iter.fold(StatsSnapshot::default(), |acc, s| acc + s)
    }
}
