//! Relay metrics tracking.
//!
//! Provides atomic counters for monitoring the relay.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Metrics for the relay.
#[derive(Debug)]
pub struct RelayMetrics {
    /// Total connections opened.
    connections_opened: AtomicU64,

    /// Total connections closed.
    connections_closed: AtomicU64,

    /// Upgrade requests turned away by the gate.
    upgrades_rejected: AtomicU64,

    /// Total frames received from peers.
    messages_received: AtomicU64,

    /// Total frames queued to peers by broadcasts.
    messages_delivered: AtomicU64,

    /// Peers dropped because a broadcast send failed.
    stale_dropped: AtomicU64,

    /// Total transport errors.
    errors: AtomicU64,

    /// Start time for uptime.
    start_time: Instant,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayMetrics {
    /// Creates a new metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            upgrades_rejected: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            stale_dropped: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Records a connection opened.
    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a connection closed.
    pub fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a rejected upgrade.
    pub fn record_upgrade_rejected(&self) {
        self.upgrades_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a frame received.
    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records frames queued by a broadcast.
    pub fn record_delivered(&self, count: usize) {
        self.messages_delivered
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Records peers dropped by a broadcast.
    pub fn record_stale_dropped(&self, count: usize) {
        self.stale_dropped.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Records an error.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the total connections opened.
    #[must_use]
    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }

    /// Returns the total connections closed.
    #[must_use]
    pub fn connections_closed(&self) -> u64 {
        self.connections_closed.load(Ordering::Relaxed)
    }

    /// Returns the current active connections.
    #[must_use]
    pub fn active_connections(&self) -> u64 {
        self.connections_opened()
            .saturating_sub(self.connections_closed())
    }

    /// Returns the rejected upgrades.
    #[must_use]
    pub fn upgrades_rejected(&self) -> u64 {
        self.upgrades_rejected.load(Ordering::Relaxed)
    }

    /// Returns the total frames received.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Returns the total frames delivered.
    #[must_use]
    pub fn messages_delivered(&self) -> u64 {
        self.messages_delivered.load(Ordering::Relaxed)
    }

    /// Returns the stale peers dropped.
    #[must_use]
    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped.load(Ordering::Relaxed)
    }

    /// Returns the total errors.
    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns the uptime.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> RelayMetricsSnapshot {
        RelayMetricsSnapshot {
            connections_opened: self.connections_opened(),
            connections_closed: self.connections_closed(),
            active_connections: self.active_connections(),
            upgrades_rejected: self.upgrades_rejected(),
            messages_received: self.messages_received(),
            messages_delivered: self.messages_delivered(),
            stale_dropped: self.stale_dropped(),
            errors: self.errors(),
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

/// Point-in-time copy of [`RelayMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayMetricsSnapshot {
    /// Connections opened.
    pub connections_opened: u64,
    /// Connections closed.
    pub connections_closed: u64,
    /// Active connections.
    pub active_connections: u64,
    /// Rejected upgrades.
    pub upgrades_rejected: u64,
    /// Frames received.
    pub messages_received: u64,
    /// Frames delivered.
    pub messages_delivered: u64,
    /// Stale peers dropped.
    pub stale_dropped: u64,
    /// Errors.
    pub errors: u64,
    /// Uptime in seconds.
    pub uptime_secs: u64,
}
