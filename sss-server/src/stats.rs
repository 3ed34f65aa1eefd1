//! # Server Statistics
//!
//! Provide lightweight counters describing what the server did: connections
//! accepted and answered, bytes moved through the shared store, timer ticks.
//!
//! ## Design Principles
//! 1. **Accumulator Pattern**: Use atomic counters to aggregate events cheaply.
//! 2. **Zero-Cost Access**: Expose snapshots as plain structs without heap work.
//! 3. **Off The Lock**: Recording never touches the store guard or the registry.
//!
//! ## Notes
//! - `Ordering::Relaxed` is sufficient because no counter is used to
//!   synchronize other memory, only reported.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of all server counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Connections accepted and handed to a worker.
    pub connections_accepted: u64,
    /// Connections whose upload ended with a terminator and got a reply.
    pub connections_replied: u64,
    /// Connections that closed or failed before sending a terminator.
    pub connections_unterminated: u64,
    /// Connections or workers dropped because a thread could not be spawned.
    pub spawn_failures: u64,
    /// Client bytes appended to the shared store.
    pub bytes_appended: u64,
    /// Store bytes sent back to clients.
    pub bytes_sent: u64,
    /// Timestamp records appended by the timer.
    pub timestamps_written: u64,
    /// Connection workers currently running.
    pub inflight: u64,
}

/// Thread-safe counters shared by every worker.
#[derive(Debug, Default)]
pub struct ServerStats {
    connections_accepted: AtomicU64,
    connections_replied: AtomicU64,
    connections_unterminated: AtomicU64,
    spawn_failures: AtomicU64,
    bytes_appended: AtomicU64,
    bytes_sent: AtomicU64,
    timestamps_written: AtomicU64,
    inflight: AtomicU64,
}

impl ServerStats {
    /// Creates a zeroed stats accumulator.
    pub fn new() -> Self {
        ServerStats::default()
    }

    /// Records a connection handed to a new worker.
    pub fn record_connection_start(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.inflight.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the end of a connection worker.
    pub fn record_connection_end(&self, replied: bool) {
        self.inflight.fetch_sub(1, Ordering::Relaxed);
        if replied {
            self.connections_replied.fetch_add(1, Ordering::Relaxed);
        } else {
            self.connections_unterminated.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a connection dropped because its worker could not start.
    pub fn record_spawn_failure(&self) {
        self.spawn_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records bytes appended to the shared store.
    pub fn record_appended(&self, bytes: usize) {
        self.bytes_appended.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Records bytes sent back to a client.
    pub fn record_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Records one timestamp line written by the timer.
    pub fn record_timestamp(&self) {
        self.timestamps_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_replied: self.connections_replied.load(Ordering::Relaxed),
            connections_unterminated: self.connections_unterminated.load(Ordering::Relaxed),
            spawn_failures: self.spawn_failures.load(Ordering::Relaxed),
            bytes_appended: self.bytes_appended.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            timestamps_written: self.timestamps_written.load(Ordering::Relaxed),
            inflight: self.inflight.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_connection_outcomes() {
        let stats = ServerStats::new();
        stats.record_connection_start();
        stats.record_connection_start();
        assert_eq!(stats.snapshot().inflight, 2);

        stats.record_appended(6);
        stats.record_sent(12);
        stats.record_connection_end(true);
        stats.record_connection_end(false);

        let snap = stats.snapshot();
        assert_eq!(snap.connections_accepted, 2);
        assert_eq!(snap.connections_replied, 1);
        assert_eq!(snap.connections_unterminated, 1);
        assert_eq!(snap.inflight, 0);
        assert_eq!(snap.bytes_appended, 6);
        assert_eq!(snap.bytes_sent, 12);
    }
}
