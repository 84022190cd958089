use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the layer and the flushing task.
///
/// Producers never see delivery problems directly; these counters are how
/// dropped messages become observable.
#[derive(Debug, Default)]
pub struct ShipperStats {
    /// Lines accepted into the buffer.
    pub accepted: AtomicU64,
    /// Messages discarded because the sender was not configured.
    pub dropped_not_ready: AtomicU64,
    /// Messages discarded after the retry cap was reached, or left over
    /// when the final flush on shutdown failed.
    pub dropped_undelivered: AtomicU64,
    /// Batches acknowledged by the collector.
    pub batches_sent: AtomicU64,
    /// Messages contained in acknowledged batches.
    pub messages_sent: AtomicU64,
    /// Failed delivery attempts, retries included.
    pub failed_attempts: AtomicU64,
    /// Messages of the attempt currently awaiting the sender, zero between
    /// attempts.
    pub in_flight: AtomicU64,
}

/// Point-in-time copy of [`ShipperStats`] plus the buffer's eviction count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub evicted: u64,
    pub dropped_not_ready: u64,
    pub dropped_undelivered: u64,
    pub batches_sent: u64,
    pub messages_sent: u64,
    pub failed_attempts: u64,
}

impl ShipperStats {
    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn begin_attempt(&self, messages: usize) {
        self.in_flight.store(messages as u64, Ordering::Relaxed);
    }

    pub(crate) fn end_attempt(&self) {
        self.in_flight.store(0, Ordering::Relaxed);
    }

    /// Move an attempt that will never complete into `dropped_undelivered`.
    pub(crate) fn abandon_in_flight(&self) -> u64 {
        let lost = self.in_flight.swap(0, Ordering::Relaxed);
        self.dropped_undelivered.fetch_add(lost, Ordering::Relaxed);
        lost
    }

    pub fn snapshot(&self, evicted: u64) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            evicted,
            dropped_not_ready: self.dropped_not_ready.load(Ordering::Relaxed),
            dropped_undelivered: self.dropped_undelivered.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
        }
    }
}
