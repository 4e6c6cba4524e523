use std::sync::atomic::{AtomicU64, Ordering};

use super::DropReason;

/// Per-mesh counters. Every instance owns its own set.
#[derive(Debug, Default)]
pub(crate) struct MeshMetrics {
    sent: AtomicU64,
    queued: AtomicU64,
    flushed: AtomicU64,
    queue_discarded: AtomicU64,
    relayed: AtomicU64,
    delivered: AtomicU64,
    dropped_malformed: AtomicU64,
    dropped_duplicate: AtomicU64,
    dropped_own: AtomicU64,
    dropped_expired: AtomicU64,
    dropped_unauthenticated: AtomicU64,
    transport_errors: AtomicU64,
}

impl MeshMetrics {
    #[inline]
    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_flushed(&self) {
        self.flushed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_queue_discarded(&self, count: usize) {
        self.queue_discarded
            .fetch_add(u64::try_from(count).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_relayed(&self) {
        self.relayed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_transport_errors(&self, count: usize) {
        self.transport_errors
            .fetch_add(u64::try_from(count).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_drop(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::Malformed => &self.dropped_malformed,
            DropReason::Duplicate => &self.dropped_duplicate,
            DropReason::OwnMessage => &self.dropped_own,
            DropReason::Expired => &self.dropped_expired,
            DropReason::Unauthenticated => &self.dropped_unauthenticated,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            flushed: self.flushed.load(Ordering::Relaxed),
            queue_discarded: self.queue_discarded.load(Ordering::Relaxed),
            relayed: self.relayed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            dropped_duplicate: self.dropped_duplicate.load(Ordering::Relaxed),
            dropped_own: self.dropped_own.load(Ordering::Relaxed),
            dropped_expired: self.dropped_expired.load(Ordering::Relaxed),
            dropped_unauthenticated: self.dropped_unauthenticated.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a mesh's counters.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
    /// Messages handed to at least one transport on first attempt
    pub sent: u64,
    /// Messages placed in the outbound queue
    pub queued: u64,
    /// Queued messages later sent
    pub flushed: u64,
    /// Queued messages dropped by overflow or expiry
    pub queue_discarded: u64,
    /// Inbound messages forwarded to other peers
    pub relayed: u64,
    /// Inbound messages handed to subscribers
    pub delivered: u64,
    /// Frames that failed to parse or decode
    pub dropped_malformed: u64,
    /// Frames whose id was already seen
    pub dropped_duplicate: u64,
    /// Frames carrying this node's own sender id
    pub dropped_own: u64,
    /// Frames past their deadline
    pub dropped_expired: u64,
    /// Frames no known key could open
    pub dropped_unauthenticated: u64,
    /// Individual transport send failures
    pub transport_errors: u64,
}

impl MetricsSnapshot {
    /// All inbound frames dropped for any reason.
    #[must_use]
    pub const fn dropped_total(&self) -> u64 {
        self.dropped_malformed
            + self.dropped_duplicate
            + self.dropped_own
            + self.dropped_expired
            + self.dropped_unauthenticated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_are_independent() {
        let a = MeshMetrics::default();
        let b = MeshMetrics::default();
        a.record_sent();
        a.record_drop(DropReason::Duplicate);
        a.record_drop(DropReason::Expired);
        a.record_queue_discarded(3);

        let snapshot = a.snapshot();
        assert_eq!(snapshot.sent, 1);
        assert_eq!(snapshot.dropped_total(), 2);
        assert_eq!(snapshot.queue_discarded, 3);
        assert_eq!(b.snapshot(), MetricsSnapshot::default());
    }
}
