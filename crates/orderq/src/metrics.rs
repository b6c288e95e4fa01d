use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe queue counters.
///
/// Only updated when [`Config::enable_metrics`](crate::Config) is set. All
/// counters use relaxed ordering; they are statistics, not synchronization.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    reservations: AtomicU64,
    items_reserved: AtomicU64,
    full_rejections: AtomicU64,
    reserve_retries: AtomicU64,
    items_committed: AtomicU64,
    commit_waits: AtomicU64,
    items_read: AtomicU64,
    empty_reads: AtomicU64,
}

/// Point-in-time copy of the queue counters, from
/// [`Queue::metrics`](crate::Queue::metrics).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Successful reservations (count > 0).
    pub reservations: u64,
    /// Slots granted across all reservations.
    pub items_reserved: u64,
    /// Reservations refused because the queue was full.
    pub full_rejections: u64,
    /// CAS failures on `writer_head` (another producer raced ahead).
    pub reserve_retries: u64,
    /// Items published by commits.
    pub items_committed: u64,
    /// Backoff rounds spent waiting for earlier tickets to commit.
    pub commit_waits: u64,
    /// Items handed to the consumer.
    pub items_read: u64,
    /// Reads that found nothing committed.
    pub empty_reads: u64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add_reservation(&self, granted: u64) {
        self.reservations.fetch_add(1, Ordering::Relaxed);
        self.items_reserved.fetch_add(granted, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_full_rejection(&self) {
        self.full_rejections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_reserve_retries(&self, n: u64) {
        self.reserve_retries.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_committed(&self, n: u64, waits: u64) {
        self.items_committed.fetch_add(n, Ordering::Relaxed);
        self.commit_waits.fetch_add(waits, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_read(&self, n: u64) {
        if n == 0 {
            self.empty_reads.fetch_add(1, Ordering::Relaxed);
        } else {
            self.items_read.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Returns a copy of the current counter values.
    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reservations: self.reservations.load(Ordering::Relaxed),
            items_reserved: self.items_reserved.load(Ordering::Relaxed),
            full_rejections: self.full_rejections.load(Ordering::Relaxed),
            reserve_retries: self.reserve_retries.load(Ordering::Relaxed),
            items_committed: self.items_committed.load(Ordering::Relaxed),
            commit_waits: self.commit_waits.load(Ordering::Relaxed),
            items_read: self.items_read.load(Ordering::Relaxed),
            empty_reads: self.empty_reads.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Committed items the consumer has not read yet, as far as the counters know.
    pub fn backlog(&self) -> u64 {
        self.items_committed.saturating_sub(self.items_read)
    }
}
