//! Counters for messages that never reached a mailbox.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals kept by the registry. Only ever incremented.
#[derive(Debug, Default)]
pub(crate) struct DeliveryStats {
    dropped: AtomicU64,
    orphaned: AtomicU64,
}

impl DeliveryStats {
    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_orphaned(&self) {
        self.orphaned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn report(&self) -> DeliveryReport {
        DeliveryReport {
            dropped: self.dropped.load(Ordering::Relaxed),
            orphaned: self.orphaned.load(Ordering::Relaxed),
        }
    }
}

/// A snapshot of the registry's delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Messages discarded because the target mailbox was full.
    pub dropped: u64,
    /// Messages discarded because nobody was draining the mailbox any more
    /// (the transport released its receive end before disconnecting).
    pub orphaned: u64,
}
