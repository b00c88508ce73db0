//! Merging listener statistics

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one merging listener
#[derive(Debug, Default)]
pub struct ListenerStats {
    pub events_received: AtomicU64,
    pub events_forwarded: AtomicU64,
    pub calls_queued: AtomicU64,
    pub events_coalesced: AtomicU64,
    pub calls_replayed: AtomicU64,
    pub empty_calls_skipped: AtomicU64,
    pub replay_failures: AtomicU64,
    pub drains: AtomicU64,
    pub resets: AtomicU64,
    pub calls_discarded: AtomicU64,
    pub retention_failures: AtomicU64,
}

impl ListenerStats {
    pub fn snapshot(&self) -> ListenerStatsSnapshot {
        ListenerStatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_forwarded: self.events_forwarded.load(Ordering::Relaxed),
            calls_queued: self.calls_queued.load(Ordering::Relaxed),
            events_coalesced: self.events_coalesced.load(Ordering::Relaxed),
            calls_replayed: self.calls_replayed.load(Ordering::Relaxed),
            empty_calls_skipped: self.empty_calls_skipped.load(Ordering::Relaxed),
            replay_failures: self.replay_failures.load(Ordering::Relaxed),
            drains: self.drains.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            calls_discarded: self.calls_discarded.load(Ordering::Relaxed),
            retention_failures: self.retention_failures.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerStatsSnapshot {
    pub events_received: u64,
    pub events_forwarded: u64,
    pub calls_queued: u64,
    pub events_coalesced: u64,
    pub calls_replayed: u64,
    pub empty_calls_skipped: u64,
    pub replay_failures: u64,
    pub drains: u64,
    pub resets: u64,
    pub calls_discarded: u64,
    pub retention_failures: u64,
}
