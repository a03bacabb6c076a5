//! Watch and sync-cycle counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the watch manager and the sync engine.
#[derive(Debug, Default)]
pub struct WatchStats {
    pub events_seen: AtomicU64,
    pub events_ignored: AtomicU64,
    pub cycles_run: AtomicU64,
    pub cycles_unchanged: AtomicU64,
    pub cycles_failed: AtomicU64,
}

impl WatchStats {
    /// Create new stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_event(&self, ignored: bool) {
        if ignored {
            self.events_ignored.fetch_add(1, Ordering::Relaxed);
        } else {
            self.events_seen.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count one finished cycle.
    pub(crate) fn record_cycle(&self, unchanged: bool) {
        self.cycles_run.fetch_add(1, Ordering::Relaxed);
        if unchanged {
            self.cycles_unchanged.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_cycle_failed(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> WatchStatsSnapshot {
        WatchStatsSnapshot {
            events_seen: self.events_seen.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            cycles_run: self.cycles_run.load(Ordering::Relaxed),
            cycles_unchanged: self.cycles_unchanged.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`WatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStatsSnapshot {
    /// Raw events that reached a coalescer.
    pub events_seen: u64,
    /// Raw events dropped by the ignore filter.
    pub events_ignored: u64,
    /// Cycles that completed, changed or not.
    pub cycles_run: u64,
    /// Cycles that found nothing to do.
    pub cycles_unchanged: u64,
    /// Cycles aborted because the root could not be walked.
    pub cycles_failed: u64,
}
