//! File system watching.
//!
//! This module provides:
//! - Gitignore-style filtering of temp, hidden and backup files
//! - Per-root debounce coalescing of raw events
//! - A single OS watcher shared by every watched root

mod coalescer;
mod filter;
mod manager;
mod stats;

pub use coalescer::{CoalescerHandle, DebounceCoalescer};
pub use filter::{IgnoreFilter, DEFAULT_IGNORE_PATTERNS};
pub use manager::WatchManager;
pub use stats::{WatchStats, WatchStatsSnapshot};
