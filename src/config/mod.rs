//! Configuration management for docsync.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables (`DOCSYNC_*`)
//! - Built-in defaults

mod settings;

pub use settings::{Config, DEFAULT_DEBOUNCE, DEFAULT_MAX_SNAPSHOTS, DEFAULT_SNAPSHOT_INTERVAL};
