//! Configuration settings and validation.

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Default quiet period before a burst of events triggers a re-diff.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Default minimum time between two persisted snapshots of one root.
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Default number of snapshot files kept per root.
pub const DEFAULT_MAX_SNAPSHOTS: usize = 24;

/// Main configuration for docsync.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for the `SQLite` index and the snapshot cache.
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Directories to keep in sync.
    pub watch_dirs: Vec<PathBuf>,

    /// Quiet period for the debounce coalescer.
    pub debounce: Duration,

    /// Minimum interval between non-forced snapshot saves.
    pub snapshot_interval: Duration,

    /// Snapshot files retained per root.
    pub max_snapshots: usize,

    /// Extra gitignore-style patterns to skip, on top of the built-in list.
    pub ignore_patterns: Vec<String>,

    /// Fragment size (characters) for the text parser.
    pub chunk_size: usize,

    /// Overlap between consecutive fragments (characters).
    pub chunk_overlap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            watch_dirs: Vec::new(),
            debounce: DEFAULT_DEBOUNCE,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            max_snapshots: DEFAULT_MAX_SNAPSHOTS,
            ignore_patterns: Vec::new(),
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.debounce.is_zero() {
            return Err(Error::config("debounce cannot be 0"));
        }

        if self.max_snapshots == 0 {
            return Err(Error::config("max_snapshots cannot be 0"));
        }

        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size cannot be 0"));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::config("data_dir cannot be empty"));
        }

        Ok(())
    }

    /// Get the path to the `SQLite` index file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("docsync.db")
    }

    /// Get the snapshot cache directory.
    #[must_use]
    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }
}
