//! Error types and Result aliases for docsync.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use thiserror::Error;

/// Result type alias using docsync's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for docsync operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Relational index error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Snapshot cache error.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// File watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Change propagation error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Parser or vector store collaborator error.
    #[error("collaborator error: {0}")]
    Collab(#[from] CollabError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// `SQLite` database error.
    #[error("database error: {0}")]
    Database(String),

    /// Record not found.
    #[error("not found: {entity} with id '{id}'")]
    NotFound { entity: &'static str, id: String },

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A serialized column could not be encoded or decoded.
    #[error("invalid column '{column}': {reason}")]
    Column { column: &'static str, reason: String },
}

/// Snapshot cache errors.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Directory walk failed at the root itself.
    #[error("cannot snapshot '{path}': {reason}")]
    Walk { path: String, reason: String },

    /// A stored snapshot could not be decoded.
    #[error("corrupt snapshot '{path}': {reason}")]
    Decode { path: String, reason: String },

    /// A snapshot timestamp that does not name a snapshot file.
    #[error("invalid snapshot stamp '{0}'")]
    InvalidStamp(String),

    /// A stored snapshot was written by an unknown format version.
    #[error("unsupported snapshot format version {0}")]
    UnsupportedVersion(u32),
}

/// File watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to watch path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// Invalid ignore pattern.
    #[error("invalid ignore pattern: {0}")]
    Pattern(String),
}

/// Errors raised while propagating a diff into the stores.
#[derive(Error, Debug)]
pub enum SyncError {
    /// More than one index row claims the same normalized path.
    #[error("index corruption: {count} records share path '{path}', reset the index")]
    AmbiguousPath { path: String, count: usize },

    /// Vector store and index disagree after a partial failure.
    #[error("stores diverged for '{path}': {reason}")]
    CrossStore { path: String, reason: String },

    /// A root is not being watched.
    #[error("root '{0}' is not loaded")]
    NotLoaded(String),

    /// A session was asked to move between incompatible states.
    #[error("invalid session transition {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
}

/// Parser and vector store collaborator errors.
#[derive(Error, Debug)]
pub enum CollabError {
    /// Content parsing failed.
    #[error("failed to parse '{path}': {reason}")]
    Parse { path: String, reason: String },

    /// Vector store rejected an operation.
    #[error("vector store error: {0}")]
    VectorStore(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error means the target record does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::NotFound { .. }))
    }
}

impl StorageError {
    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.into())
    }
}
