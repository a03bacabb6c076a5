//! docsync
//!
//! Keeps a relational file index, a snapshot cache and an external vector
//! store in sync with one or more watched directory trees.
//!
//! Filesystem events are debounced per root; each quiet period triggers a
//! full snapshot, a diff against the previous snapshot, and the
//! propagation of created, modified, moved and deleted files into the
//! stores. See [`sync::SyncEngine`] for the entry point.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod collab;
pub mod config;
pub mod error;
pub mod observability;
pub mod paths;
pub mod snapshot;
pub mod storage;
pub mod sync;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
pub use sync::SyncEngine;
