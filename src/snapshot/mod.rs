//! Directory snapshots, diffing, and the on-disk snapshot cache.
//!
//! A cycle takes a fresh [`DirectorySnapshot`] of a root, compares it with
//! the previous one via [`diff`], and persists the result through the
//! [`SnapshotStore`].

mod codec;
mod diff;
mod store;
mod tree;

pub use codec::{decode, encode, FORMAT_VERSION};
pub use diff::{diff, SnapshotDiff};
pub use store::{RootCatalog, SnapshotInfo, SnapshotStore};
pub use tree::{DirectorySnapshot, EntryState, FileIdentity};
