//! Point-in-time listings of a directory tree.

use std::collections::BTreeMap;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::error::SnapshotError;
use crate::watcher::IgnoreFilter;
use crate::Result;

/// Device and inode of a file, stable across renames on one filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileIdentity {
    pub dev: u64,
    pub ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn from_metadata(meta: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    #[cfg(not(unix))]
    fn from_metadata(_meta: &Metadata) -> Option<Self> {
        None
    }
}

/// Observed state of one regular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryState {
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime_ns: i64,
    /// Size in bytes.
    pub size: u64,
    /// Filesystem identity, where the platform exposes one.
    pub identity: Option<FileIdentity>,
}

impl EntryState {
    /// Build from filesystem metadata.
    #[must_use]
    pub fn from_metadata(meta: &Metadata) -> Self {
        let mtime_ns = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX));

        Self {
            mtime_ns,
            size: meta.len(),
            identity: FileIdentity::from_metadata(meta),
        }
    }

    /// Same mtime and size, and the same identity when both sides have one.
    ///
    /// A file replaced by another inode with equal size and mtime counts
    /// as changed.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        let same_identity = match (self.identity, other.identity) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        self.mtime_ns == other.mtime_ns && self.size == other.size && same_identity
    }
}

/// Immutable listing of every regular file under a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySnapshot {
    root: PathBuf,
    taken_at: DateTime<Utc>,
    entries: BTreeMap<PathBuf, EntryState>,
}

impl DirectorySnapshot {
    /// Snapshot with no entries, standing in for "never seen before".
    #[must_use]
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Self::from_entries(root, BTreeMap::new())
    }

    /// Assemble a snapshot from already-collected entries.
    #[must_use]
    pub fn from_entries(root: impl Into<PathBuf>, entries: BTreeMap<PathBuf, EntryState>) -> Self {
        Self::from_parts(root, Utc::now(), entries)
    }

    pub(crate) fn from_parts(
        root: impl Into<PathBuf>,
        taken_at: DateTime<Utc>,
        entries: BTreeMap<PathBuf, EntryState>,
    ) -> Self {
        Self {
            root: root.into(),
            taken_at,
            entries,
        }
    }

    /// Walk `root` and record every regular file not matched by `filter`.
    ///
    /// Symlinks are not followed. Entries that vanish mid-walk are
    /// skipped, as are files whose path is not valid UTF-8. Ignored
    /// directories are not descended into.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Walk` if the root itself is missing or not a
    /// directory.
    pub fn take(root: &Path, filter: &IgnoreFilter) -> Result<Self> {
        let root_meta = std::fs::metadata(root).map_err(|e| SnapshotError::Walk {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;
        if !root_meta.is_dir() {
            return Err(SnapshotError::Walk {
                path: root.display().to_string(),
                reason: "not a directory".to_string(),
            }
            .into());
        }

        let mut entries = BTreeMap::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || !filter.is_ignored_entry(e.path(), e.file_type().is_dir())
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if e.depth() == 0 {
                        return Err(SnapshotError::Walk {
                            path: root.display().to_string(),
                            reason: e.to_string(),
                        }
                        .into());
                    }
                    if e.io_error().map(io::Error::kind) != Some(io::ErrorKind::NotFound) {
                        tracing::warn!(error = %e, "Skipping unreadable entry");
                    }
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            // the index keys files by UTF-8 path strings
            if entry.path().to_str().is_none() {
                tracing::warn!(path = %entry.path().display(), "Skipping file with a non-UTF-8 path");
                continue;
            }

            match entry.metadata() {
                Ok(meta) => {
                    entries.insert(entry.into_path(), EntryState::from_metadata(&meta));
                }
                Err(e) => {
                    tracing::debug!(path = %entry.path().display(), error = %e, "Entry vanished during walk");
                }
            }
        }

        tracing::debug!(root = %root.display(), files = entries.len(), "Snapshot taken");
        Ok(Self::from_parts(root, Utc::now(), entries))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub const fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    #[must_use]
    pub const fn entries(&self) -> &BTreeMap<PathBuf, EntryState> {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&EntryState> {
        self.entries.get(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Same path set with [`EntryState::same_content`] everywhere.
    #[must_use]
    pub fn same_state(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|((pa, a), (pb, b))| pa == pb && a.same_content(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn filter(root: &Path) -> IgnoreFilter {
        IgnoreFilter::new(root, &[]).unwrap()
    }

    #[test]
    fn test_take_lists_regular_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::write(root.join("a.txt"), "aaa").unwrap();
        fs::write(root.join("sub/b.md"), "bb").unwrap();
        fs::write(root.join("sub/deeper/c.pdf"), "c").unwrap();

        let snap = DirectorySnapshot::take(root, &filter(root)).unwrap();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap.get(&root.join("a.txt")).unwrap().size, 3);
        assert!(snap.get(&root.join("sub")).is_none());
    }

    #[test]
    fn test_take_prunes_ignored() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::write(root.join(".git/objects/x"), "x").unwrap();
        fs::write(root.join("draft.tmp"), "x").unwrap();
        fs::write(root.join("~$lock.docx"), "x").unwrap();
        fs::write(root.join("keep.txt"), "x").unwrap();

        let snap = DirectorySnapshot::take(root, &filter(root)).unwrap();
        let paths: Vec<_> = snap.entries().keys().cloned().collect();
        assert_eq!(paths, vec![root.join("keep.txt")]);
    }

    #[test]
    fn test_take_missing_root_is_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("gone");
        let err = DirectorySnapshot::take(&missing, &filter(&missing)).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Snapshot(SnapshotError::Walk { .. })
        ));
    }

    #[test]
    fn test_take_file_root_is_error() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "x").unwrap();
        assert!(DirectorySnapshot::take(&file, &filter(tmp.path())).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_take_does_not_follow_symlinks() {
        let tmp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("link")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            tmp.path().join("file_link.txt"),
        )
        .unwrap();

        let snap = DirectorySnapshot::take(tmp.path(), &filter(tmp.path())).unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn test_same_state_compares_known_identity() {
        let mut a = BTreeMap::new();
        a.insert(
            PathBuf::from("/r/a.txt"),
            EntryState {
                mtime_ns: 1,
                size: 2,
                identity: Some(FileIdentity { dev: 1, ino: 1 }),
            },
        );
        let mut b = a.clone();
        b.get_mut(Path::new("/r/a.txt")).unwrap().identity = None;

        let sa = DirectorySnapshot::from_entries("/r", a.clone());
        let sb = DirectorySnapshot::from_entries("/r", b.clone());
        assert!(sa.same_state(&sb));

        let mut replaced = a;
        replaced.get_mut(Path::new("/r/a.txt")).unwrap().identity =
            Some(FileIdentity { dev: 1, ino: 2 });
        assert!(!sa.same_state(&DirectorySnapshot::from_entries("/r", replaced)));

        b.get_mut(Path::new("/r/a.txt")).unwrap().size = 3;
        assert!(!sa.same_state(&DirectorySnapshot::from_entries("/r", b)));
    }

    // macOS filesystems refuse names that are not valid UTF-8
    #[cfg(target_os = "linux")]
    #[test]
    fn test_take_skips_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(root.join(OsStr::from_bytes(b"bad\xffname.txt")), "x").unwrap();
        fs::write(root.join("ok.md"), "x").unwrap();

        let snap = DirectorySnapshot::take(root, &filter(root)).unwrap();
        let paths: Vec<_> = snap.entries().keys().cloned().collect();
        assert_eq!(paths, vec![root.join("ok.md")]);

        let bytes = crate::snapshot::encode(&snap).unwrap();
        let back = crate::snapshot::decode(&bytes, "mem").unwrap();
        assert!(crate::snapshot::diff(&snap, &back).is_empty());
    }
}
