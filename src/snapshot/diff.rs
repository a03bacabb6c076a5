//! Classifying the changes between two snapshots.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use super::tree::{DirectorySnapshot, FileIdentity};

/// Changes between two snapshots. The four sets never share a path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub created: BTreeSet<PathBuf>,
    pub modified: BTreeSet<PathBuf>,
    /// `(old_path, new_path)` pairs.
    pub moved: Vec<(PathBuf, PathBuf)>,
    pub deleted: BTreeSet<PathBuf>,
}

impl SnapshotDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.modified.is_empty()
            && self.moved.is_empty()
            && self.deleted.is_empty()
    }

    /// Total number of changed paths (a move counts once).
    #[must_use]
    pub fn len(&self) -> usize {
        self.created.len() + self.modified.len() + self.moved.len() + self.deleted.len()
    }
}

/// Compute the changes that turn `old` into `new`.
///
/// A path only in `new` whose identity and size match exactly one path
/// only in `old` is a move; otherwise it is created. Paths in both with a
/// different mtime, size or known identity are modified.
#[must_use]
pub fn diff(old: &DirectorySnapshot, new: &DirectorySnapshot) -> SnapshotDiff {
    if old.same_state(new) {
        return SnapshotDiff::default();
    }

    let mut result = SnapshotDiff::default();

    for (path, state) in new.entries() {
        match old.get(path) {
            None => {
                result.created.insert(path.clone());
            }
            Some(prev) if !prev.same_content(state) => {
                result.modified.insert(path.clone());
            }
            Some(_) => {}
        }
    }

    for path in old.entries().keys() {
        if new.get(path).is_none() {
            result.deleted.insert(path.clone());
        }
    }

    pair_moves(old, new, &mut result);
    result
}

/// Turn matching (deleted, created) pairs into moves.
fn pair_moves(old: &DirectorySnapshot, new: &DirectorySnapshot, result: &mut SnapshotDiff) {
    if result.created.is_empty() || result.deleted.is_empty() {
        return;
    }

    let sources = unique_by_identity(old, &result.deleted);
    let targets = unique_by_identity(new, &result.created);

    for (identity, from) in sources {
        let Some(to) = targets.get(&identity) else {
            continue;
        };
        let same_size = match (old.get(&from), new.get(to)) {
            (Some(a), Some(b)) => a.size == b.size,
            _ => false,
        };
        if !same_size {
            continue;
        }

        result.deleted.remove(&from);
        result.created.remove(to);
        result.moved.push((from, to.clone()));
    }

    result.moved.sort();
}

/// Identity -> path, keeping only identities that occur exactly once in `paths`.
fn unique_by_identity(
    snapshot: &DirectorySnapshot,
    paths: &BTreeSet<PathBuf>,
) -> HashMap<FileIdentity, PathBuf> {
    let mut seen: HashMap<FileIdentity, Option<PathBuf>> = HashMap::new();

    for path in paths {
        let Some(identity) = snapshot.get(path).and_then(|s| s.identity) else {
            continue;
        };
        seen.entry(identity)
            .and_modify(|slot| *slot = None)
            .or_insert_with(|| Some(path.clone()));
    }

    seen.into_iter()
        .filter_map(|(identity, path)| path.map(|p| (identity, p)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::tree::EntryState;
    use std::collections::BTreeMap;

    fn state(mtime_ns: i64, size: u64, ino: Option<u64>) -> EntryState {
        EntryState {
            mtime_ns,
            size,
            identity: ino.map(|ino| FileIdentity { dev: 1, ino }),
        }
    }

    fn snap(entries: &[(&str, EntryState)]) -> DirectorySnapshot {
        let map: BTreeMap<PathBuf, EntryState> = entries
            .iter()
            .map(|(p, s)| (PathBuf::from(p), *s))
            .collect();
        DirectorySnapshot::from_entries("/r", map)
    }

    fn set(paths: &[&str]) -> BTreeSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_diff_same_snapshot_is_empty() {
        let s = snap(&[("/r/a.txt", state(1, 10, Some(1))), ("/r/b.txt", state(2, 20, Some(2)))]);
        assert!(diff(&s, &s).is_empty());
        let empty = snap(&[]);
        assert!(diff(&empty, &empty).is_empty());
    }

    #[test]
    fn test_diff_classifies_all_kinds() {
        let old = snap(&[
            ("/r/keep.txt", state(1, 10, Some(1))),
            ("/r/edit.txt", state(1, 10, Some(2))),
            ("/r/old/moved.txt", state(1, 10, Some(3))),
            ("/r/gone.txt", state(1, 10, Some(4))),
        ]);
        let new = snap(&[
            ("/r/keep.txt", state(1, 10, Some(1))),
            ("/r/edit.txt", state(5, 11, Some(2))),
            ("/r/new/moved.txt", state(1, 10, Some(3))),
            ("/r/fresh.txt", state(1, 10, Some(9))),
        ]);

        let d = diff(&old, &new);
        assert_eq!(d.created, set(&["/r/fresh.txt"]));
        assert_eq!(d.modified, set(&["/r/edit.txt"]));
        assert_eq!(
            d.moved,
            vec![(PathBuf::from("/r/old/moved.txt"), PathBuf::from("/r/new/moved.txt"))]
        );
        assert_eq!(d.deleted, set(&["/r/gone.txt"]));
        assert_eq!(d.len(), 4);
    }

    #[test]
    fn test_diff_from_empty_is_all_created() {
        let new = snap(&[("/r/a.txt", state(1, 1, Some(1))), ("/r/b.txt", state(1, 1, Some(2)))]);
        let d = diff(&DirectorySnapshot::empty("/r"), &new);
        assert_eq!(d.created, set(&["/r/a.txt", "/r/b.txt"]));
        assert!(d.moved.is_empty());
    }

    #[test]
    fn test_replaced_inode_is_modified() {
        let old = snap(&[("/r/a.txt", state(1, 10, Some(7)))]);
        let new = snap(&[("/r/a.txt", state(1, 10, Some(8)))]);
        let d = diff(&old, &new);
        assert_eq!(d.modified, set(&["/r/a.txt"]));
        assert_eq!(d.len(), 1);

        let unknown = snap(&[("/r/a.txt", state(1, 10, None))]);
        assert!(diff(&old, &unknown).is_empty());
    }

    #[test]
    fn test_move_needs_same_size() {
        let old = snap(&[("/r/a.txt", state(1, 10, Some(7)))]);
        let new = snap(&[("/r/b.txt", state(1, 99, Some(7)))]);
        let d = diff(&old, &new);
        assert!(d.moved.is_empty());
        assert_eq!(d.created, set(&["/r/b.txt"]));
        assert_eq!(d.deleted, set(&["/r/a.txt"]));
    }

    #[test]
    fn test_no_identity_means_no_move() {
        let old = snap(&[("/r/a.txt", state(1, 10, None))]);
        let new = snap(&[("/r/b.txt", state(1, 10, None))]);
        let d = diff(&old, &new);
        assert!(d.moved.is_empty());
        assert_eq!(d.created.len(), 1);
        assert_eq!(d.deleted.len(), 1);
    }

    #[test]
    fn test_shared_identity_is_not_paired() {
        // hard links share an inode; pairing would be a guess
        let old = snap(&[("/r/a.txt", state(1, 10, Some(7))), ("/r/b.txt", state(1, 10, Some(7)))]);
        let new = snap(&[("/r/c.txt", state(1, 10, Some(7)))]);
        let d = diff(&old, &new);
        assert!(d.moved.is_empty());
        assert_eq!(d.created, set(&["/r/c.txt"]));
        assert_eq!(d.deleted.len(), 2);
    }

    #[test]
    fn test_sets_are_disjoint() {
        let old = snap(&[
            ("/r/a.txt", state(1, 10, Some(1))),
            ("/r/b.txt", state(1, 10, Some(2))),
            ("/r/c.txt", state(1, 10, Some(3))),
        ]);
        let new = snap(&[
            ("/r/b.txt", state(1, 10, Some(1))),
            ("/r/c.txt", state(2, 10, Some(3))),
            ("/r/d.txt", state(1, 10, Some(2))),
        ]);

        let d = diff(&old, &new);
        let mut all: Vec<&PathBuf> = d.created.iter().chain(&d.modified).chain(&d.deleted).collect();
        for (from, to) in &d.moved {
            all.push(from);
            all.push(to);
        }
        let unique: BTreeSet<_> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
    }
}
