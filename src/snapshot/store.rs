//! Durable snapshot cache with throttled saves and retention.
//!
//! Layout under the base directory:
//!
//! ```text
//! <base>/<root key>/root.json
//! <base>/<root key>/snapshot_20240101_120000_000000.json
//! ```
//!
//! The root key is a hash of the normalized root path, so two roots never
//! share a directory. File names sort in timestamp order.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::codec;
use super::tree::DirectorySnapshot;
use crate::config::Config;
use crate::error::SnapshotError;
use crate::observability::SNAPSHOTS_SAVED;
use crate::Result;

const MARKER_FILE: &str = "root.json";
const FILE_PREFIX: &str = "snapshot_";
const FILE_SUFFIX: &str = ".json";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

/// Identity marker written once per root directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RootMarker {
    root: String,
    created_at: DateTime<Utc>,
}

/// One persisted snapshot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    /// Timestamp embedded in the file name, e.g. `20240101_120000_000000`.
    pub stamp: String,
    pub taken_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub path: PathBuf,
}

/// Every snapshot stored for one root.
#[derive(Debug, Clone)]
pub struct RootCatalog {
    pub root: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Oldest first.
    pub snapshots: Vec<SnapshotInfo>,
}

/// Snapshot cache rooted at one base directory.
#[derive(Debug)]
pub struct SnapshotStore {
    base_dir: PathBuf,
    interval: Duration,
    max_snapshots: usize,
    last_saved: Mutex<HashMap<PathBuf, Instant>>,
}

impl SnapshotStore {
    /// Create a store. The base directory is created lazily on first save.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, interval: Duration, max_snapshots: usize) -> Self {
        Self {
            base_dir: base_dir.into(),
            interval,
            max_snapshots: max_snapshots.max(1),
            last_saved: Mutex::new(HashMap::new()),
        }
    }

    /// Store configured from `config.snapshot_dir()` and its retention settings.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.snapshot_dir(),
            config.snapshot_interval,
            config.max_snapshots,
        )
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory holding the snapshots of `root`.
    #[must_use]
    pub fn root_dir(&self, root: &Path) -> PathBuf {
        let key = blake3::hash(root.to_string_lossy().as_bytes()).to_hex();
        self.base_dir.join(&key[..16])
    }

    /// Persist `snapshot` for `root` unless throttled.
    ///
    /// Saves when `force` is set, when `root` was never saved by this
    /// store, or when the configured interval has elapsed since the last
    /// save. Returns the written file, or `None` when skipped. A successful
    /// save is followed by [`cleanup`](Self::cleanup).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(
        &self,
        root: &Path,
        snapshot: &DirectorySnapshot,
        force: bool,
    ) -> Result<Option<PathBuf>> {
        if !force {
            let last = self.last_saved.lock().get(root).copied();
            if let Some(last) = last {
                if last.elapsed() < self.interval {
                    tracing::trace!(root = %root.display(), "Snapshot save throttled");
                    return Ok(None);
                }
            }
        }

        let dir = self.root_dir(root);
        fs::create_dir_all(&dir)?;
        self.ensure_marker(&dir, root)?;

        let bytes = codec::encode(snapshot)?;
        let path = unique_snapshot_path(&dir, Utc::now());
        write_atomic(&path, &bytes)?;

        self.last_saved.lock().insert(root.to_path_buf(), Instant::now());
        SNAPSHOTS_SAVED.inc();
        tracing::debug!(
            root = %root.display(),
            path = %path.display(),
            files = snapshot.len(),
            "Snapshot saved"
        );

        self.cleanup(root)?;
        Ok(Some(path))
    }

    /// Delete the oldest snapshots of `root` beyond the retention count.
    ///
    /// Returns how many files were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn cleanup(&self, root: &Path) -> Result<usize> {
        let snapshots = self.list(root)?;
        let excess = snapshots.len().saturating_sub(self.max_snapshots);

        let mut removed = 0;
        for info in snapshots.into_iter().take(excess) {
            match fs::remove_file(&info.path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %info.path.display(), error = %e, "Failed to remove old snapshot");
                }
            }
        }

        if removed > 0 {
            tracing::debug!(root = %root.display(), removed, "Old snapshots removed");
        }
        Ok(removed)
    }

    /// Most recent snapshot of `root` that decodes, if any.
    ///
    /// Corrupt files are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the directory cannot be listed.
    pub fn load_latest(&self, root: &Path) -> Result<Option<DirectorySnapshot>> {
        for info in self.list(root)?.into_iter().rev() {
            match read_snapshot(&info.path) {
                Ok(snapshot) => {
                    tracing::debug!(root = %root.display(), stamp = %info.stamp, "Loaded snapshot");
                    return Ok(Some(snapshot));
                }
                Err(e) => {
                    tracing::warn!(path = %info.path.display(), error = %e, "Skipping unreadable snapshot");
                }
            }
        }
        Ok(None)
    }

    /// Snapshot files of `root`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub fn list(&self, root: &Path) -> Result<Vec<SnapshotInfo>> {
        list_dir(&self.root_dir(root))
    }

    /// Load the snapshot of `root` with the given stamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    pub fn get(&self, root: &Path, stamp: &str) -> Result<Option<DirectorySnapshot>> {
        let path = self.stamp_path(root, stamp)?;
        if !path.exists() {
            return Ok(None);
        }
        read_snapshot(&path).map(Some)
    }

    /// Delete one snapshot. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails for a reason other than absence.
    pub fn delete(&self, root: &Path, stamp: &str) -> Result<bool> {
        let path = self.stamp_path(root, stamp)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Every root with a marker file, and its snapshots.
    ///
    /// # Errors
    ///
    /// Returns an error if the base directory cannot be read.
    pub fn catalog(&self) -> Result<Vec<RootCatalog>> {
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut catalog = Vec::new();
        for entry in entries {
            let dir = entry?.path();
            let marker = match fs::read(dir.join(MARKER_FILE)) {
                Ok(bytes) => bytes,
                Err(_) => continue,
            };
            let marker: RootMarker = match serde_json::from_slice(&marker) {
                Ok(marker) => marker,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Unreadable root marker");
                    continue;
                }
            };

            catalog.push(RootCatalog {
                root: PathBuf::from(marker.root),
                created_at: marker.created_at,
                snapshots: list_dir(&dir)?,
            });
        }

        catalog.sort_by(|a, b| a.root.cmp(&b.root));
        Ok(catalog)
    }

    /// Remove every cached snapshot and forget throttle state.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be removed.
    pub fn reset(&self) -> Result<()> {
        match fs::remove_dir_all(&self.base_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.last_saved.lock().clear();
        tracing::info!(dir = %self.base_dir.display(), "Snapshot cache reset");
        Ok(())
    }

    /// File of one snapshot; `stamp` must be a well-formed timestamp.
    fn stamp_path(&self, root: &Path, stamp: &str) -> Result<PathBuf> {
        let name = file_name_for(stamp);
        if parse_stamp(&name).is_none() {
            return Err(SnapshotError::InvalidStamp(stamp.to_string()).into());
        }
        Ok(self.root_dir(root).join(name))
    }

    fn ensure_marker(&self, dir: &Path, root: &Path) -> Result<()> {
        let marker_path = dir.join(MARKER_FILE);
        if marker_path.exists() {
            return Ok(());
        }

        let marker = RootMarker {
            root: root.to_string_lossy().into_owned(),
            created_at: Utc::now(),
        };
        let bytes = serde_json::to_vec_pretty(&marker)
            .map_err(|e| crate::Error::internal(format!("encode root marker: {e}")))?;
        write_atomic(&marker_path, &bytes)?;
        tracing::debug!(root = %root.display(), dir = %self.base_dir.display(), "Root marker written");
        Ok(())
    }
}

fn file_name_for(stamp: &str) -> String {
    format!("{FILE_PREFIX}{stamp}{FILE_SUFFIX}")
}

fn parse_stamp(file_name: &str) -> Option<(String, DateTime<Utc>)> {
    let stamp = file_name
        .strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?;
    let naive = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;
    Some((stamp.to_string(), Utc.from_utc_datetime(&naive)))
}

/// Pick a file name for `now`, stepping forward 1µs past any existing file.
fn unique_snapshot_path(dir: &Path, now: DateTime<Utc>) -> PathBuf {
    let mut at = now;
    loop {
        let path = dir.join(file_name_for(&at.format(STAMP_FORMAT).to_string()));
        if !path.exists() {
            return path;
        }
        at += chrono::Duration::microseconds(1);
    }
}

fn list_dir(dir: &Path) -> Result<Vec<SnapshotInfo>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut snapshots = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some((stamp, taken_at)) = name.to_str().and_then(parse_stamp) else {
            continue;
        };
        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
        snapshots.push(SnapshotInfo {
            stamp,
            taken_at,
            size_bytes,
            path: entry.path(),
        });
    }

    snapshots.sort_by(|a, b| a.stamp.cmp(&b.stamp));
    Ok(snapshots)
}

fn read_snapshot(path: &Path) -> Result<DirectorySnapshot> {
    let bytes = fs::read(path)?;
    codec::decode(&bytes, &path.display().to_string())
}

/// Write to a sibling temp file, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    if let Err(e) = write_then_rename(&tmp, path, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::tree::EntryState;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn store(tmp: &TempDir, interval: Duration, max: usize) -> SnapshotStore {
        SnapshotStore::new(tmp.path().join("snapshots"), interval, max)
    }

    fn sample(root: &str, n: u64) -> DirectorySnapshot {
        let mut entries = BTreeMap::new();
        for i in 0..n {
            entries.insert(
                PathBuf::from(format!("{root}/f{i}.txt")),
                EntryState {
                    mtime_ns: i64::try_from(i).unwrap(),
                    size: i,
                    identity: None,
                },
            );
        }
        DirectorySnapshot::from_entries(root, entries)
    }

    #[test]
    fn test_save_then_load_latest() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, Duration::from_secs(900), 24);
        let root = Path::new("/watch/a");
        let snap = sample("/watch/a", 3);

        let path = store.save(root, &snap, false).unwrap().unwrap();
        assert!(path.exists());
        assert_eq!(store.load_latest(root).unwrap(), Some(snap));
    }

    #[test]
    fn test_load_latest_unknown_root() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, Duration::from_secs(900), 24);
        assert!(store.load_latest(Path::new("/never")).unwrap().is_none());
    }

    #[test]
    fn test_save_is_throttled() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, Duration::from_secs(900), 24);
        let root = Path::new("/watch/a");

        assert!(store.save(root, &sample("/watch/a", 1), false).unwrap().is_some());
        assert!(store.save(root, &sample("/watch/a", 2), false).unwrap().is_none());
        assert!(store.save(root, &sample("/watch/a", 3), true).unwrap().is_some());
        assert_eq!(store.list(root).unwrap().len(), 2);
    }

    #[test]
    fn test_zero_interval_never_throttles() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, Duration::ZERO, 24);
        let root = Path::new("/watch/a");
        for n in 0..3 {
            assert!(store.save(root, &sample("/watch/a", n), false).unwrap().is_some());
        }
    }

    #[test]
    fn test_retention_keeps_newest() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, Duration::from_secs(900), 2);
        let root = Path::new("/watch/a");

        let mut written = Vec::new();
        for n in 1..=3 {
            written.push(store.save(root, &sample("/watch/a", n), true).unwrap().unwrap());
        }

        let remaining: Vec<PathBuf> = store.list(root).unwrap().into_iter().map(|i| i.path).collect();
        assert_eq!(remaining, written[1..].to_vec());

        let latest = store.load_latest(root).unwrap().unwrap();
        assert_eq!(latest.entries(), sample("/watch/a", 3).entries());
    }

    #[test]
    fn test_load_latest_skips_corrupt() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, Duration::ZERO, 24);
        let root = Path::new("/watch/a");
        let good = sample("/watch/a", 2);
        store.save(root, &good, true).unwrap();

        let bad = store.root_dir(root).join("snapshot_29991231_235959_000000.json");
        fs::write(&bad, b"{ truncated").unwrap();

        assert_eq!(store.load_latest(root).unwrap(), Some(good));
    }

    #[test]
    fn test_roots_do_not_collide() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, Duration::ZERO, 24);
        let a = Path::new("/watch/a");
        let b = Path::new("/watch/b");
        assert_ne!(store.root_dir(a), store.root_dir(b));

        store.save(a, &sample("/watch/a", 1), true).unwrap();
        store.save(b, &sample("/watch/b", 2), true).unwrap();
        assert_eq!(store.load_latest(a).unwrap().unwrap().len(), 1);
        assert_eq!(store.load_latest(b).unwrap().unwrap().len(), 2);
    }

    #[test]
    fn test_catalog_get_delete() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, Duration::ZERO, 24);
        let root = Path::new("/watch/a");
        let snap = sample("/watch/a", 2);
        store.save(root, &snap, true).unwrap();

        let catalog = store.catalog().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].root, root);
        assert_eq!(catalog[0].snapshots.len(), 1);

        let stamp = catalog[0].snapshots[0].stamp.clone();
        assert!(catalog[0].snapshots[0].size_bytes > 0);
        assert_eq!(store.get(root, &stamp).unwrap(), Some(snap));

        assert!(store.delete(root, &stamp).unwrap());
        assert!(!store.delete(root, &stamp).unwrap());
        assert!(store.get(root, &stamp).unwrap().is_none());
    }

    #[test]
    fn test_reset_clears_everything() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, Duration::from_secs(900), 24);
        let root = Path::new("/watch/a");
        store.save(root, &sample("/watch/a", 1), false).unwrap();

        store.reset().unwrap();
        store.reset().unwrap();
        assert!(store.catalog().unwrap().is_empty());
        assert!(store.load_latest(root).unwrap().is_none());
        // throttle state is forgotten too
        assert!(store.save(root, &sample("/watch/a", 1), false).unwrap().is_some());
    }

    #[test]
    fn test_stamp_parsing() {
        let (stamp, at) = parse_stamp("snapshot_20240102_030405_000006.json").unwrap();
        assert_eq!(stamp, "20240102_030405_000006");
        assert_eq!(at.timestamp_subsec_micros(), 6);
        assert!(parse_stamp("root.json").is_none());
        assert!(parse_stamp(".snapshot_20240102_030405_000006.json.tmp").is_none());
    }

    #[test]
    fn test_malformed_stamp_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, Duration::from_secs(900), 24);
        let root = Path::new("/watch/a");
        store.save(root, &sample("/watch/a", 1), false).unwrap();
        let outside = tmp.path().join("snapshot_x.json");
        fs::write(&outside, "{}").unwrap();

        for stamp in ["../x", "../../snapshot_x", "20240102_030405_000006/.."] {
            assert!(store.get(root, stamp).is_err(), "get accepted {stamp}");
            assert!(store.delete(root, stamp).is_err(), "delete accepted {stamp}");
        }
        assert!(outside.exists());
        assert_eq!(store.list(root).unwrap().len(), 1);
    }
}
