//! Sync engine: per-root sessions tying watcher, differ and applier together.
//!
//! Each loaded root owns a [`RootSession`] with its own coalescer and the
//! in-memory "current" snapshot. Every cycle for a root runs under that
//! session's cycle lock, so two cycles for the same root never overlap.
//! Different roots run independently.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::applier::{committed_snapshot, ApplyReport, ChangeApplier};
use super::state::{SessionState, StateCell};
use crate::collab::{MemoryVectorStore, Parser, TextParser, VectorStore};
use crate::config::Config;
use crate::error::{SyncError, WatcherError};
use crate::observability::{spans, APPLY_DURATION, FILES_INDEXED};
use crate::paths;
use crate::snapshot::{diff, DirectorySnapshot, SnapshotStore};
use crate::storage::FileIndex;
use crate::watcher::{DebounceCoalescer, IgnoreFilter, WatchManager, WatchStats, WatchStatsSnapshot};
use crate::{Error, Result};

/// Result of one snapshot + diff + apply cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The tree matched the current snapshot.
    Unchanged,
    /// A non-empty diff was applied.
    Applied(ApplyReport),
    /// The session was stopped before the cycle could run.
    Skipped,
}

/// Outcome of [`SyncEngine::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// False when the vector store cannot list its ids; nothing was checked.
    pub supported: bool,
    /// Vectors no index row referenced, now deleted.
    pub orphaned_vectors: Vec<String>,
    /// Mapped document ids the vector store no longer holds.
    pub missing_documents: Vec<String>,
    /// Files owning at least one missing document.
    pub affected_files: Vec<String>,
}

impl ReconcileReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.orphaned_vectors.is_empty() && self.missing_documents.is_empty()
    }
}

struct CycleState {
    current: DirectorySnapshot,
    /// `current` differs from the last snapshot written to disk.
    dirty: bool,
}

struct RootSession {
    root: PathBuf,
    filter: Arc<IgnoreFilter>,
    state: StateCell,
    cycle: Mutex<CycleState>,
    coalescer: Mutex<Option<DebounceCoalescer>>,
}

impl RootSession {
    fn run_cycle(&self, inner: &EngineInner) -> Result<CycleOutcome> {
        let _span = spans::cycle_span(&self.root).entered();
        let mut cycle = self.cycle.lock();

        if self.state.get() == SessionState::Stopped {
            return Ok(CycleOutcome::Skipped);
        }
        self.state.transition(SessionState::Diffing)?;

        let next = match DirectorySnapshot::take(&self.root, &self.filter) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                inner.stats.record_cycle_failed();
                self.state.transition(SessionState::Watching)?;
                return Err(e);
            }
        };

        let changes = diff(&cycle.current, &next);
        if changes.is_empty() {
            inner.stats.record_cycle(true);
            self.state.transition(SessionState::Watching)?;
            tracing::debug!("No changes");
            return Ok(CycleOutcome::Unchanged);
        }

        self.state.transition(SessionState::Applying)?;
        tracing::info!(
            created = changes.created.len(),
            modified = changes.modified.len(),
            moved = changes.moved.len(),
            deleted = changes.deleted.len(),
            "Applying changes"
        );

        let timer = APPLY_DURATION.start_timer();
        let applier = ChangeApplier::new(
            &inner.index,
            inner.parser.as_ref(),
            inner.vectors.as_ref(),
            &self.filter,
        );
        let report = applier.apply(&changes);
        timer.observe_duration();

        cycle.current = committed_snapshot(&cycle.current, &next, &report);
        cycle.dirty = true;
        match inner.snapshots.save(&self.root, &cycle.current, false) {
            Ok(Some(_)) => cycle.dirty = false,
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to persist snapshot"),
        }

        inner.stats.record_cycle(false);
        inner.refresh_files_gauge();
        self.state.transition(SessionState::Watching)?;

        if report.is_clean() {
            tracing::info!(applied = report.applied(), "Cycle complete");
        } else {
            tracing::warn!(
                applied = report.applied(),
                failed = report.failures.len(),
                "Cycle complete with failures"
            );
        }
        Ok(CycleOutcome::Applied(report))
    }

    /// Write the current snapshot if it was never persisted, then stop.
    fn finish(&self, snapshots: &SnapshotStore) {
        let cycle = self.cycle.lock();
        if cycle.dirty {
            if let Err(e) = snapshots.save(&self.root, &cycle.current, true) {
                tracing::warn!(root = %self.root.display(), error = %e, "Failed to persist final snapshot");
            }
        }
        self.state.stop();
    }
}

struct EngineInner {
    config: Config,
    index: FileIndex,
    snapshots: SnapshotStore,
    parser: Arc<dyn Parser>,
    vectors: Arc<dyn VectorStore>,
    watcher: WatchManager,
    sessions: RwLock<HashMap<PathBuf, Arc<RootSession>>>,
    stats: Arc<WatchStats>,
}

impl EngineInner {
    fn session(&self, root: &Path) -> Option<Arc<RootSession>> {
        self.sessions.read().get(root).cloned()
    }

    fn cycle(&self, root: &Path) -> Result<CycleOutcome> {
        let session = self
            .session(root)
            .ok_or_else(|| SyncError::NotLoaded(root.display().to_string()))?;
        session.run_cycle(self)
    }

    fn refresh_files_gauge(&self) {
        match self.index.stats() {
            Ok(stats) => FILES_INDEXED.set(stats.files),
            Err(e) => tracing::debug!(error = %e, "Could not read index stats"),
        }
    }
}

/// Keeps the index, snapshot cache and vector store in sync with watched roots.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Open the index and snapshot cache under `config.data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the index cannot be opened.
    pub fn open(
        config: Config,
        parser: Arc<dyn Parser>,
        vectors: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        config.validate()?;
        let index = FileIndex::open(config.database_path())?;
        let snapshots = SnapshotStore::from_config(&config);
        Ok(Self::with_stores(config, index, snapshots, parser, vectors))
    }

    /// Open with the built-in [`TextParser`] and [`MemoryVectorStore`].
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn open_default(config: Config) -> Result<Self> {
        let parser = Arc::new(TextParser::new(config.chunk_size, config.chunk_overlap));
        Self::open(config, parser, Arc::new(MemoryVectorStore::new()))
    }

    /// Assemble an engine from already-open stores.
    #[must_use]
    pub fn with_stores(
        config: Config,
        index: FileIndex,
        snapshots: SnapshotStore,
        parser: Arc<dyn Parser>,
        vectors: Arc<dyn VectorStore>,
    ) -> Self {
        let stats = Arc::new(WatchStats::new());
        Self {
            inner: Arc::new(EngineInner {
                config,
                index,
                snapshots,
                parser,
                vectors,
                watcher: WatchManager::new(Arc::clone(&stats)),
                sessions: RwLock::new(HashMap::new()),
                stats,
            }),
        }
    }

    /// Start keeping `root` in sync.
    ///
    /// Restores the latest snapshot of `root` (or starts from an empty one),
    /// subscribes to filesystem events and runs a first cycle, whose
    /// outcome is returned. Loading a root twice is a no-op returning
    /// [`CycleOutcome::Skipped`].
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not a directory, overlaps a loaded
    /// root, cannot be watched, or cannot be walked.
    pub async fn load(&self, root: impl AsRef<Path>) -> Result<CycleOutcome> {
        let root = resolve_root(root.as_ref())?;
        if !root.is_dir() {
            return Err(WatcherError::WatchFailed {
                path: root.display().to_string(),
                reason: "not a directory".to_string(),
            }
            .into());
        }

        let inner = &self.inner;
        if inner.sessions.read().contains_key(&root) {
            tracing::debug!(root = %root.display(), "Root already loaded");
            return Ok(CycleOutcome::Skipped);
        }

        let filter = Arc::new(IgnoreFilter::new(&root, &inner.config.ignore_patterns)?);
        let current = match inner.snapshots.load_latest(&root)? {
            Some(snapshot) => {
                tracing::info!(root = %root.display(), files = snapshot.len(), "Restored snapshot");
                snapshot
            }
            None => DirectorySnapshot::empty(&root),
        };

        let session = Arc::new(RootSession {
            root: root.clone(),
            filter: Arc::clone(&filter),
            state: StateCell::new(),
            cycle: Mutex::new(CycleState {
                current,
                dirty: false,
            }),
            coalescer: Mutex::new(None),
        });
        session.state.transition(SessionState::Loaded)?;

        {
            let mut sessions = inner.sessions.write();
            // a concurrent load of the same root won the race
            if sessions.contains_key(&root) {
                tracing::debug!(root = %root.display(), "Root already loaded");
                return Ok(CycleOutcome::Skipped);
            }
            if let Some(other) = sessions.keys().find(|r| overlaps(r, &root)) {
                return Err(Error::config(format!(
                    "root '{}' overlaps loaded root '{}'",
                    root.display(),
                    other.display()
                )));
            }
            sessions.insert(root.clone(), Arc::clone(&session));
        }

        let coalescer = spawn_coalescer(Arc::downgrade(&self.inner), root.clone(), inner.config.debounce);
        let trigger = coalescer.handle();
        *session.coalescer.lock() = Some(coalescer);

        if let Err(e) = inner.watcher.subscribe(&root, filter, trigger) {
            self.discard(&root).await;
            return Err(e);
        }

        match self.sync_now(&root).await {
            Ok(outcome) => {
                tracing::info!(root = %root.display(), "Root loaded");
                Ok(outcome)
            }
            Err(e) => {
                self.release(&root).await;
                Err(e)
            }
        }
    }

    /// Stop keeping `root` in sync. Returns whether it was loaded.
    ///
    /// Cancels the pending debounce window, waits for a running cycle and
    /// detaches the watch. Persisted index and snapshot data stay.
    pub async fn release(&self, root: impl AsRef<Path>) -> bool {
        let root = session_key(root.as_ref());
        let Some(session) = self.discard(&root).await else {
            return false;
        };

        let inner = Arc::clone(&self.inner);
        let finish = tokio::task::spawn_blocking(move || session.finish(&inner.snapshots));
        if let Err(e) = finish.await {
            tracing::error!(root = %root.display(), error = %e, "Release task failed");
        }

        tracing::info!(root = %root.display(), "Root released");
        true
    }

    /// Release every loaded root.
    pub async fn release_all(&self) {
        for root in self.loaded_roots() {
            self.release(&root).await;
        }
    }

    /// Release everything, then empty the index, the snapshot cache and
    /// the vector store, in that order.
    ///
    /// # Errors
    ///
    /// Returns the first store that failed to clear.
    pub async fn reset(&self) -> Result<()> {
        self.release_all().await;

        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || -> Result<()> {
            inner.index.reset()?;
            inner.snapshots.reset()?;
            inner.vectors.clear()?;
            FILES_INDEXED.set(0);
            Ok(())
        })
        .await
        .map_err(|e| Error::internal(format!("reset task failed: {e}")))??;

        tracing::info!("All stores reset");
        Ok(())
    }

    /// Run a cycle for `root` now, without waiting for the debounce window.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotLoaded` for unknown roots and propagates
    /// walk failures.
    pub async fn sync_now(&self, root: impl AsRef<Path>) -> Result<CycleOutcome> {
        let root = session_key(root.as_ref());
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.cycle(&root))
            .await
            .map_err(|e| Error::internal(format!("sync task failed: {e}")))?
    }

    /// Compare vector store ids with the document mapping.
    ///
    /// Vectors no file owns are deleted. Documents the store lost are
    /// reported with their files; re-indexing those is left to the caller.
    /// Holds every session's cycle lock so no apply runs in between.
    ///
    /// # Errors
    ///
    /// Returns an error if either store cannot be read.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.reconcile())
            .await
            .map_err(|e| Error::internal(format!("reconcile task failed: {e}")))?
    }

    /// The relational index.
    #[must_use]
    pub fn index(&self) -> &FileIndex {
        &self.inner.index
    }

    /// The snapshot cache.
    #[must_use]
    pub fn snapshots(&self) -> &SnapshotStore {
        &self.inner.snapshots
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    #[must_use]
    pub fn stats(&self) -> WatchStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Loaded roots, sorted.
    #[must_use]
    pub fn loaded_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self.inner.sessions.read().keys().cloned().collect();
        roots.sort();
        roots
    }

    /// Session state of `root`, if loaded.
    #[must_use]
    pub fn state(&self, root: impl AsRef<Path>) -> Option<SessionState> {
        let root = session_key(root.as_ref());
        self.inner.session(&root).map(|s| s.state.get())
    }

    /// Remove the session, stop its coalescer and unwatch it.
    async fn discard(&self, root: &Path) -> Option<Arc<RootSession>> {
        let session = self.inner.sessions.write().remove(root)?;

        self.inner.watcher.unsubscribe(root);
        let coalescer = session.coalescer.lock().take();
        if let Some(coalescer) = coalescer {
            coalescer.shutdown().await;
        }
        Some(session)
    }
}

impl EngineInner {
    fn reconcile(&self) -> Result<ReconcileReport> {
        let mut sessions: Vec<Arc<RootSession>> = self.sessions.read().values().cloned().collect();
        sessions.sort_by(|a, b| a.root.cmp(&b.root));
        let _guards: Vec<_> = sessions.iter().map(|s| s.cycle.lock()).collect();

        let Some(stored) = self.vectors.list_ids()? else {
            tracing::info!("Vector store cannot list ids, skipping reconciliation");
            return Ok(ReconcileReport::default());
        };
        let stored: BTreeSet<String> = stored.into_iter().collect();
        let mapped: BTreeSet<String> = self.index.all_document_ids()?.into_iter().collect();

        let orphaned: Vec<String> = stored.difference(&mapped).cloned().collect();
        let missing: Vec<String> = mapped.difference(&stored).cloned().collect();

        if !orphaned.is_empty() {
            match self.vectors.delete(&orphaned) {
                Ok(true) => tracing::info!(count = orphaned.len(), "Deleted orphaned vectors"),
                Ok(false) => tracing::warn!(count = orphaned.len(), "Orphaned vector delete reported failure"),
                Err(e) => tracing::error!(error = %e, "Orphaned vector delete failed"),
            }
        }

        let affected = if missing.is_empty() {
            Vec::new()
        } else {
            let files = self.index.get_file_ids_by_document_ids(&missing)?;
            tracing::warn!(
                documents = missing.len(),
                files = files.len(),
                "Index references documents missing from the vector store"
            );
            files
        };

        Ok(ReconcileReport {
            supported: true,
            orphaned_vectors: orphaned,
            missing_documents: missing,
            affected_files: affected,
        })
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("roots", &self.loaded_roots())
            .finish_non_exhaustive()
    }
}

fn spawn_coalescer(
    engine: Weak<EngineInner>,
    root: PathBuf,
    delay: std::time::Duration,
) -> DebounceCoalescer {
    DebounceCoalescer::spawn(delay, CancellationToken::new(), move || {
        let engine = engine.clone();
        let root = root.clone();
        async move {
            let Some(inner) = engine.upgrade() else {
                return;
            };
            let task_root = root.clone();
            let result = tokio::task::spawn_blocking(move || inner.cycle(&task_root)).await;
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::error!(root = %root.display(), error = %e, "Sync cycle failed"),
                Err(e) => tracing::error!(root = %root.display(), error = %e, "Sync cycle panicked"),
            }
        }
    })
}

/// Canonical key for a root being loaded.
fn resolve_root(root: &Path) -> Result<PathBuf> {
    #[cfg(unix)]
    let root = std::fs::canonicalize(root).map_err(|e| WatcherError::WatchFailed {
        path: root.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(paths::normalize_path(&root))
}

/// Key of an already-loaded root; tolerates roots that no longer exist.
fn session_key(root: &Path) -> PathBuf {
    resolve_root(root).unwrap_or_else(|_| paths::normalize_path(root))
}

fn overlaps(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        _data: TempDir,
        watched: TempDir,
        engine: SyncEngine,
        vectors: Arc<MemoryVectorStore>,
    }

    fn harness() -> Harness {
        let data = TempDir::new().unwrap();
        let watched = TempDir::new().unwrap();
        let config = Config {
            data_dir: data.path().to_path_buf(),
            debounce: Duration::from_millis(500),
            ..Config::default()
        };
        let vectors = Arc::new(MemoryVectorStore::new());
        let engine = SyncEngine::with_stores(
            config.clone(),
            FileIndex::open_in_memory().unwrap(),
            SnapshotStore::from_config(&config),
            Arc::new(TextParser::new(32, 8)),
            Arc::clone(&vectors) as Arc<dyn VectorStore>,
        );
        Harness {
            _data: data,
            watched,
            engine,
            vectors,
        }
    }

    #[tokio::test]
    async fn test_load_indexes_existing_files() {
        let h = harness();
        fs::write(h.watched.path().join("a.txt"), "alpha").unwrap();
        fs::write(h.watched.path().join("b.md"), "beta").unwrap();
        fs::write(h.watched.path().join("skip.tmp"), "ignored").unwrap();

        let outcome = h.engine.load(h.watched.path()).await.unwrap();
        let CycleOutcome::Applied(report) = outcome else {
            panic!("expected applied, got {outcome:?}");
        };
        assert_eq!(report.created, 2);
        assert_eq!(h.engine.index().get_all_files().unwrap().len(), 2);
        assert_eq!(h.engine.state(h.watched.path()), Some(SessionState::Watching));

        h.engine.release_all().await;
    }

    #[tokio::test]
    async fn test_load_twice_is_noop() {
        let h = harness();
        h.engine.load(h.watched.path()).await.unwrap();
        assert_eq!(
            h.engine.load(h.watched.path()).await.unwrap(),
            CycleOutcome::Skipped
        );
        assert_eq!(h.engine.loaded_roots().len(), 1);
        h.engine.release_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_loads_of_same_root() {
        let h = harness();
        fs::write(h.watched.path().join("a.txt"), "alpha").unwrap();

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let engine = h.engine.clone();
                let root = h.watched.path().to_path_buf();
                tokio::spawn(async move { engine.load(root).await })
            })
            .collect();

        let mut skipped = 0;
        for task in tasks {
            match task.await.unwrap().unwrap() {
                CycleOutcome::Skipped => skipped += 1,
                CycleOutcome::Applied(report) => assert_eq!(report.created, 1),
                CycleOutcome::Unchanged => panic!("first cycle saw no change"),
            }
        }
        assert_eq!(skipped, 3);
        assert_eq!(h.engine.loaded_roots().len(), 1);
        assert_eq!(h.engine.index().get_all_files().unwrap().len(), 1);

        h.engine.release_all().await;
    }

    #[tokio::test]
    async fn test_overlapping_root_rejected() {
        let h = harness();
        let nested = h.watched.path().join("nested");
        fs::create_dir(&nested).unwrap();

        h.engine.load(h.watched.path()).await.unwrap();
        assert!(h.engine.load(&nested).await.is_err());
        h.engine.release_all().await;
    }

    #[tokio::test]
    async fn test_load_missing_root_fails() {
        let h = harness();
        let missing = h.watched.path().join("missing");
        assert!(h.engine.load(&missing).await.is_err());
        assert!(h.engine.loaded_roots().is_empty());
    }

    #[tokio::test]
    async fn test_sync_now_unchanged_then_changed() {
        let h = harness();
        h.engine.load(h.watched.path()).await.unwrap();

        assert_eq!(
            h.engine.sync_now(h.watched.path()).await.unwrap(),
            CycleOutcome::Unchanged
        );

        fs::write(h.watched.path().join("new.txt"), "fresh").unwrap();
        let outcome = h.engine.sync_now(h.watched.path()).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Applied(ref r) if r.created == 1));

        let stats = h.engine.stats();
        assert!(stats.cycles_run >= 3);
        assert!(stats.cycles_unchanged >= 1);
        h.engine.release_all().await;
    }

    #[tokio::test]
    async fn test_sync_now_unknown_root() {
        let h = harness();
        let err = h.engine.sync_now(h.watched.path()).await.unwrap_err();
        assert!(matches!(err, Error::Sync(SyncError::NotLoaded(_))));
    }

    #[tokio::test]
    async fn test_release_persists_and_stops() {
        let h = harness();
        fs::write(h.watched.path().join("a.txt"), "alpha").unwrap();
        h.engine.load(h.watched.path()).await.unwrap();

        assert!(h.engine.release(h.watched.path()).await);
        assert!(!h.engine.release(h.watched.path()).await);
        assert!(h.engine.state(h.watched.path()).is_none());

        let restored = h
            .engine
            .snapshots()
            .load_latest(&resolve_root(h.watched.path()).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(restored.len(), 1);
    }

    #[tokio::test]
    async fn test_reload_restores_snapshot_without_reindexing() {
        let h = harness();
        fs::write(h.watched.path().join("a.txt"), "alpha").unwrap();
        h.engine.load(h.watched.path()).await.unwrap();
        h.engine.release(h.watched.path()).await;
        let vectors = h.vectors.len();

        let outcome = h.engine.load(h.watched.path()).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Unchanged);
        assert_eq!(h.vectors.len(), vectors);
        h.engine.release_all().await;
    }

    #[tokio::test]
    async fn test_reset_clears_every_store() {
        let h = harness();
        fs::write(h.watched.path().join("a.txt"), "alpha").unwrap();
        h.engine.load(h.watched.path()).await.unwrap();
        assert!(!h.vectors.is_empty());

        h.engine.reset().await.unwrap();
        assert!(h.engine.loaded_roots().is_empty());
        assert!(h.engine.index().get_all_files().unwrap().is_empty());
        assert!(h.engine.snapshots().catalog().unwrap().is_empty());
        assert!(h.vectors.is_empty());

        // safe with nothing loaded
        h.engine.reset().await.unwrap();
    }

    #[tokio::test]
    async fn test_reconcile_removes_orphans_and_reports_missing() {
        let h = harness();
        fs::write(h.watched.path().join("a.txt"), "alpha").unwrap();
        h.engine.load(h.watched.path()).await.unwrap();

        let orphan = h
            .vectors
            .add(&[crate::collab::Fragment {
                file_id: "gone".into(),
                path: "/gone".into(),
                index: 0,
                content: "orphan".into(),
                metadata: crate::storage::Metadata::new(),
            }])
            .unwrap();
        let record = h.engine.index().get_all_files().unwrap().remove(0);
        h.vectors.delete(&record.document_ids[..1]).unwrap();

        let report = h.engine.reconcile().await.unwrap();
        assert!(report.supported);
        assert_eq!(report.orphaned_vectors, orphan);
        assert_eq!(report.missing_documents, vec![record.document_ids[0].clone()]);
        assert_eq!(report.affected_files, vec![record.id.clone()]);
        assert!(!h.vectors.contains(&orphan[0]));

        h.engine.release_all().await;
    }
}
