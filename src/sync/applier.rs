//! Propagating a snapshot diff into the index and the vector store.
//!
//! Phases run in a fixed order: created, modified, moved, deleted. Each
//! path is applied on its own; a failure is recorded in the
//! [`ApplyReport`] and the remaining paths still run. Index lookups that
//! return more than one record for a path are reported and never
//! resolved by picking a candidate.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::collab::{Fragment, Parser, VectorStore};
use crate::error::{CollabError, Error, SyncError};
use crate::observability::{spans, APPLY_FAILURES, CHANGES_TOTAL};
use crate::paths;
use crate::snapshot::{DirectorySnapshot, SnapshotDiff};
use crate::storage::{FileIndex, FileRecord};
use crate::watcher::IgnoreFilter;
use crate::Result;

/// Diff category a path was applied under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Moved,
    Deleted,
}

impl ChangeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Moved => "moved",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One path that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFailure {
    pub phase: ChangeKind,
    /// The path applied (the destination, for moves).
    pub path: PathBuf,
    /// Source path of a failed move.
    pub old_path: Option<PathBuf>,
    pub error: String,
    /// The failure was an ambiguous index lookup.
    pub ambiguous: bool,
}

/// Outcome of applying one diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub created: usize,
    pub modified: usize,
    pub moved: usize,
    pub deleted: usize,
    /// Paths skipped as ignored, or deletions with nothing indexed.
    pub skipped: usize,
    pub failures: Vec<ApplyFailure>,
}

impl ApplyReport {
    /// Paths applied successfully.
    #[must_use]
    pub const fn applied(&self) -> usize {
        self.created + self.modified + self.moved + self.deleted
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn succeed(&mut self, phase: ChangeKind, applied: bool) {
        if !applied {
            self.skipped += 1;
            return;
        }
        match phase {
            ChangeKind::Created => self.created += 1,
            ChangeKind::Modified => self.modified += 1,
            ChangeKind::Moved => self.moved += 1,
            ChangeKind::Deleted => self.deleted += 1,
        }
        CHANGES_TOTAL.with_label_values(&[phase.as_str()]).inc();
    }

    fn fail(&mut self, phase: ChangeKind, path: &Path, old_path: Option<&Path>, error: &Error) {
        tracing::error!(phase = %phase, path = %path.display(), error = %error, "Failed to apply change");
        APPLY_FAILURES.with_label_values(&[phase.as_str()]).inc();
        self.failures.push(ApplyFailure {
            phase,
            path: path.to_path_buf(),
            old_path: old_path.map(Path::to_path_buf),
            error: error.to_string(),
            ambiguous: matches!(error, Error::Sync(SyncError::AmbiguousPath { .. })),
        });
    }
}

/// Applies diffs for one root.
pub struct ChangeApplier<'a> {
    index: &'a FileIndex,
    parser: &'a dyn Parser,
    vectors: &'a dyn VectorStore,
    filter: &'a IgnoreFilter,
}

impl<'a> ChangeApplier<'a> {
    #[must_use]
    pub fn new(
        index: &'a FileIndex,
        parser: &'a dyn Parser,
        vectors: &'a dyn VectorStore,
        filter: &'a IgnoreFilter,
    ) -> Self {
        Self {
            index,
            parser,
            vectors,
            filter,
        }
    }

    /// Apply every change in `diff`. Never fails as a whole.
    pub fn apply(&self, diff: &SnapshotDiff) -> ApplyReport {
        let mut report = ApplyReport::default();

        {
            let _span = spans::phase_span("created", diff.created.len()).entered();
            for path in &diff.created {
                match self.create(path) {
                    Ok(applied) => report.succeed(ChangeKind::Created, applied),
                    Err(e) => report.fail(ChangeKind::Created, path, None, &e),
                }
            }
        }

        {
            let _span = spans::phase_span("modified", diff.modified.len()).entered();
            for path in &diff.modified {
                match self.modify(path) {
                    Ok(applied) => report.succeed(ChangeKind::Modified, applied),
                    Err(e) => report.fail(ChangeKind::Modified, path, None, &e),
                }
            }
        }

        {
            let _span = spans::phase_span("moved", diff.moved.len()).entered();
            for (from, to) in &diff.moved {
                match self.relocate(from, to) {
                    Ok(applied) => report.succeed(ChangeKind::Moved, applied),
                    Err(e) => report.fail(ChangeKind::Moved, to, Some(from.as_path()), &e),
                }
            }
        }

        {
            let _span = spans::phase_span("deleted", diff.deleted.len()).entered();
            for path in &diff.deleted {
                match self.remove(path) {
                    Ok(applied) => report.succeed(ChangeKind::Deleted, applied),
                    Err(e) => report.fail(ChangeKind::Deleted, path, None, &e),
                }
            }
        }

        report
    }

    /// Parse, embed and index a file.
    fn create(&self, path: &Path) -> Result<bool> {
        if self.filter.is_ignored(path) {
            tracing::debug!(path = %path.display(), "Skipping ignored path");
            return Ok(false);
        }

        let mut record = FileRecord::from_path(path)?;
        if record.is_directory {
            return Ok(false);
        }

        // a record already at this path is stale: its content is about to be replaced
        if let Some(existing) = self.lookup_unique(path)? {
            self.drop_record(&existing)?;
        }
        if let Some(holder) = self.index.get(&record.id)? {
            self.index.rekey(&holder.id)?;
        }

        let parsed = self.parser.parse(&record)?;
        let document_ids = self.add_vectors(&parsed.fragments)?;
        let count = document_ids.len();

        record.metadata = parsed.metadata;
        record.document_ids = document_ids;
        self.index
            .upsert(&record)
            .map_err(|e| cross_store(&record.path, &e))?;

        tracing::info!(path = %record.path, documents = count, "Indexed file");
        Ok(true)
    }

    /// Drop the old record and its vectors, then index the file again.
    fn modify(&self, path: &Path) -> Result<bool> {
        if self.filter.is_ignored(path) {
            tracing::debug!(path = %path.display(), "Skipping ignored path");
            return Ok(false);
        }

        match self.lookup_unique(path)? {
            Some(existing) => {
                self.drop_record(&existing)?;
                self.create(path)
            }
            None => {
                tracing::debug!(path = %path.display(), "Modified file was not indexed");
                self.create(path)
            }
        }
    }

    /// Update the path of the record at `from`. Content and vectors stay.
    fn relocate(&self, from: &Path, to: &Path) -> Result<bool> {
        if self.filter.is_ignored(to) {
            return self.remove(from);
        }

        let Some(record) = self.lookup_unique(from)? else {
            tracing::debug!(from = %from.display(), "Moved file was not indexed");
            return self.create(to);
        };

        if let Some(stale) = self.lookup_unique(to)? {
            self.drop_record(&stale)?;
        }

        let new_path = paths::normalize_str(to);
        self.index
            .update_paths(&[(record.id.clone(), new_path.clone())])?;

        tracing::info!(from = %record.path, to = %new_path, "Moved file");
        Ok(true)
    }

    /// Delete a file's vectors, then its record.
    fn remove(&self, path: &Path) -> Result<bool> {
        let Some(record) = self.lookup_unique(path)? else {
            tracing::debug!(path = %path.display(), "Deleted file was not indexed");
            return Ok(false);
        };

        self.drop_record(&record)?;
        tracing::info!(path = %record.path, "Removed file");
        Ok(true)
    }

    /// The single record at `path`, or an ambiguity error.
    fn lookup_unique(&self, path: &Path) -> Result<Option<FileRecord>> {
        let normalized = paths::normalize_str(path);
        let mut matches = self.index.find_by_path(&normalized)?;

        match matches.len() {
            0 | 1 => Ok(matches.pop()),
            count => {
                tracing::error!(
                    path = %normalized,
                    count,
                    "Index corruption: several records share one path; reset required"
                );
                Err(SyncError::AmbiguousPath {
                    path: normalized,
                    count,
                }
                .into())
            }
        }
    }

    fn drop_record(&self, record: &FileRecord) -> Result<()> {
        self.drop_vectors(&record.path, &record.document_ids);
        self.index.delete_one(&record.id)?;
        Ok(())
    }

    fn add_vectors(&self, fragments: &[Fragment]) -> Result<Vec<String>> {
        if fragments.is_empty() {
            return Ok(Vec::new());
        }

        let ids = self.vectors.add(fragments)?;
        if ids.len() != fragments.len() {
            return Err(CollabError::VectorStore(format!(
                "returned {} ids for {} fragments",
                ids.len(),
                fragments.len()
            ))
            .into());
        }
        Ok(ids)
    }

    /// Vector deletes are best effort: failures are logged, not raised.
    fn drop_vectors(&self, path: &str, document_ids: &[String]) {
        if document_ids.is_empty() {
            return;
        }

        match self.vectors.delete(document_ids) {
            Ok(true) => {
                tracing::debug!(path, count = document_ids.len(), "Deleted vectors");
            }
            Ok(false) => {
                tracing::warn!(path, count = document_ids.len(), "Vector store reported a failed delete");
            }
            Err(e) => {
                tracing::error!(path, error = %e, "Vector delete failed");
            }
        }
    }
}

fn cross_store(path: &str, error: &Error) -> Error {
    tracing::error!(path, error = %error, "Vectors stored but index write failed; reset to recover");
    SyncError::CrossStore {
        path: path.to_string(),
        reason: error.to_string(),
    }
    .into()
}

/// The snapshot to remember after applying `report`.
///
/// Failed paths keep their previous state so the next cycle sees them as
/// changed again.
#[must_use]
pub fn committed_snapshot(
    old: &DirectorySnapshot,
    new: &DirectorySnapshot,
    report: &ApplyReport,
) -> DirectorySnapshot {
    if report.failures.is_empty() {
        return new.clone();
    }

    let mut entries = new.entries().clone();
    for failure in &report.failures {
        match failure.phase {
            ChangeKind::Created => {
                entries.remove(&failure.path);
            }
            ChangeKind::Modified | ChangeKind::Deleted => match old.get(&failure.path) {
                Some(state) => {
                    entries.insert(failure.path.clone(), *state);
                }
                None => {
                    entries.remove(&failure.path);
                }
            },
            ChangeKind::Moved => {
                entries.remove(&failure.path);
                if let Some(from) = &failure.old_path {
                    if let Some(state) = old.get(from) {
                        entries.insert(from.clone(), *state);
                    }
                }
            }
        }
    }

    DirectorySnapshot::from_parts(new.root().to_path_buf(), new.taken_at(), entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{MemoryVectorStore, ParsedDocument, TextParser};
    use crate::snapshot::diff;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        index: FileIndex,
        parser: TextParser,
        vectors: MemoryVectorStore,
        filter: IgnoreFilter,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let filter = IgnoreFilter::new(tmp.path(), &[]).unwrap();
            Self {
                tmp,
                index: FileIndex::open_in_memory().unwrap(),
                parser: TextParser::new(16, 4),
                vectors: MemoryVectorStore::new(),
                filter,
            }
        }

        fn root(&self) -> &Path {
            self.tmp.path()
        }

        fn applier(&self) -> ChangeApplier<'_> {
            ChangeApplier::new(&self.index, &self.parser, &self.vectors, &self.filter)
        }

        fn snapshot(&self) -> DirectorySnapshot {
            DirectorySnapshot::take(self.root(), &self.filter).unwrap()
        }

        fn record_at(&self, path: &Path) -> FileRecord {
            let mut found = self.index.find_by_path(&paths::normalize_str(path)).unwrap();
            assert_eq!(found.len(), 1);
            found.remove(0)
        }
    }

    #[test]
    fn test_created_indexes_and_embeds() {
        let fx = Fixture::new();
        let before = fx.snapshot();
        fs::write(fx.root().join("a.txt"), "some text that spans fragments").unwrap();
        let after = fx.snapshot();

        let report = fx.applier().apply(&diff(&before, &after));
        assert_eq!(report.created, 1);
        assert!(report.is_clean());

        let record = fx.record_at(&fx.root().join("a.txt"));
        assert_eq!(record.id, paths::file_id(&fx.root().join("a.txt")));
        assert!(!record.document_ids.is_empty());
        assert_eq!(fx.vectors.len(), record.document_ids.len());
    }

    #[test]
    fn test_modified_replaces_vectors() {
        let fx = Fixture::new();
        let file = fx.root().join("a.txt");
        fs::write(&file, "first version").unwrap();
        let s0 = DirectorySnapshot::empty(fx.root());
        let s1 = fx.snapshot();
        fx.applier().apply(&diff(&s0, &s1));
        let old_ids = fx.record_at(&file).document_ids;

        fs::write(&file, "second version, somewhat longer than before").unwrap();
        let s2 = fx.snapshot();
        let report = fx.applier().apply(&diff(&s1, &s2));

        assert_eq!(report.modified, 1);
        let new_ids = fx.record_at(&file).document_ids;
        assert!(old_ids.iter().all(|id| !fx.vectors.contains(id)));
        assert!(new_ids.iter().all(|id| fx.vectors.contains(id)));
        assert_eq!(fx.vectors.len(), new_ids.len());
    }

    #[test]
    fn test_deleted_removes_record_and_vectors() {
        let fx = Fixture::new();
        let file = fx.root().join("a.txt");
        fs::write(&file, "content").unwrap();
        let s1 = fx.snapshot();
        fx.applier().apply(&diff(&DirectorySnapshot::empty(fx.root()), &s1));

        fs::remove_file(&file).unwrap();
        let s2 = fx.snapshot();
        let report = fx.applier().apply(&diff(&s1, &s2));

        assert_eq!(report.deleted, 1);
        assert!(fx.index.get_all_files().unwrap().is_empty());
        assert!(fx.vectors.is_empty());
    }

    #[test]
    fn test_moved_keeps_id_and_documents() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.root().join("old")).unwrap();
        fs::create_dir_all(fx.root().join("new")).unwrap();
        let from = fx.root().join("old/a.txt");
        let to = fx.root().join("new/a.txt");
        fs::write(&from, "moving content").unwrap();

        let s1 = fx.snapshot();
        fx.applier().apply(&diff(&DirectorySnapshot::empty(fx.root()), &s1));
        let before = fx.record_at(&from);
        let vectors_before = fx.vectors.len();

        fs::rename(&from, &to).unwrap();
        let s2 = fx.snapshot();
        let d = diff(&s1, &s2);
        if cfg!(unix) {
            assert_eq!(d.moved.len(), 1);
        }
        let report = fx.applier().apply(&d);
        assert!(report.is_clean());

        let after = fx.record_at(&to);
        assert_eq!(after.name, "a.txt");
        if cfg!(unix) {
            assert_eq!(after.id, before.id);
            assert_eq!(after.document_ids, before.document_ids);
            assert_eq!(fx.vectors.len(), vectors_before);
        }
    }

    #[test]
    fn test_new_file_at_moved_records_old_path() {
        let fx = Fixture::new();
        let a = fx.root().join("a.txt");
        let b = fx.root().join("b.txt");
        fs::write(&a, "original").unwrap();
        let s1 = fx.snapshot();
        fx.applier().apply(&diff(&DirectorySnapshot::empty(fx.root()), &s1));

        let moved = SnapshotDiff {
            moved: vec![(a.clone(), b.clone())],
            ..SnapshotDiff::default()
        };
        fs::rename(&a, &b).unwrap();
        fx.applier().apply(&moved);

        fs::write(&a, "replacement").unwrap();
        let created = SnapshotDiff {
            created: [a.clone()].into_iter().collect(),
            ..SnapshotDiff::default()
        };
        let report = fx.applier().apply(&created);
        assert!(report.is_clean());

        assert_eq!(fx.index.get_all_files().unwrap().len(), 2);
        let moved_record = fx.record_at(&b);
        assert_eq!(moved_record.id, paths::file_id(&b));
        assert!(moved_record.document_ids.iter().all(|id| fx.vectors.contains(id)));
        assert_eq!(fx.record_at(&a).id, paths::file_id(&a));
    }

    #[test]
    fn test_ambiguous_path_is_reported_and_untouched() {
        let fx = Fixture::new();
        let file = fx.root().join("dup.txt");
        fs::write(&file, "x").unwrap();
        let path = paths::normalize_str(&file);

        let ids_a = fx.vectors.add(&[fragment("a")]).unwrap();
        let ids_b = fx.vectors.add(&[fragment("b")]).unwrap();
        let mut first = FileRecord::new(&file).with_document_ids(ids_a.clone());
        let mut second = FileRecord::new(&file).with_document_ids(ids_b.clone());
        first.id = "corrupt-1".into();
        second.id = "corrupt-2".into();
        fx.index.upsert_batch(&[first, second]).unwrap();
        assert_eq!(fx.index.find_by_path(&path).unwrap().len(), 2);

        let d = SnapshotDiff {
            modified: [file.clone()].into_iter().collect(),
            ..SnapshotDiff::default()
        };
        let report = fx.applier().apply(&d);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].ambiguous);

        let d = SnapshotDiff {
            deleted: [file.clone()].into_iter().collect(),
            ..SnapshotDiff::default()
        };
        let report = fx.applier().apply(&d);
        assert!(report.failures[0].ambiguous);

        assert_eq!(fx.index.find_by_path(&path).unwrap().len(), 2);
        assert!(ids_a.iter().chain(&ids_b).all(|id| fx.vectors.contains(id)));
    }

    #[test]
    fn test_failure_is_isolated_per_path() {
        struct PickyParser;
        impl Parser for PickyParser {
            fn parse(&self, record: &FileRecord) -> Result<ParsedDocument> {
                if record.name.starts_with("bad") {
                    return Err(CollabError::Parse {
                        path: record.path.clone(),
                        reason: "unsupported".into(),
                    }
                    .into());
                }
                Ok(ParsedDocument::default())
            }
        }

        let fx = Fixture::new();
        for name in ["bad.txt", "good1.txt", "good2.txt"] {
            fs::write(fx.root().join(name), name).unwrap();
        }
        let s1 = fx.snapshot();
        let d = diff(&DirectorySnapshot::empty(fx.root()), &s1);

        let applier = ChangeApplier::new(&fx.index, &PickyParser, &fx.vectors, &fx.filter);
        let report = applier.apply(&d);

        assert_eq!(report.created, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].phase, ChangeKind::Created);

        let committed = committed_snapshot(&DirectorySnapshot::empty(fx.root()), &s1, &report);
        assert_eq!(committed.len(), 2);
        assert!(committed.get(&fx.root().join("bad.txt")).is_none());
    }

    #[test]
    fn test_vanished_file_is_a_failure_not_a_panic() {
        let fx = Fixture::new();
        let d = SnapshotDiff {
            created: [fx.root().join("ghost.txt")].into_iter().collect(),
            ..SnapshotDiff::default()
        };
        let report = fx.applier().apply(&d);
        assert_eq!(report.failures.len(), 1);
        assert!(fx.index.get_all_files().unwrap().is_empty());
    }

    fn fragment(content: &str) -> Fragment {
        Fragment {
            file_id: "x".into(),
            path: "/x".into(),
            index: 0,
            content: content.into(),
            metadata: crate::storage::Metadata::new(),
        }
    }
}
