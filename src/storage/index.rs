//! Transactional facade over the file and mapping tables.

use std::path::Path;

use super::files::{self, DateField};
use super::mappings;
use super::models::{FileRecord, FileType, IndexStats, Metadata};
use super::query::FileQuery;
use super::{init_storage, Database};
use crate::paths;
use crate::Result;

/// Relational index of file records and their document ids.
///
/// Every batch mutation runs in one transaction: either all rows change
/// or none do. Clone is cheap and shares the connection.
#[derive(Debug, Clone)]
pub struct FileIndex {
    db: Database,
}

impl FileIndex {
    /// Open (or create) the index database at `path` and migrate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_database(Database::open(path)?)
    }

    /// In-memory index for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_database(Database::open_in_memory()?)
    }

    /// Wrap an existing database, running pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migration fails.
    pub fn from_database(db: Database) -> Result<Self> {
        init_storage(&db)?;
        Ok(Self { db })
    }

    /// Underlying database handle.
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Insert or replace each record and its mapping rows.
    ///
    /// # Errors
    ///
    /// Returns an error (and commits nothing) if any record fails.
    pub fn upsert_batch(&self, records: &[FileRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.db.with_transaction(|conn| {
            for record in records {
                files::upsert_file(conn, record)?;
            }
            Ok(())
        })?;
        tracing::debug!(count = records.len(), "Upserted file batch");
        Ok(())
    }

    /// Insert or replace one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert(&self, record: &FileRecord) -> Result<()> {
        self.upsert_batch(std::slice::from_ref(record))
    }

    /// Update `path` and `name` for each `(id, new_path)` pair.
    ///
    /// Document ids and mapping rows are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` (and commits nothing) if any id is missing.
    pub fn update_paths(&self, pairs: &[(String, String)]) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        self.db.with_transaction(|conn| {
            for (id, new_path) in pairs {
                files::update_path(conn, id, new_path)?;
            }
            Ok(())
        })
    }

    /// Delete one record, returning the document ids it owned.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no record has `id`.
    pub fn delete_one(&self, id: &str) -> Result<Vec<String>> {
        self.db.with_transaction(|conn| files::delete_file(conn, id))
    }

    /// Delete several records, returning every document id they owned.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` (and commits nothing) if any record is missing.
    pub fn delete_batch(&self, records: &[FileRecord]) -> Result<Vec<String>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        self.db.with_transaction(|conn| {
            let mut removed = Vec::new();
            for record in records {
                removed.extend(files::delete_file(conn, &record.id)?);
            }
            Ok(removed)
        })
    }

    /// Give a record the id derived from its current path.
    ///
    /// Moves keep the old id, so a new file at the old path would collide
    /// with the moved record. Re-keying carries the document ids and
    /// mapping rows over. Returns the record under its new id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no record has `id`.
    pub fn rekey(&self, id: &str) -> Result<FileRecord> {
        self.db.with_transaction(|conn| {
            let mut record = files::get_file(conn, id)?
                .ok_or_else(|| crate::error::StorageError::not_found("file", id))?;
            let new_id = paths::id_for_normalized(&record.path);
            if new_id == record.id {
                return Ok(record);
            }

            files::delete_file(conn, id)?;
            record.id = new_id;
            files::upsert_file(conn, &record)?;
            tracing::debug!(old = id, new = %record.id, path = %record.path, "Re-keyed file");
            Ok(record)
        })
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: &str) -> Result<Option<FileRecord>> {
        self.db.with_conn(|conn| files::get_file(conn, id))
    }

    /// Records at a normalized path. More than one means corruption.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_by_path(&self, path: &str) -> Result<Vec<FileRecord>> {
        self.db.with_conn(|conn| files::find_by_path(conn, path))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_by_path_prefix(&self, prefix: &str) -> Result<Vec<FileRecord>> {
        self.db.with_conn(|conn| files::find_by_path_prefix(conn, prefix))
    }

    /// Exact (`exact = true`) or substring match on the file name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_by_name(&self, pattern: &str, exact: bool) -> Result<Vec<FileRecord>> {
        self.db.with_conn(|conn| files::find_by_name(conn, pattern, exact))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_by_ids(&self, ids: &[String]) -> Result<Vec<FileRecord>> {
        self.db.with_conn(|conn| files::find_by_ids(conn, ids))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_by_document_ids(&self, document_ids: &[String]) -> Result<Vec<FileRecord>> {
        self.db
            .with_conn(|conn| files::find_by_document_ids(conn, document_ids))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_by_type(&self, file_type: FileType) -> Result<Vec<FileRecord>> {
        self.db.with_conn(|conn| files::find_by_type(conn, file_type))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_by_size_range(&self, min: Option<i64>, max: Option<i64>) -> Result<Vec<FileRecord>> {
        self.db
            .with_conn(|conn| files::find_by_size_range(conn, min, max))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_by_date_range(
        &self,
        field: DateField,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<FileRecord>> {
        self.db
            .with_conn(|conn| files::find_by_date_range(conn, field, start, end))
    }

    /// Records whose metadata contains every entry of `filters`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_by_metadata(&self, filters: &Metadata) -> Result<Vec<FileRecord>> {
        self.db.with_conn(|conn| files::find_by_metadata(conn, filters))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn search(&self, query: &FileQuery) -> Result<Vec<FileRecord>> {
        self.db.with_conn(|conn| query.run(conn))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_id_by_path(&self, path: &str) -> Result<Option<String>> {
        self.db.with_conn(|conn| files::get_id_by_path(conn, path))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_document_ids_by_file_id(&self, file_id: &str) -> Result<Vec<String>> {
        self.db
            .with_conn(|conn| mappings::document_ids_for_file(conn, file_id))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_file_ids_by_document_ids(&self, document_ids: &[String]) -> Result<Vec<String>> {
        self.db
            .with_conn(|conn| mappings::file_ids_for_documents(conn, document_ids))
    }

    /// Every document id referenced by any record.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_document_ids(&self) -> Result<Vec<String>> {
        self.db.with_conn(mappings::all_document_ids)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_all_files(&self) -> Result<Vec<FileRecord>> {
        self.db.with_conn(files::list_files)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn stats(&self) -> Result<IndexStats> {
        self.db.with_conn(files::index_stats)
    }

    /// Empty both tables. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn reset(&self) -> Result<()> {
        self.db.with_transaction(files::clear_all)?;
        tracing::info!("File index reset");
        Ok(())
    }
}
