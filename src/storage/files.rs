//! File record storage operations.
//!
//! Every mutation here keeps `file_index.document_ids` and the
//! `doc_file_mapping` rows in lockstep. Callers wrap batches in
//! [`Database::with_transaction`](super::Database::with_transaction).

use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Row, ToSql};

use super::mappings::{delete_mappings, document_ids_for_file, replace_mappings};
use super::models::{file_name, FileRecord, FileType, IndexStats, Metadata, MetadataValue};
use crate::error::StorageError;
use crate::Result;

/// Column list matching [`row_to_record`].
pub(crate) const FILE_COLUMNS: &str = "id, path, name, is_directory, file_type, size, \
     created_at, modified_at, metadata, document_ids";

/// Which timestamp a date range filter applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateField {
    Created,
    #[default]
    Modified,
}

impl DateField {
    pub(crate) const fn column(self) -> &'static str {
        match self {
            Self::Created => "created_at",
            Self::Modified => "modified_at",
        }
    }
}

/// Decode one `file_index` row selected with [`FILE_COLUMNS`].
pub(crate) fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let metadata_json: String = row.get(8)?;
    let ids_json: String = row.get(9)?;

    let metadata: Metadata = serde_json::from_str(&metadata_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;
    let document_ids: Vec<String> = serde_json::from_str(&ids_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;
    let file_type: String = row.get(4)?;

    Ok(FileRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        is_directory: row.get(3)?,
        file_type: FileType::parse(&file_type),
        size: row.get(5)?,
        created_at: row.get(6)?,
        modified_at: row.get(7)?,
        metadata,
        document_ids,
    })
}

/// Run a `SELECT {FILE_COLUMNS} ...` query and collect the records.
pub(crate) fn query_records<P>(conn: &Connection, sql: &str, params: P) -> Result<Vec<FileRecord>>
where
    P: rusqlite::Params,
{
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| StorageError::Database(format!("failed to prepare query: {e}")))?;

    let rows = stmt
        .query_map(params, row_to_record)
        .map_err(|e| StorageError::Database(format!("failed to query files: {e}")))?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row.map_err(|e| StorageError::Database(format!("failed to read file: {e}")))?);
    }
    Ok(records)
}

/// `?, ?, ?` with `n` placeholders.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Insert or fully replace a file record and its document mapping.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn upsert_file(conn: &Connection, record: &FileRecord) -> Result<()> {
    // JSON has no NaN or infinity; such a value would not read back
    if let Some((key, _)) = record
        .metadata
        .iter()
        .find(|(_, v)| matches!(v, MetadataValue::Float(f) if !f.is_finite()))
    {
        return Err(StorageError::Column {
            column: "metadata",
            reason: format!("non-finite number under key '{key}'"),
        }
        .into());
    }

    let metadata = serde_json::to_string(&record.metadata).map_err(|e| StorageError::Column {
        column: "metadata",
        reason: e.to_string(),
    })?;
    let document_ids =
        serde_json::to_string(&record.document_ids).map_err(|e| StorageError::Column {
            column: "document_ids",
            reason: e.to_string(),
        })?;

    conn.execute(
        "INSERT INTO file_index (id, path, name, is_directory, file_type, size, created_at, \
         modified_at, metadata, document_ids)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            path = excluded.path,
            name = excluded.name,
            is_directory = excluded.is_directory,
            file_type = excluded.file_type,
            size = excluded.size,
            created_at = excluded.created_at,
            modified_at = excluded.modified_at,
            metadata = excluded.metadata,
            document_ids = excluded.document_ids",
        params![
            record.id,
            record.path,
            record.name,
            record.is_directory,
            record.file_type.as_str(),
            record.size,
            record.created_at,
            record.modified_at,
            metadata,
            document_ids,
        ],
    )
    .map_err(|e| StorageError::Database(format!("failed to upsert file: {e}")))?;

    replace_mappings(conn, &record.id, &record.document_ids)?;

    tracing::trace!(id = %record.id, path = %record.path, "Upserted file");
    Ok(())
}

/// Update only `path` and `name` of an existing record.
///
/// # Errors
///
/// Returns `StorageError::NotFound` if no record has `id`.
pub fn update_path(conn: &Connection, id: &str, new_path: &str) -> Result<()> {
    let rows = conn
        .execute(
            "UPDATE file_index SET path = ?, name = ? WHERE id = ?",
            params![new_path, file_name(new_path), id],
        )
        .map_err(|e| StorageError::Database(format!("failed to update path: {e}")))?;

    if rows == 0 {
        return Err(StorageError::not_found("file", id).into());
    }

    tracing::trace!(id, path = new_path, "Updated file path");
    Ok(())
}

/// Delete a record and its mapping rows, returning the removed document ids.
///
/// # Errors
///
/// Returns `StorageError::NotFound` if no record has `id`.
pub fn delete_file(conn: &Connection, id: &str) -> Result<Vec<String>> {
    let document_ids = document_ids_for_file(conn, id)?;
    delete_mappings(conn, &[id.to_string()])?;

    let rows = conn
        .execute("DELETE FROM file_index WHERE id = ?", [id])
        .map_err(|e| StorageError::Database(format!("failed to delete file: {e}")))?;

    if rows == 0 {
        return Err(StorageError::not_found("file", id).into());
    }

    tracing::trace!(id, documents = document_ids.len(), "Deleted file");
    Ok(document_ids)
}

/// Get a file by id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_file(conn: &Connection, id: &str) -> Result<Option<FileRecord>> {
    let sql = format!("SELECT {FILE_COLUMNS} FROM file_index WHERE id = ?");
    Ok(query_records(conn, &sql, [id])?.into_iter().next())
}

/// All records whose normalized path equals `path`.
///
/// More than one result means the index is corrupt.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_by_path(conn: &Connection, path: &str) -> Result<Vec<FileRecord>> {
    let sql = format!("SELECT {FILE_COLUMNS} FROM file_index WHERE path = ?");
    query_records(conn, &sql, [path])
}

/// All records at or below a directory path.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_by_path_prefix(conn: &Connection, prefix: &str) -> Result<Vec<FileRecord>> {
    let pattern = format!("{}%", like_escape(prefix));
    let sql = format!(
        "SELECT {FILE_COLUMNS} FROM file_index WHERE path LIKE ? ESCAPE '\\' ORDER BY path"
    );
    query_records(conn, &sql, [pattern])
}

/// Id of the first record at `path`, if any.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_id_by_path(conn: &Connection, path: &str) -> Result<Option<String>> {
    let result = conn.query_row(
        "SELECT id FROM file_index WHERE path = ? LIMIT 1",
        [path],
        |row| row.get(0),
    );

    match result {
        Ok(id) => Ok(Some(id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StorageError::Database(e.to_string()).into()),
    }
}

/// Records whose name equals (or contains) `pattern`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_by_name(conn: &Connection, pattern: &str, exact: bool) -> Result<Vec<FileRecord>> {
    if exact {
        let sql = format!("SELECT {FILE_COLUMNS} FROM file_index WHERE name = ? ORDER BY path");
        query_records(conn, &sql, [pattern])
    } else {
        let like = format!("%{}%", like_escape(pattern));
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM file_index WHERE name LIKE ? ESCAPE '\\' ORDER BY path"
        );
        query_records(conn, &sql, [like])
    }
}

/// Records with any of the given ids.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_by_ids(conn: &Connection, ids: &[String]) -> Result<Vec<FileRecord>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {FILE_COLUMNS} FROM file_index WHERE id IN ({}) ORDER BY path",
        placeholders(ids.len())
    );
    query_records(conn, &sql, params_from_iter(ids.iter()))
}

/// Records owning any of the given document ids.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_by_document_ids(conn: &Connection, document_ids: &[String]) -> Result<Vec<FileRecord>> {
    if document_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {FILE_COLUMNS} FROM file_index WHERE id IN (
            SELECT DISTINCT file_id FROM doc_file_mapping WHERE document_id IN ({})
         ) ORDER BY path",
        placeholders(document_ids.len())
    );
    query_records(conn, &sql, params_from_iter(document_ids.iter()))
}

/// Records of one file type.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_by_type(conn: &Connection, file_type: FileType) -> Result<Vec<FileRecord>> {
    let sql = format!("SELECT {FILE_COLUMNS} FROM file_index WHERE file_type = ? ORDER BY path");
    query_records(conn, &sql, [file_type.as_str()])
}

/// Records whose size lies in `[min, max]` (either bound optional).
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_by_size_range(
    conn: &Connection,
    min: Option<i64>,
    max: Option<i64>,
) -> Result<Vec<FileRecord>> {
    let sql = format!(
        "SELECT {FILE_COLUMNS} FROM file_index
         WHERE (?1 IS NULL OR size >= ?1) AND (?2 IS NULL OR size <= ?2)
         ORDER BY path"
    );
    query_records(conn, &sql, params![min, max])
}

/// Records whose chosen timestamp lies in `[start, end]` (Unix seconds).
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_by_date_range(
    conn: &Connection,
    field: DateField,
    start: Option<i64>,
    end: Option<i64>,
) -> Result<Vec<FileRecord>> {
    let column = field.column();
    let sql = format!(
        "SELECT {FILE_COLUMNS} FROM file_index
         WHERE (?1 IS NULL OR {column} >= ?1) AND (?2 IS NULL OR {column} <= ?2)
         ORDER BY path"
    );
    query_records(conn, &sql, params![start, end])
}

/// Records whose metadata contains every `(key, value)` pair in `filters`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_by_metadata(conn: &Connection, filters: &Metadata) -> Result<Vec<FileRecord>> {
    let sql = format!("SELECT {FILE_COLUMNS} FROM file_index ORDER BY path");
    let records = query_records(conn, &sql, [])?;

    Ok(records
        .into_iter()
        .filter(|record| {
            filters
                .iter()
                .all(|(key, value)| record.metadata.get(key) == Some(value))
        })
        .collect())
}

/// Every record in the index.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_files(conn: &Connection) -> Result<Vec<FileRecord>> {
    let sql = format!("SELECT {FILE_COLUMNS} FROM file_index ORDER BY path");
    query_records(conn, &sql, [])
}

/// Count file records.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_files(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM file_index", [], |row| row.get(0))
        .map_err(|e| StorageError::Database(e.to_string()).into())
}

/// Row counts for both tables.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn index_stats(conn: &Connection) -> Result<IndexStats> {
    conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM file_index),
            (SELECT COUNT(*) FROM doc_file_mapping),
            (SELECT COUNT(DISTINCT document_id) FROM doc_file_mapping)",
        [],
        |row| {
            Ok(IndexStats {
                files: row.get(0)?,
                mappings: row.get(1)?,
                unique_documents: row.get(2)?,
            })
        },
    )
    .map_err(|e| StorageError::Database(e.to_string()).into())
}

/// Empty both tables, keeping the schema.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn clear_all(conn: &Connection) -> Result<()> {
    conn.execute_batch("DELETE FROM doc_file_mapping; DELETE FROM file_index;")
        .map_err(|e| StorageError::Database(format!("failed to clear index: {e}")))?;
    Ok(())
}

/// Bind helper used by [`super::query::FileQuery`].
pub(crate) type BoxedParam = Box<dyn ToSql>;
