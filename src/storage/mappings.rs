//! Document-to-file mapping table operations.

use rusqlite::{params, params_from_iter, Connection};

use super::files::placeholders;
use crate::error::StorageError;
use crate::Result;

/// Replace every mapping row of `file_id` with `document_ids`.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn replace_mappings(conn: &Connection, file_id: &str, document_ids: &[String]) -> Result<()> {
    conn.execute("DELETE FROM doc_file_mapping WHERE file_id = ?", [file_id])
        .map_err(|e| StorageError::Database(format!("failed to clear mappings: {e}")))?;

    if document_ids.is_empty() {
        return Ok(());
    }

    let mut stmt = conn
        .prepare_cached(
            "INSERT OR IGNORE INTO doc_file_mapping (document_id, file_id) VALUES (?, ?)",
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

    for doc_id in document_ids {
        stmt.execute(params![doc_id, file_id])
            .map_err(|e| StorageError::Database(format!("failed to insert mapping: {e}")))?;
    }

    Ok(())
}

/// Remove all mapping rows for the given files.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn delete_mappings(conn: &Connection, file_ids: &[String]) -> Result<usize> {
    if file_ids.is_empty() {
        return Ok(0);
    }

    let sql = format!(
        "DELETE FROM doc_file_mapping WHERE file_id IN ({})",
        placeholders(file_ids.len())
    );
    conn.execute(&sql, params_from_iter(file_ids.iter()))
        .map_err(|e| StorageError::Database(format!("failed to delete mappings: {e}")).into())
}

/// Document ids mapped to one file, in insertion order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn document_ids_for_file(conn: &Connection, file_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare_cached("SELECT document_id FROM doc_file_mapping WHERE file_id = ? ORDER BY rowid")
        .map_err(|e| StorageError::Database(e.to_string()))?;

    let ids = stmt
        .query_map([file_id], |row| row.get(0))
        .map_err(|e| StorageError::Database(e.to_string()))?
        .collect::<std::result::Result<Vec<String>, _>>()
        .map_err(|e| StorageError::Database(e.to_string()))?;

    Ok(ids)
}

/// Distinct file ids owning any of `document_ids`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn file_ids_for_documents(conn: &Connection, document_ids: &[String]) -> Result<Vec<String>> {
    if document_ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT DISTINCT file_id FROM doc_file_mapping WHERE document_id IN ({}) ORDER BY file_id",
        placeholders(document_ids.len())
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| StorageError::Database(e.to_string()))?;

    let ids = stmt
        .query_map(params_from_iter(document_ids.iter()), |row| row.get(0))
        .map_err(|e| StorageError::Database(e.to_string()))?
        .collect::<std::result::Result<Vec<String>, _>>()
        .map_err(|e| StorageError::Database(e.to_string()))?;

    Ok(ids)
}

/// Every document id referenced by the mapping table.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn all_document_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT DISTINCT document_id FROM doc_file_mapping ORDER BY document_id")
        .map_err(|e| StorageError::Database(e.to_string()))?;

    let ids = stmt
        .query_map([], |row| row.get(0))
        .map_err(|e| StorageError::Database(e.to_string()))?
        .collect::<std::result::Result<Vec<String>, _>>()
        .map_err(|e| StorageError::Database(e.to_string()))?;

    Ok(ids)
}
