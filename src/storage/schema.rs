//! Database schema definitions and migrations.
//!
//! Provides versioned schema migrations for safe database upgrades.

use rusqlite::Connection;

use crate::error::StorageError;
use crate::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Tables every migrated database must contain.
const EXPECTED_TABLES: &[&str] = &["file_index", "doc_file_mapping"];

/// Run all pending migrations.
///
/// # Errors
///
/// Returns an error if migrations fail.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| StorageError::Migration(format!("failed to create migrations table: {e}")))?;

    let current_version = get_current_version(conn)?;
    tracing::debug!(
        current = current_version,
        target = SCHEMA_VERSION,
        "Checking database migrations"
    );

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn get_current_version(conn: &Connection) -> Result<i32> {
    let result = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    );

    match result {
        Ok(version) => Ok(version),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(StorageError::Migration(format!("failed to get version: {e}")).into()),
    }
}

fn record_migration(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)",
        rusqlite::params![version, super::models::now_unix()],
    )
    .map_err(|e| StorageError::Migration(format!("failed to record migration: {e}")))?;

    Ok(())
}

/// Migration v1: file records and the document mapping.
///
/// `path` is indexed but deliberately not unique: duplicate paths are a
/// corruption signal that callers must be able to observe.
fn migrate_v1(conn: &Connection) -> Result<()> {
    tracing::info!("Applying migration v1: file index schema");

    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS file_index (
            id TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            name TEXT NOT NULL,
            is_directory INTEGER NOT NULL DEFAULT 0,
            file_type TEXT NOT NULL,
            size INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            modified_at INTEGER NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',   -- JSON object
            document_ids TEXT NOT NULL DEFAULT '[]' -- JSON array
        );

        CREATE INDEX IF NOT EXISTS idx_file_index_path ON file_index(path);
        CREATE INDEX IF NOT EXISTS idx_file_index_name ON file_index(name);
        CREATE INDEX IF NOT EXISTS idx_file_index_modified ON file_index(modified_at);

        CREATE TABLE IF NOT EXISTS doc_file_mapping (
            document_id TEXT NOT NULL,
            file_id TEXT NOT NULL REFERENCES file_index(id) ON DELETE CASCADE,
            PRIMARY KEY (document_id, file_id)
        );

        CREATE INDEX IF NOT EXISTS idx_mapping_document_id ON doc_file_mapping(document_id);
        CREATE INDEX IF NOT EXISTS idx_mapping_file_id ON doc_file_mapping(file_id);
        ",
    )
    .map_err(|e| StorageError::Migration(format!("v1 migration failed: {e}")))?;

    record_migration(conn, 1)?;
    tracing::info!("Migration v1 complete");

    Ok(())
}

/// Verify all expected tables exist.
///
/// # Errors
///
/// Returns an error if any expected table is missing from the schema.
pub fn verify_schema(conn: &Connection) -> Result<()> {
    for table in EXPECTED_TABLES {
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?",
                [table],
                |_| Ok(true),
            )
            .unwrap_or(false);

        if !exists {
            return Err(StorageError::Migration(format!("table '{table}' not found")).into());
        }
    }

    tracing::debug!("Schema verification passed");
    Ok(())
}
