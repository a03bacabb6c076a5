//! `SQLite` relational index.
//!
//! This module provides persistent storage for:
//! - File records (path, type, size, timestamps, metadata)
//! - The document-id to file-id mapping kept in lockstep with each record

mod connection;
mod files;
mod index;
mod mappings;
mod models;
mod query;
mod schema;

pub use connection::Database;
pub use files::DateField;
pub use index::FileIndex;
pub use models::{FileRecord, FileType, IndexStats, Metadata, MetadataValue};
pub use query::{FileQuery, SortField, SortOrder};
pub use schema::{migrate, verify_schema, SCHEMA_VERSION};

/// Initialize storage with migrations.
///
/// # Errors
///
/// Returns an error if database initialization fails.
pub fn init_storage(db: &Database) -> crate::Result<()> {
    db.with_conn(|conn| {
        migrate(conn)?;
        verify_schema(conn)?;

        tracing::info!("Storage initialized, schema version {SCHEMA_VERSION}");
        Ok(())
    })
}
