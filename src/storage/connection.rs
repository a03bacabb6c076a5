//! Shared `SQLite` handle for the file index.
//!
//! One connection sits behind a `parking_lot::Mutex`. It runs in WAL mode
//! so a reopened index sees exactly the last committed batch, and every
//! index mutation goes through [`Database::with_transaction`].

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Arc;

use crate::error::StorageError;
use crate::Result;

const PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA cache_size = -16000;
    PRAGMA temp_store = MEMORY;
    PRAGMA foreign_keys = ON;
";

/// Serialized access to the index database. Clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    label: String,
}

impl Database {
    /// Open (or create) the database file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or configured.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StorageError::Database(format!("failed to open {}: {e}", path.display())))?;

        Self::configured(conn, path.display().to_string())
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot allocate it.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Database(format!("failed to open in-memory index: {e}")))?;
        Self::configured(conn, ":memory:".to_string())
    }

    fn configured(conn: Connection, label: String) -> Result<Self> {
        conn.execute_batch(PRAGMAS)
            .map_err(|e| StorageError::Database(format!("failed to configure {label}: {e}")))?;
        tracing::debug!(db = %label, "Index database ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            label,
        })
    }

    /// Run `f` with the connection held. Statements autocommit.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `f` inside `BEGIN IMMEDIATE`.
    ///
    /// Commits when `f` succeeds. Any error rolls the batch back and is
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or a `Database` error if the transaction
    /// cannot begin or commit.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| StorageError::Database(format!("failed to begin transaction: {e}")))?;

        let outcome = f(&conn);
        let finish = if outcome.is_ok() { "COMMIT" } else { "ROLLBACK" };
        if let Err(e) = conn.execute_batch(finish) {
            if outcome.is_ok() {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(StorageError::Database(format!("failed to commit: {e}")).into());
            }
            tracing::error!(error = %e, "Rollback failed");
        }
        outcome
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("db", &self.label)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn count_rows(db: &Database) -> i64 {
        db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
                .map_err(|e| StorageError::Database(e.to_string()).into())
        })
        .unwrap()
    }

    fn create_table(db: &Database) {
        db.with_conn(|conn| {
            conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", [])?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_wal_mode_on_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("dirs").join("index.db");

        let db = Database::open(&path).unwrap();
        assert!(path.exists());
        let mode: String = db
            .with_conn(|conn| {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
                    .map_err(|e| StorageError::Database(e.to_string()).into())
            })
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_with_transaction_commit() {
        let db = Database::open_in_memory().unwrap();
        create_table(&db);

        db.with_transaction(|conn| {
            conn.execute("INSERT INTO t (id) VALUES (1)", [])?;
            conn.execute("INSERT INTO t (id) VALUES (2)", [])?;
            Ok(())
        })
        .unwrap();

        assert_eq!(count_rows(&db), 2);
    }

    #[test]
    fn test_with_transaction_rollback() {
        let db = Database::open_in_memory().unwrap();
        create_table(&db);

        let result: Result<()> = db.with_transaction(|conn| {
            conn.execute("INSERT INTO t (id) VALUES (1)", [])?;
            Err(crate::Error::internal("simulated failure"))
        });

        assert!(result.is_err());
        assert_eq!(count_rows(&db), 0);
    }

    #[test]
    fn test_transaction_usable_after_rollback() {
        let db = Database::open_in_memory().unwrap();
        create_table(&db);

        let _ = db.with_transaction(|conn| -> Result<()> {
            conn.execute("INSERT INTO t (id) VALUES (1)", [])?;
            // duplicate key aborts the batch
            conn.execute("INSERT INTO t (id) VALUES (1)", [])?;
            Ok(())
        });

        db.with_transaction(|conn| {
            conn.execute("INSERT INTO t (id) VALUES (5)", [])?;
            Ok(())
        })
        .unwrap();

        assert_eq!(count_rows(&db), 1);
    }

    #[test]
    fn test_clone_shares_connection() {
        let db1 = Database::open_in_memory().unwrap();
        create_table(&db1);

        let db2 = db1.clone();
        db2.with_conn(|conn| {
            conn.execute("INSERT INTO t VALUES (123)", [])?;
            Ok(())
        })
        .unwrap();

        assert_eq!(count_rows(&db1), 1);
    }
}
