//! Connection management: write-serialized + read-pooled.

pub mod pool;
pub mod pragmas;
pub mod writer;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use metastore_core::config::StorageConfig;
use metastore_core::errors::StorageError;
use rusqlite::Connection;

use self::pool::ReadPool;
use self::pragmas::apply_pragmas;
use crate::migrations::{self, MigrationOptions, MigrationReport};
use crate::sqlite_err;

/// Manages the single write connection and the read connection pool.
///
/// Opening a database does not migrate it; call [`DatabaseManager::migrate`]
/// or [`DatabaseManager::migrate_to`] explicitly.
pub struct DatabaseManager {
    writer: Mutex<Connection>,
    /// `None` for in-memory databases: separate in-memory connections are
    /// isolated databases, so reads go through the writer instead.
    readers: Option<ReadPool>,
    path: Option<PathBuf>,
}

impl DatabaseManager {
    /// Open a database at the given path and apply pragmas.
    pub fn open(path: &Path, config: &StorageConfig) -> Result<Self, StorageError> {
        let busy_timeout_ms = config.effective_busy_timeout_ms();
        let writer = Connection::open(path).map_err(sqlite_err)?;
        apply_pragmas(&writer, busy_timeout_ms)?;

        let readers = ReadPool::open(path, config.effective_read_pool_size(), busy_timeout_ms)?;
        tracing::debug!(path = %path.display(), readers = readers.size(), "opened metastore database");

        Ok(Self {
            writer: Mutex::new(writer),
            readers: Some(readers),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let writer = Connection::open_in_memory().map_err(sqlite_err)?;
        apply_pragmas(&writer, StorageConfig::default().effective_busy_timeout_ms())?;
        Ok(Self {
            writer: Mutex::new(writer),
            readers: None,
            path: None,
        })
    }

    /// Execute a write operation with the serialized writer connection.
    pub fn with_writer<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let guard = self.writer.lock().map_err(|_| StorageError::SqliteError {
            message: "write lock poisoned".to_string(),
        })?;
        f(&guard)
    }

    /// Execute a read operation on the best available connection.
    pub fn with_reader<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        match &self.readers {
            Some(readers) => readers.with_conn(f),
            None => self.with_writer(f),
        }
    }

    /// Apply every pending migration.
    pub fn migrate(&self, options: &MigrationOptions) -> Result<MigrationReport, StorageError> {
        self.with_writer(|conn| migrations::run_migrations(conn, options))
    }

    /// Migrate up or down to `target`.
    pub fn migrate_to(
        &self,
        target: u32,
        options: &MigrationOptions,
    ) -> Result<MigrationReport, StorageError> {
        self.with_writer(|conn| migrations::migrate_to(conn, target, options))
    }

    /// Current schema version.
    pub fn schema_version(&self) -> Result<u32, StorageError> {
        self.with_writer(migrations::current_version)
    }

    /// Run a WAL checkpoint (TRUNCATE mode), e.g. after a large backfill.
    pub fn checkpoint(&self) -> Result<(), StorageError> {
        self.with_writer(|conn| {
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
                .map_err(sqlite_err)
        })
    }

    /// Get the database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
