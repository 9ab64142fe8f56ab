//! ReadPool: round-robin read-only connections.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use metastore_core::errors::StorageError;
use rusqlite::{Connection, OpenFlags};

use super::pragmas::apply_read_pragmas;
use crate::sqlite_err;

const MAX_POOL_SIZE: usize = 8;

/// A pool of read-only SQLite connections with round-robin selection.
pub struct ReadPool {
    connections: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl ReadPool {
    /// Open `pool_size` read-only connections (clamped to 1..=8).
    pub fn open(path: &Path, pool_size: usize, busy_timeout_ms: u64) -> Result<Self, StorageError> {
        let size = pool_size.clamp(1, MAX_POOL_SIZE);
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(sqlite_err)?;
            apply_read_pragmas(&conn, busy_timeout_ms)?;
            connections.push(Mutex::new(conn));
        }
        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    /// Execute a closure with a read connection (round-robin).
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        let guard = self.connections[idx]
            .lock()
            .map_err(|_| StorageError::SqliteError {
                message: "read pool lock poisoned".to_string(),
            })?;
        f(&guard)
    }

    pub fn size(&self) -> usize {
        self.connections.len()
    }
}
