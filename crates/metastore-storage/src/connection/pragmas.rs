//! PRAGMA configuration applied to every SQLite connection.
//!
//! WAL mode, NORMAL sync, foreign_keys ON, configurable busy_timeout.

use metastore_core::errors::StorageError;
use rusqlite::Connection;

use crate::sqlite_err;

/// Apply write-side pragmas.
pub fn apply_pragmas(conn: &Connection, busy_timeout_ms: u64) -> Result<(), StorageError> {
    conn.execute_batch(&format!(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = {busy_timeout_ms};
        PRAGMA foreign_keys = ON;
        "
    ))
    .map_err(sqlite_err)
}

/// Apply read-side pragmas. Read connections never modify the journal mode.
pub fn apply_read_pragmas(conn: &Connection, busy_timeout_ms: u64) -> Result<(), StorageError> {
    conn.execute_batch(&format!(
        "
        PRAGMA busy_timeout = {busy_timeout_ms};
        PRAGMA query_only = ON;
        "
    ))
    .map_err(sqlite_err)
}

/// Verify that WAL mode is active on a connection.
pub fn verify_wal_mode(conn: &Connection) -> Result<bool, StorageError> {
    let mode: String = conn
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .map_err(sqlite_err)?;
    Ok(mode.eq_ignore_ascii_case("wal"))
}
