//! Write connection utilities: BEGIN IMMEDIATE transactions.

use metastore_core::errors::StorageError;
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Execute a write operation inside a BEGIN IMMEDIATE transaction.
///
/// The write lock is acquired at transaction start, so the closure never
/// hits SQLITE_BUSY halfway through. If the closure fails, the transaction
/// is dropped and rolled back, schema changes included.
pub fn with_immediate_transaction<F, T>(conn: &Connection, f: F) -> Result<T, StorageError>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, StorageError>,
{
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate).map_err(|e| {
        StorageError::SqliteError {
            message: format!("failed to begin immediate transaction: {e}"),
        }
    })?;

    let result = f(&tx)?;

    tx.commit().map_err(|e| StorageError::SqliteError {
        message: format!("failed to commit: {e}"),
    })?;

    Ok(result)
}
