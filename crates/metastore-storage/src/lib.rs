//! metastore-storage: SQLite persistence for splits.
//!
//! Connections (serialized writer + read pool), ordered schema migrations,
//! split queries, schema introspection, and invariant checks over the
//! `node_id` projection of `split_metadata_json`.

pub mod connection;
pub mod migrations;
pub mod queries;
pub mod schema;
pub mod verify;

pub use connection::DatabaseManager;
pub use migrations::{MigrationOptions, MigrationReport};

use metastore_core::errors::StorageError;

/// Convert a driver error into the storage error type.
pub(crate) fn sqlite_err(e: rusqlite::Error) -> StorageError {
    StorageError::SqliteError {
        message: e.to_string(),
    }
}
