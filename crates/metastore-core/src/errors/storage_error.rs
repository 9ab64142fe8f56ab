//! Storage-layer errors for SQLite operations and schema migrations.

use super::error_code::{self, MetastoreErrorCode};
use super::ModelError;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    SqliteError { message: String },

    #[error("migration failed at version {version}: {message}")]
    MigrationFailed { version: u32, message: String },

    #[error("unknown migration version {version}")]
    UnknownMigration { version: u32 },

    /// Rows whose metadata document carries no usable `node_id`.
    /// `split_ids` holds a bounded sample, `count` the full total.
    #[error("{count} split(s) have no node_id in split_metadata_json (e.g. {split_ids:?})")]
    MissingNodeId { count: usize, split_ids: Vec<String> },

    #[error("{count} split(s) have a node_id longer than {max_len} characters (e.g. {split_ids:?})")]
    NodeIdTooLong {
        count: usize,
        split_ids: Vec<String>,
        max_len: usize,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl StorageError {
    /// Wraps a migration-phase failure with the version it happened in,
    /// keeping data-integrity and cancellation errors as they are.
    pub fn in_migration(self, version: u32) -> Self {
        match self {
            Self::SqliteError { message } | Self::Serialization { message } => {
                Self::MigrationFailed { version, message }
            }
            other => other,
        }
    }
}

impl MetastoreErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MigrationFailed { .. } | Self::UnknownMigration { .. } => {
                error_code::MIGRATION_FAILED
            }
            Self::MissingNodeId { .. } | Self::NodeIdTooLong { .. } => error_code::DATA_INTEGRITY,
            Self::Cancelled => error_code::CANCELLED,
            Self::NotFound { .. } => error_code::NOT_FOUND,
            Self::Model(_) => error_code::INVALID_INPUT,
            Self::SqliteError { .. } | Self::Serialization { .. } => error_code::STORAGE_ERROR,
        }
    }
}
