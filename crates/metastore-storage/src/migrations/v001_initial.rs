//! V001: Initial schema: indexes and splits.

use metastore_core::errors::StorageError;
use rusqlite::Connection;

use super::MigrationOptions;
use crate::sqlite_err;

pub const MIGRATION_SQL: &str = r#"
-- One row per index. The metadata document is opaque to the storage layer.
CREATE TABLE IF NOT EXISTS indexes (
    index_uid TEXT PRIMARY KEY,
    index_id TEXT NOT NULL UNIQUE,
    index_metadata_json TEXT NOT NULL,
    create_timestamp INTEGER NOT NULL DEFAULT (unixepoch())
) STRICT;

-- One row per split. split_metadata_json is the source of truth;
-- the scalar columns are projections kept for filtering.
CREATE TABLE IF NOT EXISTS splits (
    split_id TEXT NOT NULL,
    split_state TEXT NOT NULL,
    time_range_start INTEGER,
    time_range_end INTEGER,
    create_timestamp INTEGER NOT NULL DEFAULT (unixepoch()),
    update_timestamp INTEGER NOT NULL DEFAULT (unixepoch()),
    publish_timestamp INTEGER,
    maturity_timestamp INTEGER NOT NULL DEFAULT 0,
    tags TEXT NOT NULL DEFAULT '[]',
    split_metadata_json TEXT NOT NULL,
    index_uid TEXT NOT NULL REFERENCES indexes(index_uid),
    delete_opstamp INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (index_uid, split_id)
) STRICT;

CREATE INDEX IF NOT EXISTS splits_index_uid_idx ON splits(index_uid);
CREATE INDEX IF NOT EXISTS splits_split_state_idx ON splits(split_state);
"#;

pub fn up(conn: &Connection, _options: &MigrationOptions) -> Result<usize, StorageError> {
    conn.execute_batch(MIGRATION_SQL).map_err(sqlite_err)?;
    Ok(0)
}

pub fn down(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        DROP TABLE IF EXISTS splits;
        DROP TABLE IF EXISTS indexes;
        ",
    )
    .map_err(sqlite_err)
}
