//! V002: `splits.node_id`, projected from `split_metadata_json`.
//!
//! Three ordered phases, each guarded so a re-run against a partially
//! applied schema only does the remaining work:
//!
//! 1. add `node_id` as a nullable column (skipped if present);
//! 2. backfill it from the `node_id` key of the metadata document;
//! 3. make it NOT NULL with a 253-character bound (skipped if already
//!    NOT NULL), then create `splits_node_id_idx` if absent.
//!
//! SQLite cannot tighten a column in place, so phase 3 rebuilds the table.
//! The runner wraps all phases in one transaction: any failure, including a
//! row that still has no node id when the constraint is applied, rolls the
//! table back to its pre-migration shape.

use metastore_core::config::MissingNodeIdPolicy;
use metastore_core::constants::{
    NODE_ID_INDEX_NAME, NODE_ID_JSON_PATH, NODE_ID_MAX_LEN, SPLITS_TABLE,
};
use metastore_core::errors::StorageError;
use rusqlite::{params, Connection};

use super::MigrationOptions;
use crate::schema;
use crate::sqlite_err;

const NODE_ID_COLUMN: &str = "node_id";

/// Offending split ids included in data-integrity errors.
const ERROR_SAMPLE_SIZE: usize = 10;

pub const ADD_COLUMN_SQL: &str = "ALTER TABLE splits ADD COLUMN node_id TEXT";

/// `->>`-style extraction of the document's node id: non-string JSON values
/// become their text form, a missing key or JSON null becomes SQL NULL.
pub fn extracted_node_id_sql() -> String {
    format!("CAST(json_extract(split_metadata_json, '{NODE_ID_JSON_PATH}') AS TEXT)")
}

/// Rows whose document carries no usable node id: missing, null, or empty.
pub fn missing_node_id_predicate() -> String {
    format!("coalesce({}, '') = ''", extracted_node_id_sql())
}

pub const CREATE_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS splits_node_id_idx ON splits(node_id)";

/// Shape of `splits` once `node_id` is constrained.
const CONSTRAINED_TABLE_SQL: &str = r#"
CREATE TABLE splits_node_id_rebuild (
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
    node_id TEXT NOT NULL CHECK (length(node_id) BETWEEN 1 AND 253),
    PRIMARY KEY (index_uid, split_id)
) STRICT;
"#;

const COPY_COLUMNS: &str = "split_id, split_state, time_range_start, time_range_end, \
    create_timestamp, update_timestamp, publish_timestamp, maturity_timestamp, tags, \
    split_metadata_json, index_uid, delete_opstamp, node_id";

pub fn up(conn: &Connection, options: &MigrationOptions) -> Result<usize, StorageError> {
    tracing::info!("v002: adding splits.node_id");

    add_node_id_column(conn)?;
    options.check_cancelled()?;

    let filled = backfill_node_id(conn, &options.missing_node_id)?;
    options.check_cancelled()?;

    tighten_node_id(conn)?;
    options.check_cancelled()?;

    create_node_id_index(conn)?;
    Ok(filled)
}

/// Phase 1: add the nullable column. Returns false if it already existed.
pub fn add_node_id_column(conn: &Connection) -> Result<bool, StorageError> {
    if schema::column_exists(conn, SPLITS_TABLE, NODE_ID_COLUMN)? {
        tracing::debug!("v002: splits.node_id already exists, skipping add");
        return Ok(false);
    }
    conn.execute_batch(ADD_COLUMN_SQL).map_err(sqlite_err)?;
    tracing::debug!("v002: added column splits.node_id");
    Ok(true)
}

/// Phase 2: project the document's node id onto every row.
///
/// Every row whose column differs from its document is rewritten, so a
/// stale value left by an interrupted earlier attempt is corrected too.
/// Rows whose document has no usable node id (missing, null, or empty) are
/// resolved by `policy`: `Fail` returns [`StorageError::MissingNodeId`],
/// `Sentinel` writes the sentinel to those rows only. Values over the length
/// bound are reported as [`StorageError::NodeIdTooLong`]. Returns the number
/// of rows written.
pub fn backfill_node_id(
    conn: &Connection,
    policy: &MissingNodeIdPolicy,
) -> Result<usize, StorageError> {
    let extracted = extracted_node_id_sql();
    let missing_predicate = missing_node_id_predicate();

    let backfilled = conn
        .execute(
            &format!(
                "UPDATE splits SET node_id = {extracted}
                 WHERE NOT ({missing_predicate}) AND node_id IS NOT {extracted}"
            ),
            [],
        )
        .map_err(sqlite_err)?;

    let missing = offending_splits(conn, &missing_predicate)?;
    let mut defaulted = 0;
    if missing.count > 0 {
        match policy {
            MissingNodeIdPolicy::Fail => {
                return Err(StorageError::MissingNodeId {
                    count: missing.count,
                    split_ids: missing.sample,
                });
            }
            MissingNodeIdPolicy::Sentinel(sentinel) => {
                defaulted = conn
                    .execute(
                        &format!(
                            "UPDATE splits SET node_id = ?1
                             WHERE {missing_predicate} AND node_id IS NOT ?1"
                        ),
                        params![sentinel.as_str()],
                    )
                    .map_err(sqlite_err)?;
                tracing::warn!(
                    rows = missing.count,
                    sentinel = %sentinel,
                    "v002: splits without node_id in metadata filled with sentinel"
                );
            }
        }
    }

    let too_long = offending_splits(conn, &format!("length(node_id) > {NODE_ID_MAX_LEN}"))?;
    if too_long.count > 0 {
        return Err(StorageError::NodeIdTooLong {
            count: too_long.count,
            split_ids: too_long.sample,
            max_len: NODE_ID_MAX_LEN,
        });
    }

    tracing::info!(backfilled, defaulted, "v002: backfilled splits.node_id");
    Ok(backfilled + defaulted)
}

/// Phase 3a: enforce NOT NULL and the length bound by rebuilding `splits`.
/// Returns false if the column was already NOT NULL.
///
/// The engine re-checks every row while copying, so a null or over-length
/// value left behind fails the statement and, with it, the transaction.
pub fn tighten_node_id(conn: &Connection) -> Result<bool, StorageError> {
    let column = schema::column_info(conn, SPLITS_TABLE, NODE_ID_COLUMN)?.ok_or_else(|| {
        StorageError::SqliteError {
            message: "splits.node_id must exist before it can be constrained".to_string(),
        }
    })?;
    if column.not_null {
        tracing::debug!("v002: splits.node_id already NOT NULL, skipping rebuild");
        return Ok(false);
    }

    // Dropping the table drops its indexes; keep their definitions to
    // recreate them on the rebuilt table.
    let index_definitions = schema::index_definitions(conn, SPLITS_TABLE)?;

    conn.execute_batch(CONSTRAINED_TABLE_SQL).map_err(sqlite_err)?;
    let copied = conn
        .execute(
            &format!(
                "INSERT INTO splits_node_id_rebuild ({COPY_COLUMNS})
                 SELECT {COPY_COLUMNS} FROM splits"
            ),
            [],
        )
        .map_err(sqlite_err)?;
    conn.execute_batch(
        "
        DROP TABLE splits;
        ALTER TABLE splits_node_id_rebuild RENAME TO splits;
        ",
    )
    .map_err(sqlite_err)?;
    for definition in &index_definitions {
        conn.execute_batch(definition).map_err(sqlite_err)?;
    }

    tracing::info!(
        rows = copied,
        indexes = index_definitions.len(),
        "v002: splits.node_id is now NOT NULL"
    );
    Ok(true)
}

/// Phase 3b: create the equality-lookup index. Returns false if it existed.
///
/// SQLite has no hash indexes; a B-tree index serves the same
/// `node_id = ?` lookups.
pub fn create_node_id_index(conn: &Connection) -> Result<bool, StorageError> {
    if schema::index_exists(conn, NODE_ID_INDEX_NAME)? {
        tracing::debug!("v002: {NODE_ID_INDEX_NAME} already exists");
        return Ok(false);
    }
    conn.execute_batch(CREATE_INDEX_SQL).map_err(sqlite_err)?;
    Ok(true)
}

/// Reverse step: drop the index, then the column.
pub fn down(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch("DROP INDEX IF EXISTS splits_node_id_idx;")
        .map_err(sqlite_err)?;
    if schema::column_exists(conn, SPLITS_TABLE, NODE_ID_COLUMN)? {
        conn.execute_batch("ALTER TABLE splits DROP COLUMN node_id;")
            .map_err(sqlite_err)?;
    }
    tracing::info!("v002: dropped splits.node_id");
    Ok(())
}

struct OffendingSplits {
    count: usize,
    sample: Vec<String>,
}

fn offending_splits(conn: &Connection, predicate: &str) -> Result<OffendingSplits, StorageError> {
    let count: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM splits WHERE {predicate}"),
            [],
            |row| row.get(0),
        )
        .map_err(sqlite_err)?;
    if count == 0 {
        return Ok(OffendingSplits {
            count: 0,
            sample: Vec::new(),
        });
    }
    let mut stmt = conn
        .prepare(&format!(
            "SELECT split_id FROM splits WHERE {predicate} ORDER BY index_uid, split_id LIMIT ?1"
        ))
        .map_err(sqlite_err)?;
    let sample = stmt
        .query_map(params![ERROR_SAMPLE_SIZE as i64], |row| row.get::<_, String>(0))
        .map_err(sqlite_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sqlite_err)?;
    Ok(OffendingSplits {
        count: count as usize,
        sample,
    })
}
