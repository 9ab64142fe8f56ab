//! Consistency checks for the `node_id` projection.
//!
//! After v002 every split must have a non-null `node_id` of at most 253
//! characters that equals the `node_id` key of its metadata document.
//! Rows whose document has no usable node id (filled with a sentinel during
//! the migration) are counted separately and do not break consistency.

use metastore_core::constants::{NODE_ID_INDEX_NAME, NODE_ID_MAX_LEN, SPLITS_TABLE};
use metastore_core::errors::StorageError;
use rusqlite::Connection;

use crate::migrations::v002_split_node_id::{extracted_node_id_sql, missing_node_id_predicate};
use crate::schema;
use crate::sqlite_err;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvariantReport {
    pub total_rows: usize,
    pub null_node_ids: usize,
    pub over_length: usize,
    /// Splits whose column disagrees with their document, by split id.
    pub mismatched: Vec<String>,
    /// Splits whose document has no usable `node_id` (missing, null, or empty).
    pub missing_in_document: usize,
    pub column_not_null: bool,
    pub index_present: bool,
}

impl InvariantReport {
    pub fn is_consistent(&self) -> bool {
        self.null_node_ids == 0
            && self.over_length == 0
            && self.mismatched.is_empty()
            && self.column_not_null
            && self.index_present
    }
}

/// Inspect every split. Fails with `NotFound` if the column does not exist.
pub fn verify_node_id_invariant(conn: &Connection) -> Result<InvariantReport, StorageError> {
    let column = schema::column_info(conn, SPLITS_TABLE, "node_id")?.ok_or_else(|| {
        StorageError::NotFound {
            entity: "column",
            id: "splits.node_id".to_string(),
        }
    })?;

    let count = |predicate: &str| -> Result<usize, StorageError> {
        let n: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM splits WHERE {predicate}"),
                [],
                |row| row.get(0),
            )
            .map_err(sqlite_err)?;
        Ok(n as usize)
    };

    let total_rows = count("1")?;
    let null_node_ids = count("node_id IS NULL")?;
    let over_length = count(&format!("length(node_id) > {NODE_ID_MAX_LEN}"))?;
    let missing_predicate = missing_node_id_predicate();
    let missing_in_document = count(&missing_predicate)?;

    let mut stmt = conn
        .prepare(&format!(
            "SELECT split_id FROM splits
             WHERE NOT ({missing_predicate}) AND node_id IS NOT {}
             ORDER BY index_uid, split_id",
            extracted_node_id_sql()
        ))
        .map_err(sqlite_err)?;
    let mismatched = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(sqlite_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sqlite_err)?;

    let report = InvariantReport {
        total_rows,
        null_node_ids,
        over_length,
        mismatched,
        missing_in_document,
        column_not_null: column.not_null,
        index_present: schema::index_exists(conn, NODE_ID_INDEX_NAME)?,
    };
    if !report.is_consistent() {
        tracing::warn!(?report, "node_id invariant violated");
    }
    Ok(report)
}

/// True if an equality lookup on `node_id` is planned through the index.
pub fn node_id_index_used(conn: &Connection) -> Result<bool, StorageError> {
    let plan = schema::explain_query_plan(
        conn,
        "SELECT split_id FROM splits WHERE node_id = ?1",
        ["indexer-0"],
    )?;
    Ok(plan.iter().any(|detail| detail.contains(NODE_ID_INDEX_NAME)))
}
