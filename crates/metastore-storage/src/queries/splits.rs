//! Queries for the splits table.
//!
//! Every write derives the `node_id` column from the same `SplitMetadata`
//! that is serialized into `split_metadata_json`, so rows inserted after the
//! v002 migration keep the column equal to the document's `node_id`.

use metastore_core::errors::StorageError;
use metastore_core::model::{NodeId, SplitMetadata, SplitState};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::sqlite_err;

/// A split as stored, with the decoded metadata document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitRow {
    pub split_id: String,
    pub index_uid: String,
    pub split_state: SplitState,
    pub node_id: NodeId,
    pub time_range_start: Option<i64>,
    pub time_range_end: Option<i64>,
    pub create_timestamp: i64,
    pub update_timestamp: i64,
    pub publish_timestamp: Option<i64>,
    pub maturity_timestamp: i64,
    pub tags: Vec<String>,
    pub delete_opstamp: i64,
    pub metadata: SplitMetadata,
}

/// Column values straight from SQLite, decoded outside the row callback.
struct RawSplitRow {
    split_id: String,
    index_uid: String,
    split_state: String,
    node_id: String,
    time_range_start: Option<i64>,
    time_range_end: Option<i64>,
    create_timestamp: i64,
    update_timestamp: i64,
    publish_timestamp: Option<i64>,
    maturity_timestamp: i64,
    tags: String,
    delete_opstamp: i64,
    split_metadata_json: String,
}

const SELECT_COLUMNS: &str = "split_id, index_uid, split_state, node_id, time_range_start, \
    time_range_end, create_timestamp, update_timestamp, publish_timestamp, maturity_timestamp, \
    tags, delete_opstamp, split_metadata_json";

fn read_raw(row: &Row<'_>) -> rusqlite::Result<RawSplitRow> {
    Ok(RawSplitRow {
        split_id: row.get(0)?,
        index_uid: row.get(1)?,
        split_state: row.get(2)?,
        node_id: row.get(3)?,
        time_range_start: row.get(4)?,
        time_range_end: row.get(5)?,
        create_timestamp: row.get(6)?,
        update_timestamp: row.get(7)?,
        publish_timestamp: row.get(8)?,
        maturity_timestamp: row.get(9)?,
        tags: row.get(10)?,
        delete_opstamp: row.get(11)?,
        split_metadata_json: row.get(12)?,
    })
}

impl TryFrom<RawSplitRow> for SplitRow {
    type Error = StorageError;

    fn try_from(raw: RawSplitRow) -> Result<Self, Self::Error> {
        let tags = serde_json::from_str(&raw.tags).map_err(|e| StorageError::Serialization {
            message: format!("tags of split {}: {e}", raw.split_id),
        })?;
        let node_id = NodeId::new(raw.node_id)?;
        let metadata = decode_metadata(&raw.split_metadata_json, &node_id)?;
        Ok(Self {
            split_state: raw.split_state.parse()?,
            node_id,
            metadata,
            split_id: raw.split_id,
            index_uid: raw.index_uid,
            time_range_start: raw.time_range_start,
            time_range_end: raw.time_range_end,
            create_timestamp: raw.create_timestamp,
            update_timestamp: raw.update_timestamp,
            publish_timestamp: raw.publish_timestamp,
            maturity_timestamp: raw.maturity_timestamp,
            tags,
            delete_opstamp: raw.delete_opstamp,
        })
    }
}

/// Decode `split_metadata_json`, taking the node id from the column.
///
/// The column is authoritative: documents written before node ids were
/// recorded carry no usable `node_id` (sentinel rows), and some carry a
/// non-string one that the v002 migration projected as text.
fn decode_metadata(json: &str, node_id: &NodeId) -> Result<SplitMetadata, StorageError> {
    let mut document: serde_json::Value =
        serde_json::from_str(json).map_err(|e| StorageError::Serialization {
            message: format!("split_metadata_json: {e}"),
        })?;
    if let Some(object) = document.as_object_mut() {
        let usable = matches!(
            object.get("node_id"),
            Some(serde_json::Value::String(value)) if !value.is_empty()
        );
        if !usable {
            object.insert(
                "node_id".to_string(),
                serde_json::Value::String(node_id.to_string()),
            );
        }
    }
    serde_json::from_value(document).map_err(|e| StorageError::Serialization {
        message: format!("split_metadata_json: {e}"),
    })
}

/// Insert a split. `node_id` and the other scalar columns are projected
/// from `metadata`.
pub fn insert_split(
    conn: &Connection,
    metadata: &SplitMetadata,
    state: SplitState,
) -> Result<(), StorageError> {
    let metadata_json = metadata.to_json()?;
    let tags = serde_json::to_string(&metadata.tags).map_err(|e| StorageError::Serialization {
        message: e.to_string(),
    })?;
    let delete_opstamp =
        i64::try_from(metadata.delete_opstamp).map_err(|_| StorageError::Serialization {
            message: format!(
                "delete_opstamp {} of split {} exceeds the storable range",
                metadata.delete_opstamp, metadata.split_id
            ),
        })?;
    let (time_range_start, time_range_end) = match metadata.time_range {
        Some(range) => (Some(range.start), Some(range.end)),
        None => (None, None),
    };

    conn.execute(
        "INSERT INTO splits (
            split_id, index_uid, split_state, node_id,
            time_range_start, time_range_end, maturity_timestamp,
            tags, split_metadata_json, delete_opstamp, publish_timestamp
         ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
            CASE WHEN ?3 = 'Published' THEN unixepoch() END
         )",
        params![
            metadata.split_id,
            metadata.index_uid,
            state.as_str(),
            metadata.node_id.as_str(),
            time_range_start,
            time_range_end,
            metadata.maturity_timestamp,
            tags,
            metadata_json,
            delete_opstamp,
        ],
    )
    .map_err(sqlite_err)?;
    Ok(())
}

pub fn get_split(
    conn: &Connection,
    index_uid: &str,
    split_id: &str,
) -> Result<Option<SplitRow>, StorageError> {
    let raw = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM splits WHERE index_uid = ?1 AND split_id = ?2"),
            params![index_uid, split_id],
            read_raw,
        )
        .optional()
        .map_err(sqlite_err)?;
    raw.map(SplitRow::try_from).transpose()
}

/// All splits produced by `node_id`, served by `splits_node_id_idx`.
pub fn list_splits_by_node(
    conn: &Connection,
    node_id: &NodeId,
) -> Result<Vec<SplitRow>, StorageError> {
    query_splits(
        conn,
        &format!("SELECT {SELECT_COLUMNS} FROM splits WHERE node_id = ?1 ORDER BY index_uid, split_id"),
        params![node_id.as_str()],
    )
}

/// Splits of one index, optionally restricted to a state.
pub fn list_splits_by_index(
    conn: &Connection,
    index_uid: &str,
    state: Option<SplitState>,
) -> Result<Vec<SplitRow>, StorageError> {
    match state {
        Some(state) => query_splits(
            conn,
            &format!(
                "SELECT {SELECT_COLUMNS} FROM splits
                 WHERE index_uid = ?1 AND split_state = ?2 ORDER BY split_id"
            ),
            params![index_uid, state.as_str()],
        ),
        None => query_splits(
            conn,
            &format!("SELECT {SELECT_COLUMNS} FROM splits WHERE index_uid = ?1 ORDER BY split_id"),
            params![index_uid],
        ),
    }
}

fn query_splits<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<SplitRow>, StorageError> {
    let mut stmt = conn.prepare_cached(sql).map_err(sqlite_err)?;
    let raws = stmt
        .query_map(params, read_raw)
        .map_err(sqlite_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sqlite_err)?;
    raws.into_iter().map(SplitRow::try_from).collect()
}

/// Move a split to `state`. Publishing stamps `publish_timestamp`.
pub fn update_split_state(
    conn: &Connection,
    index_uid: &str,
    split_id: &str,
    state: SplitState,
) -> Result<(), StorageError> {
    let updated = conn
        .execute(
            "UPDATE splits SET
                split_state = ?3,
                update_timestamp = unixepoch(),
                publish_timestamp = CASE WHEN ?3 = 'Published' THEN unixepoch()
                                         ELSE publish_timestamp END
             WHERE index_uid = ?1 AND split_id = ?2",
            params![index_uid, split_id, state.as_str()],
        )
        .map_err(sqlite_err)?;
    if updated == 0 {
        return Err(StorageError::NotFound {
            entity: "split",
            id: format!("{index_uid}/{split_id}"),
        });
    }
    Ok(())
}

pub fn delete_split(conn: &Connection, index_uid: &str, split_id: &str) -> Result<(), StorageError> {
    let deleted = conn
        .execute(
            "DELETE FROM splits WHERE index_uid = ?1 AND split_id = ?2",
            params![index_uid, split_id],
        )
        .map_err(sqlite_err)?;
    if deleted == 0 {
        return Err(StorageError::NotFound {
            entity: "split",
            id: format!("{index_uid}/{split_id}"),
        });
    }
    Ok(())
}

pub fn count_splits(conn: &Connection) -> Result<usize, StorageError> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM splits", [], |row| row.get(0))
        .map_err(sqlite_err)?;
    Ok(count as usize)
}
