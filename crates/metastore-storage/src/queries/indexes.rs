//! Queries for the indexes table.

use metastore_core::errors::StorageError;
use rusqlite::{params, Connection, OptionalExtension};

use crate::sqlite_err;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub index_uid: String,
    pub index_id: String,
    pub index_metadata_json: String,
    pub create_timestamp: i64,
}

pub fn insert_index(
    conn: &Connection,
    index_uid: &str,
    index_id: &str,
    index_metadata_json: &str,
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO indexes (index_uid, index_id, index_metadata_json) VALUES (?1, ?2, ?3)",
        params![index_uid, index_id, index_metadata_json],
    )
    .map_err(sqlite_err)?;
    Ok(())
}

pub fn get_index(conn: &Connection, index_uid: &str) -> Result<Option<IndexRow>, StorageError> {
    conn.query_row(
        "SELECT index_uid, index_id, index_metadata_json, create_timestamp
         FROM indexes WHERE index_uid = ?1",
        params![index_uid],
        |row| {
            Ok(IndexRow {
                index_uid: row.get(0)?,
                index_id: row.get(1)?,
                index_metadata_json: row.get(2)?,
                create_timestamp: row.get(3)?,
            })
        },
    )
    .optional()
    .map_err(sqlite_err)
}
