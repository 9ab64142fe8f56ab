//! Schema introspection: columns, indexes, and query plans.
//!
//! Migration guards use these to decide whether a phase still has work to
//! do; tests use them to assert on the resulting schema.

use metastore_core::errors::StorageError;
use rusqlite::{params, Connection, OptionalExtension, Params};

use crate::sqlite_err;

/// One row of `pragma_table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub cid: i64,
    pub name: String,
    pub decl_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, StorageError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .map_err(sqlite_err)?;
    Ok(count > 0)
}

/// Columns of `table` in declaration order. Empty if the table does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>, StorageError> {
    let mut stmt = conn
        .prepare(
            "SELECT cid, name, type, \"notnull\", dflt_value, pk
             FROM pragma_table_info(?1)
             ORDER BY cid",
        )
        .map_err(sqlite_err)?;
    let rows = stmt
        .query_map(params![table], |row| {
            Ok(ColumnInfo {
                cid: row.get(0)?,
                name: row.get(1)?,
                decl_type: row.get(2)?,
                not_null: row.get::<_, i64>(3)? != 0,
                default_value: row.get(4)?,
                primary_key: row.get::<_, i64>(5)? != 0,
            })
        })
        .map_err(sqlite_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(sqlite_err)
}

pub fn column_info(
    conn: &Connection,
    table: &str,
    column: &str,
) -> Result<Option<ColumnInfo>, StorageError> {
    Ok(table_columns(conn, table)?
        .into_iter()
        .find(|c| c.name == column))
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, StorageError> {
    Ok(column_info(conn, table, column)?.is_some())
}

pub fn index_exists(conn: &Connection, index: &str) -> Result<bool, StorageError> {
    let found = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND name = ?1",
            params![index],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(sqlite_err)?;
    Ok(found.is_some())
}

/// Names of all indexes on `table`, including automatic ones.
pub fn index_names(conn: &Connection, table: &str) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'index' AND tbl_name = ?1
             ORDER BY name",
        )
        .map_err(sqlite_err)?;
    let rows = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))
        .map_err(sqlite_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(sqlite_err)
}

/// Column names covered by `index`, in key order.
pub fn index_columns(conn: &Connection, index: &str) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")
        .map_err(sqlite_err)?;
    let rows = stmt
        .query_map(params![index], |row| row.get::<_, String>(0))
        .map_err(sqlite_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(sqlite_err)
}

/// CREATE statements of the explicitly created indexes on `table`.
/// Automatic indexes (primary keys, UNIQUE) have no SQL and are skipped.
pub fn index_definitions(conn: &Connection, table: &str) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn
        .prepare(
            "SELECT sql FROM sqlite_master
             WHERE type = 'index' AND tbl_name = ?1 AND sql IS NOT NULL
             ORDER BY name",
        )
        .map_err(sqlite_err)?;
    let rows = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))
        .map_err(sqlite_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(sqlite_err)
}

/// `EXPLAIN QUERY PLAN` detail lines for `sql`.
pub fn explain_query_plan<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn
        .prepare(&format!("EXPLAIN QUERY PLAN {sql}"))
        .map_err(sqlite_err)?;
    let rows = stmt
        .query_map(params, |row| row.get::<_, String>(3))
        .map_err(sqlite_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(sqlite_err)
}
