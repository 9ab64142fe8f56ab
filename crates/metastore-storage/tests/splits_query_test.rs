//! Tests for split reads and writes on a fully migrated schema.

use std::collections::BTreeSet;

use metastore_core::errors::StorageError;
use metastore_core::model::{NodeId, SplitMetadata, SplitState, TimeRange};
use metastore_storage::migrations::{run_migrations, MigrationOptions};
use metastore_storage::queries::{indexes, splits};
use metastore_storage::verify;
use rusqlite::Connection;

const INDEX_UID: &str = "logs:01HQ";

fn setup_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
    run_migrations(&conn, &MigrationOptions::default()).unwrap();
    indexes::insert_index(&conn, INDEX_UID, "logs", r#"{"index_id":"logs"}"#).unwrap();
    conn
}

fn split(split_id: &str, node_id: &str) -> SplitMetadata {
    SplitMetadata::new(split_id, INDEX_UID, NodeId::new(node_id).unwrap())
}

#[test]
fn insert_and_get_roundtrip() {
    let conn = setup_db();
    let mut meta = split("s1", "indexer-1");
    meta.num_docs = 1_000;
    meta.time_range = Some(TimeRange {
        start: 1_700_000_000,
        end: 1_700_003_600,
    });
    meta.tags = BTreeSet::from(["tenant:acme".to_string()]);
    meta.maturity_timestamp = 1_700_100_000;
    splits::insert_split(&conn, &meta, SplitState::Staged).unwrap();

    let row = splits::get_split(&conn, INDEX_UID, "s1").unwrap().unwrap();
    assert_eq!(row.node_id.as_str(), "indexer-1");
    assert_eq!(row.split_state, SplitState::Staged);
    assert_eq!(row.time_range_start, Some(1_700_000_000));
    assert_eq!(row.time_range_end, Some(1_700_003_600));
    assert_eq!(row.maturity_timestamp, 1_700_100_000);
    assert_eq!(row.tags, vec!["tenant:acme"]);
    assert!(row.publish_timestamp.is_none());
    assert_eq!(row.metadata, meta);
}

#[test]
fn get_missing_split_is_none() {
    let conn = setup_db();
    assert!(splits::get_split(&conn, INDEX_UID, "nope").unwrap().is_none());
}

#[test]
fn inserts_keep_node_id_invariant() {
    let conn = setup_db();
    splits::insert_split(&conn, &split("s1", "a"), SplitState::Published).unwrap();
    splits::insert_split(&conn, &split("s2", "b"), SplitState::Published).unwrap();

    let invariant = verify::verify_node_id_invariant(&conn).unwrap();
    assert!(invariant.is_consistent(), "{invariant:?}");
    assert_eq!(invariant.total_rows, 2);
}

#[test]
fn list_by_node_filters_on_equality() {
    let conn = setup_db();
    splits::insert_split(&conn, &split("s1", "a"), SplitState::Published).unwrap();
    splits::insert_split(&conn, &split("s2", "b"), SplitState::Published).unwrap();
    splits::insert_split(&conn, &split("s3", "b"), SplitState::Staged).unwrap();

    let node_b = NodeId::new("b").unwrap();
    let ids: Vec<String> = splits::list_splits_by_node(&conn, &node_b)
        .unwrap()
        .into_iter()
        .map(|r| r.split_id)
        .collect();
    assert_eq!(ids, vec!["s2", "s3"]);

    let node_c = NodeId::new("c").unwrap();
    assert!(splits::list_splits_by_node(&conn, &node_c).unwrap().is_empty());
}

#[test]
fn list_by_index_with_state_filter() {
    let conn = setup_db();
    splits::insert_split(&conn, &split("s1", "a"), SplitState::Published).unwrap();
    splits::insert_split(&conn, &split("s2", "a"), SplitState::Staged).unwrap();

    assert_eq!(splits::list_splits_by_index(&conn, INDEX_UID, None).unwrap().len(), 2);
    let staged = splits::list_splits_by_index(&conn, INDEX_UID, Some(SplitState::Staged)).unwrap();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].split_id, "s2");
}

#[test]
fn publishing_stamps_publish_timestamp() {
    let conn = setup_db();
    splits::insert_split(&conn, &split("s1", "a"), SplitState::Staged).unwrap();
    splits::update_split_state(&conn, INDEX_UID, "s1", SplitState::Published).unwrap();

    let row = splits::get_split(&conn, INDEX_UID, "s1").unwrap().unwrap();
    assert_eq!(row.split_state, SplitState::Published);
    assert!(row.publish_timestamp.is_some());
}

#[test]
fn update_and_delete_report_missing_splits() {
    let conn = setup_db();
    let err = splits::update_split_state(&conn, INDEX_UID, "ghost", SplitState::Published)
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { entity: "split", .. }));

    let err = splits::delete_split(&conn, INDEX_UID, "ghost").unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}

#[test]
fn delete_removes_split() {
    let conn = setup_db();
    splits::insert_split(&conn, &split("s1", "a"), SplitState::MarkedForDeletion).unwrap();
    assert_eq!(splits::count_splits(&conn).unwrap(), 1);
    splits::delete_split(&conn, INDEX_UID, "s1").unwrap();
    assert_eq!(splits::count_splits(&conn).unwrap(), 0);
}

#[test]
fn duplicate_split_is_rejected() {
    let conn = setup_db();
    splits::insert_split(&conn, &split("s1", "a"), SplitState::Staged).unwrap();
    let err = splits::insert_split(&conn, &split("s1", "b"), SplitState::Staged).unwrap_err();
    assert!(matches!(err, StorageError::SqliteError { .. }));
}

#[test]
fn split_for_unknown_index_is_rejected() {
    let conn = setup_db();
    let meta = SplitMetadata::new("s1", "missing:00", NodeId::new("a").unwrap());
    assert!(splits::insert_split(&conn, &meta, SplitState::Staged).is_err());
}

#[test]
fn node_id_with_sql_metacharacters_is_stored_verbatim() {
    let conn = setup_db();
    let hostile = "'; DROP TABLE splits; --";
    splits::insert_split(&conn, &split("s1", hostile), SplitState::Published).unwrap();

    let rows = splits::list_splits_by_node(&conn, &NodeId::new(hostile).unwrap()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].node_id.as_str(), hostile);
}

#[test]
fn delete_opstamp_beyond_storable_range_is_rejected() {
    let conn = setup_db();
    let mut meta = split("s1", "a");
    meta.delete_opstamp = u64::MAX;
    let err = splits::insert_split(&conn, &meta, SplitState::Staged).unwrap_err();
    assert!(matches!(err, StorageError::Serialization { .. }), "{err:?}");
    assert_eq!(splits::count_splits(&conn).unwrap(), 0);

    meta.delete_opstamp = i64::MAX as u64;
    splits::insert_split(&conn, &meta, SplitState::Staged).unwrap();
    let row = splits::get_split(&conn, INDEX_UID, "s1").unwrap().unwrap();
    assert_eq!(row.delete_opstamp, i64::MAX);
}

#[test]
fn engine_enforces_length_bound_on_direct_writes() {
    let conn = setup_db();
    let err = conn
        .execute(
            "INSERT INTO splits (split_id, split_state, split_metadata_json, index_uid, node_id)
             VALUES ('s1', 'Staged', '{}', ?1, ?2)",
            rusqlite::params![INDEX_UID, "n".repeat(254)],
        )
        .unwrap_err();
    assert!(err.to_string().contains("CHECK"), "{err}");

    let err = conn
        .execute(
            "INSERT INTO splits (split_id, split_state, split_metadata_json, index_uid)
             VALUES ('s2', 'Staged', '{}', ?1)",
            rusqlite::params![INDEX_UID],
        )
        .unwrap_err();
    assert!(err.to_string().contains("NOT NULL"), "{err}");

    let err = conn
        .execute(
            "INSERT INTO splits (split_id, split_state, split_metadata_json, index_uid, node_id)
             VALUES ('s3', 'Staged', '{}', ?1, '')",
            rusqlite::params![INDEX_UID],
        )
        .unwrap_err();
    assert!(err.to_string().contains("CHECK"), "{err}");
}
