//! Names and limits shared by the storage layer, the CLI, and tests.

/// Maximum length of a node id, in characters. Matches the DNS hostname ceiling.
pub const NODE_ID_MAX_LEN: usize = 253;

/// Table holding one row per split.
pub const SPLITS_TABLE: &str = "splits";

/// Equality-lookup index over `splits.node_id`.
pub const NODE_ID_INDEX_NAME: &str = "splits_node_id_idx";

/// JSON path of the node id inside `split_metadata_json`.
pub const NODE_ID_JSON_PATH: &str = "$.node_id";

/// Bookkeeping table recording every applied migration.
pub const MIGRATIONS_TABLE: &str = "schema_migrations";

/// Project-level config file name, looked up in the working root.
pub const CONFIG_FILE_NAME: &str = "metastore.toml";
