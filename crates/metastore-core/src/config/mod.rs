//! Configuration system for the metastore.
//! TOML-based, layered resolution: CLI > env > project > defaults.

pub mod metastore_config;
pub mod migration_config;
pub mod storage_config;

pub use metastore_config::{CliOverrides, MetastoreConfig};
pub use migration_config::{MigrationConfig, MissingNodeIdMode, MissingNodeIdPolicy};
pub use storage_config::StorageConfig;
