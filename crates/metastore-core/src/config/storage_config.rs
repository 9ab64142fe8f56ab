//! Storage configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the SQLite storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file. Default: `metastore.db` in the working directory.
    pub database_path: Option<String>,
    /// Number of read connections. Default: 4, clamped to 1..=8.
    pub read_pool_size: Option<usize>,
    /// SQLite busy timeout in milliseconds. Default: 5000.
    pub busy_timeout_ms: Option<u64>,
}

impl StorageConfig {
    pub fn effective_database_path(&self) -> &str {
        self.database_path.as_deref().unwrap_or("metastore.db")
    }

    pub fn effective_read_pool_size(&self) -> usize {
        self.read_pool_size.unwrap_or(4)
    }

    pub fn effective_busy_timeout_ms(&self) -> u64 {
        self.busy_timeout_ms.unwrap_or(5000)
    }
}
