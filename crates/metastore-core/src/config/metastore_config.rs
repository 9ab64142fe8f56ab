//! Top-level metastore configuration with layered resolution.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{MigrationConfig, MissingNodeIdMode, StorageConfig};
use crate::constants::CONFIG_FILE_NAME;
use crate::errors::ConfigError;

/// Top-level configuration aggregating all sub-configs.
///
/// Resolution order (highest priority first):
/// 1. CLI flags (applied via `apply_cli_overrides`)
/// 2. Environment variables (`METASTORE_*`)
/// 3. Project config (`metastore.toml` in the working root)
/// 4. Compiled defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MetastoreConfig {
    pub storage: StorageConfig,
    pub migration: MigrationConfig,
}

/// CLI override arguments that can be applied to a config.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub database_path: Option<String>,
    pub missing_node_id: Option<MissingNodeIdMode>,
    pub sentinel_node_id: Option<String>,
    pub target_version: Option<u32>,
}

impl MetastoreConfig {
    /// Load configuration with layered resolution rooted at `root`.
    pub fn load(root: &Path, cli_overrides: Option<&CliOverrides>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let project_config_path = root.join(CONFIG_FILE_NAME);
        if project_config_path.exists() {
            Self::merge_toml_file(&mut config, &project_config_path)?;
            tracing::debug!(path = %project_config_path.display(), "merged project config");
        }

        Self::apply_env_overrides(&mut config);

        if let Some(cli) = cli_overrides {
            Self::apply_cli_overrides(&mut config, cli);
        }

        Self::validate(&config)?;

        Ok(config)
    }

    /// Load configuration from a TOML string (for testing).
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    pub fn validate(config: &MetastoreConfig) -> Result<(), ConfigError> {
        if let Some(size) = config.storage.read_pool_size {
            if size == 0 {
                return Err(ConfigError::ValidationFailed {
                    field: "storage.read_pool_size".to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
        }
        if let Some(version) = config.migration.target_version {
            if version == 0 {
                return Err(ConfigError::ValidationFailed {
                    field: "migration.target_version".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
        }
        // Surfaces a missing or malformed sentinel at load time.
        config.migration.policy()?;
        Ok(())
    }

    /// Merge a TOML file into the existing config.
    /// Unknown keys are silently ignored (forward-compatible).
    fn merge_toml_file(config: &mut MetastoreConfig, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let file_config: MetastoreConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        Self::merge(config, &file_config);
        Ok(())
    }

    /// Merge `other` into `base`; `other` wins only where it has a value.
    fn merge(base: &mut MetastoreConfig, other: &MetastoreConfig) {
        if other.storage.database_path.is_some() {
            base.storage.database_path = other.storage.database_path.clone();
        }
        if other.storage.read_pool_size.is_some() {
            base.storage.read_pool_size = other.storage.read_pool_size;
        }
        if other.storage.busy_timeout_ms.is_some() {
            base.storage.busy_timeout_ms = other.storage.busy_timeout_ms;
        }

        if other.migration.missing_node_id.is_some() {
            base.migration.missing_node_id = other.migration.missing_node_id;
        }
        if other.migration.sentinel_node_id.is_some() {
            base.migration.sentinel_node_id = other.migration.sentinel_node_id.clone();
        }
        if other.migration.target_version.is_some() {
            base.migration.target_version = other.migration.target_version;
        }
    }

    /// Apply environment variable overrides. Unparseable values are ignored.
    fn apply_env_overrides(config: &mut MetastoreConfig) {
        if let Ok(val) = std::env::var("METASTORE_DATABASE_PATH") {
            config.storage.database_path = Some(val);
        }
        if let Ok(val) = std::env::var("METASTORE_READ_POOL_SIZE") {
            if let Ok(v) = val.parse::<usize>() {
                config.storage.read_pool_size = Some(v);
            }
        }
        if let Ok(val) = std::env::var("METASTORE_BUSY_TIMEOUT_MS") {
            if let Ok(v) = val.parse::<u64>() {
                config.storage.busy_timeout_ms = Some(v);
            }
        }
        if let Ok(val) = std::env::var("METASTORE_MISSING_NODE_ID") {
            if let Ok(v) = val.parse::<MissingNodeIdMode>() {
                config.migration.missing_node_id = Some(v);
            }
        }
        if let Ok(val) = std::env::var("METASTORE_SENTINEL_NODE_ID") {
            config.migration.sentinel_node_id = Some(val);
        }
        if let Ok(val) = std::env::var("METASTORE_TARGET_VERSION") {
            if let Ok(v) = val.parse::<u32>() {
                config.migration.target_version = Some(v);
            }
        }
    }

    fn apply_cli_overrides(config: &mut MetastoreConfig, cli: &CliOverrides) {
        if let Some(ref v) = cli.database_path {
            config.storage.database_path = Some(v.clone());
        }
        if let Some(v) = cli.missing_node_id {
            config.migration.missing_node_id = Some(v);
        }
        if let Some(ref v) = cli.sentinel_node_id {
            config.migration.sentinel_node_id = Some(v.clone());
        }
        if let Some(v) = cli.target_version {
            config.migration.target_version = Some(v);
        }
    }

    /// Serialize the config back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            path: "<serialization>".to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissingNodeIdPolicy;

    #[test]
    fn parses_full_toml() {
        let config = MetastoreConfig::from_toml(
            r#"
            [storage]
            database_path = "/var/lib/metastore/meta.db"
            read_pool_size = 2

            [migration]
            missing_node_id = "sentinel"
            sentinel_node_id = "unknown"
            target_version = 2
            "#,
        )
        .unwrap();
        assert_eq!(
            config.storage.effective_database_path(),
            "/var/lib/metastore/meta.db"
        );
        assert_eq!(config.storage.effective_read_pool_size(), 2);
        assert_eq!(config.storage.effective_busy_timeout_ms(), 5000);
        assert_eq!(config.migration.target_version, Some(2));
        assert!(matches!(
            config.migration.policy().unwrap(),
            MissingNodeIdPolicy::Sentinel(_)
        ));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = MetastoreConfig::from_toml("[storage]\nflavor = \"postgres\"\n").unwrap();
        assert!(config.storage.database_path.is_none());
    }

    #[test]
    fn validation_rejects_zero_values_and_bad_sentinel() {
        let mut config = MetastoreConfig::default();
        config.storage.read_pool_size = Some(0);
        assert!(MetastoreConfig::validate(&config).is_err());

        let mut config = MetastoreConfig::default();
        config.migration.target_version = Some(0);
        assert!(MetastoreConfig::validate(&config).is_err());

        let mut config = MetastoreConfig::default();
        config.migration.missing_node_id = Some(MissingNodeIdMode::Sentinel);
        assert!(MetastoreConfig::validate(&config).is_err());
    }

    #[test]
    fn project_file_then_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[storage]\ndatabase_path = \"from-file.db\"\n[migration]\ntarget_version = 1\n",
        )
        .unwrap();

        let cli = CliOverrides {
            target_version: Some(2),
            ..Default::default()
        };
        let config = MetastoreConfig::load(dir.path(), Some(&cli)).unwrap();
        assert_eq!(config.migration.target_version, Some(2));
        if std::env::var("METASTORE_DATABASE_PATH").is_err() {
            assert_eq!(config.storage.effective_database_path(), "from-file.db");
        }
    }

    #[test]
    fn invalid_project_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[storage\n").unwrap();
        let err = MetastoreConfig::load(dir.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn toml_roundtrip_keeps_mode() {
        let mut config = MetastoreConfig::default();
        config.migration.missing_node_id = Some(MissingNodeIdMode::Fail);
        let text = config.to_toml().unwrap();
        assert!(text.contains("missing_node_id = \"fail\""));
    }
}
