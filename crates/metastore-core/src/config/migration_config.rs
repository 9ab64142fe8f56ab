//! Migration configuration, including what to do with splits whose
//! metadata document has no `node_id`.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::model::NodeId;

/// How the node id backfill treats rows whose JSON lacks `node_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingNodeIdMode {
    /// Abort the migration and roll back.
    #[default]
    Fail,
    /// Fill the column with `sentinel_node_id`.
    Sentinel,
}

impl std::str::FromStr for MissingNodeIdMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "sentinel" => Ok(Self::Sentinel),
            other => Err(ConfigError::ValidationFailed {
                field: "migration.missing_node_id".to_string(),
                message: format!("expected `fail` or `sentinel`, got `{other}`"),
            }),
        }
    }
}

/// Resolved policy handed to the migration runner.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MissingNodeIdPolicy {
    #[default]
    Fail,
    Sentinel(NodeId),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MigrationConfig {
    /// Default: `fail`.
    pub missing_node_id: Option<MissingNodeIdMode>,
    /// Required when `missing_node_id = "sentinel"`.
    pub sentinel_node_id: Option<String>,
    /// Schema version to migrate to. Default: latest known.
    pub target_version: Option<u32>,
}

impl MigrationConfig {
    pub fn effective_mode(&self) -> MissingNodeIdMode {
        self.missing_node_id.unwrap_or_default()
    }

    /// Resolve the configured mode into a policy, validating the sentinel.
    pub fn policy(&self) -> Result<MissingNodeIdPolicy, ConfigError> {
        match self.effective_mode() {
            MissingNodeIdMode::Fail => Ok(MissingNodeIdPolicy::Fail),
            MissingNodeIdMode::Sentinel => {
                let raw = self.sentinel_node_id.as_deref().ok_or_else(|| {
                    ConfigError::ValidationFailed {
                        field: "migration.sentinel_node_id".to_string(),
                        message: "required when missing_node_id = \"sentinel\"".to_string(),
                    }
                })?;
                let node_id = NodeId::new(raw).map_err(|e| ConfigError::ValidationFailed {
                    field: "migration.sentinel_node_id".to_string(),
                    message: e.to_string(),
                })?;
                Ok(MissingNodeIdPolicy::Sentinel(node_id))
            }
        }
    }
}
