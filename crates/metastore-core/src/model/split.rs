//! Split states and the metadata document stored in `split_metadata_json`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::NodeId;
use crate::errors::ModelError;

/// Lifecycle state of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SplitState {
    /// Being uploaded; not yet searchable.
    Staged,
    /// Visible to searches.
    Published,
    /// Scheduled for garbage collection.
    MarkedForDeletion,
}

impl SplitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staged => "Staged",
            Self::Published => "Published",
            Self::MarkedForDeletion => "MarkedForDeletion",
        }
    }
}

impl FromStr for SplitState {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Staged" => Ok(Self::Staged),
            "Published" => Ok(Self::Published),
            "MarkedForDeletion" => Ok(Self::MarkedForDeletion),
            other => Err(ModelError::InvalidSplitState {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SplitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive timestamp range covered by the documents of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

/// Byte range of the split footer inside the split file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FooterOffsets {
    pub start: u64,
    pub end: u64,
}

/// Canonical split metadata. Serialized as-is into `split_metadata_json`;
/// the `node_id` column of the `splits` table is a projection of
/// [`SplitMetadata::node_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitMetadata {
    pub split_id: String,
    pub index_uid: String,
    #[serde(default)]
    pub partition_id: u64,
    #[serde(default)]
    pub source_id: String,
    pub node_id: NodeId,
    #[serde(default)]
    pub num_docs: u64,
    #[serde(default)]
    pub uncompressed_docs_size_in_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub create_timestamp: i64,
    /// Unix timestamp after which the split no longer takes part in merges.
    #[serde(default)]
    pub maturity_timestamp: i64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub footer_offsets: FooterOffsets,
    #[serde(default)]
    pub delete_opstamp: u64,
    #[serde(default)]
    pub num_merge_ops: usize,
}

impl SplitMetadata {
    /// Minimal metadata for a freshly staged split.
    pub fn new(
        split_id: impl Into<String>,
        index_uid: impl Into<String>,
        node_id: NodeId,
    ) -> Self {
        Self {
            split_id: split_id.into(),
            index_uid: index_uid.into(),
            partition_id: 0,
            source_id: String::new(),
            node_id,
            num_docs: 0,
            uncompressed_docs_size_in_bytes: 0,
            time_range: None,
            create_timestamp: 0,
            maturity_timestamp: 0,
            tags: BTreeSet::new(),
            footer_offsets: FooterOffsets::default(),
            delete_opstamp: 0,
            num_merge_ops: 0,
        }
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        serde_json::to_string(self).map_err(|e| ModelError::InvalidMetadata {
            message: e.to_string(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        serde_json::from_str(json).map_err(|e| ModelError::InvalidMetadata {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_state_parses_its_own_names() {
        for state in [
            SplitState::Staged,
            SplitState::Published,
            SplitState::MarkedForDeletion,
        ] {
            assert_eq!(state.as_str().parse::<SplitState>().unwrap(), state);
        }
        assert!("Deleted".parse::<SplitState>().is_err());
    }

    #[test]
    fn metadata_json_carries_top_level_node_id() {
        let meta = SplitMetadata::new("split-1", "logs:01H", NodeId::new("indexer-7").unwrap());
        let json = meta.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["node_id"], "indexer-7");
        assert_eq!(value["split_id"], "split-1");
    }

    #[test]
    fn metadata_without_node_id_is_rejected() {
        let err = SplitMetadata::from_json(r#"{"split_id":"s","index_uid":"i"}"#).unwrap_err();
        assert!(matches!(err, ModelError::InvalidMetadata { .. }));
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let meta =
            SplitMetadata::from_json(r#"{"split_id":"s","index_uid":"i","node_id":"n"}"#).unwrap();
        assert_eq!(meta.num_docs, 0);
        assert!(meta.tags.is_empty());
        assert!(meta.time_range.is_none());
    }
}
