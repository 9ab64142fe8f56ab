//! Validated identifier of the worker node that produced a split.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::NODE_ID_MAX_LEN;
use crate::errors::ModelError;

/// A node id: non-empty, at most [`NODE_ID_MAX_LEN`] characters.
///
/// The bound is counted in characters, not bytes, so it agrees with
/// SQLite's `length()` on TEXT values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    pub fn new(value: impl Into<String>) -> Result<Self, ModelError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ModelError::InvalidNodeId {
                reason: "node id must not be empty".to_string(),
            });
        }
        let len = value.chars().count();
        if len > NODE_ID_MAX_LEN {
            return Err(ModelError::InvalidNodeId {
                reason: format!("node id is {len} characters, max is {NODE_ID_MAX_LEN}"),
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for NodeId {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeId> for String {
    fn from(node_id: NodeId) -> Self {
        node_id.0
    }
}

impl FromStr for NodeId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hostname_sized_ids() {
        let id = NodeId::new("searcher-0.quickwit.svc.cluster.local").unwrap();
        assert_eq!(id.as_str(), "searcher-0.quickwit.svc.cluster.local");

        let longest = "a".repeat(NODE_ID_MAX_LEN);
        assert!(NodeId::new(longest).is_ok());
    }

    #[test]
    fn rejects_empty_and_over_length() {
        assert!(matches!(
            NodeId::new(""),
            Err(ModelError::InvalidNodeId { .. })
        ));
        let too_long = "a".repeat(NODE_ID_MAX_LEN + 1);
        assert!(matches!(
            NodeId::new(too_long),
            Err(ModelError::InvalidNodeId { .. })
        ));
    }

    #[test]
    fn length_is_counted_in_characters() {
        // 253 two-byte characters: 506 bytes, still within the bound.
        let wide = "é".repeat(NODE_ID_MAX_LEN);
        assert!(NodeId::new(wide).is_ok());
    }

    #[test]
    fn serde_validates_on_decode() {
        let id: NodeId = serde_json::from_str("\"indexer-1\"").unwrap();
        assert_eq!(id.to_string(), "indexer-1");
        assert!(serde_json::from_str::<NodeId>("\"\"").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"indexer-1\"");
    }
}
