//! Split metastore data model.

pub mod node_id;
pub mod split;

pub use node_id::NodeId;
pub use split::{FooterOffsets, SplitMetadata, SplitState, TimeRange};
