//! Errors raised while constructing or decoding model values.

use super::error_code::{self, MetastoreErrorCode};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("invalid node id: {reason}")]
    InvalidNodeId { reason: String },

    #[error("invalid split state: {value}")]
    InvalidSplitState { value: String },

    #[error("invalid split metadata: {message}")]
    InvalidMetadata { message: String },
}

impl MetastoreErrorCode for ModelError {
    fn error_code(&self) -> &'static str {
        error_code::INVALID_INPUT
    }
}
