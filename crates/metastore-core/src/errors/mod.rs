//! Error handling for the metastore.
//! One error enum per subsystem, `thiserror` only.

pub mod config_error;
pub mod error_code;
pub mod model_error;
pub mod storage_error;

pub use config_error::ConfigError;
pub use error_code::MetastoreErrorCode;
pub use model_error::ModelError;
pub use storage_error::StorageError;
