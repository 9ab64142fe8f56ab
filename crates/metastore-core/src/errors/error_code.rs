//! Stable, machine-readable error codes.

/// Every error enum implements this to expose a structured code string
/// that callers (the CLI exit path, log pipelines) can match on.
pub trait MetastoreErrorCode {
    /// Returns the error code string (e.g., "MIGRATION_FAILED").
    fn error_code(&self) -> &'static str;

    /// Returns the formatted error string: `[ERROR_CODE] message`.
    fn coded_string(&self) -> String
    where
        Self: std::fmt::Display,
    {
        format!("[{}] {}", self.error_code(), self)
    }
}

pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
pub const MIGRATION_FAILED: &str = "MIGRATION_FAILED";
pub const DATA_INTEGRITY: &str = "DATA_INTEGRITY";
pub const CANCELLED: &str = "CANCELLED";
pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
pub const INVALID_INPUT: &str = "INVALID_INPUT";
pub const NOT_FOUND: &str = "NOT_FOUND";
