//! metastore-core: shared building blocks for the split metastore.
//!
//! - Model: split metadata documents, split states, validated node ids
//! - Config: TOML-based, layered resolution (CLI > env > project > defaults)
//! - Errors: one `thiserror` enum per subsystem
//! - Tracing: `EnvFilter`-driven subscriber setup
//! - Traits: cooperative cancellation

pub mod config;
pub mod constants;
pub mod errors;
pub mod model;
pub mod traits;
pub mod tracing;
