//! Typed queries over the metastore tables.

pub mod indexes;
pub mod splits;
