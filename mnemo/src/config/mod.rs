//! Configuration for the memory service.
//!
//! Loaded from TOML; every field has a default so partial files are accepted.

pub mod types;

pub use types::*;
