//! Configuration loading for the stash blob cache
//!
//! This crate reads `stash.toml` (project and global), applies `STASH_*`
//! environment and command-line overrides, and resolves the result into a
//! [`StoreConfig`] that selects and parameterizes a cache backend.

pub mod merge;
pub mod resolve;
pub mod toml;

// Re-export main types
pub use merge::{ConfigLayering, ConfigLoader, ConfigSource};
pub use resolve::{BackendConfig, StoreConfig, DEFAULT_CHUNK_SIZE};
pub use toml::{BackendKind, StashToml, StoreSection};

use stash_core::error::StashError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, StashError>;
