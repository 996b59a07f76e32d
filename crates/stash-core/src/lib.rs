//! # stash-core
//!
//! Core types and utilities shared across all stash crates.
//!
//! This crate provides:
//! - `Digest` and `ActionKey`, the two key types of the cache
//! - `StashError`, the unified error type, and its `ErrorKind` taxonomy
//! - Digest functions (SHA-256, Blake3) and file hashing helpers
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Key types (Digest, ActionKey)
//! - `error`: Error types and result aliases
//! - `utils`: Hashing helpers

pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{ErrorKind, StashError, StashResult};
pub use types::{ActionKey, Digest};
pub use utils::{DigestFunction, DigestHasher};
