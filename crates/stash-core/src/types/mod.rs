//! Core data types for the stash cache.
//!
//! This module provides the identifiers the cache is keyed by:
//! - Content digests for the content-addressable store
//! - Action keys for the action cache

pub mod action_key;
pub mod digest;

// Re-export all public types
pub use action_key::{ActionKey, MAX_ACTION_KEY_LEN};
pub use digest::{Digest, HASH_LEN};
