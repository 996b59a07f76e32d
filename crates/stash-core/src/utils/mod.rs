//! Utility functions and helpers.
//!
//! Common functionality used across multiple stash crates.

pub mod hash;

// Re-export commonly used utilities
pub use hash::{
    digest_directory, digest_file, digest_files_parallel, verify_digest, DigestFunction,
    DigestHasher,
};
