//! Content-addressable blob cache for Stash
//!
//! This crate stores immutable blobs keyed by their digest next to a
//! mutable action cache keyed by action fingerprints. Transfers are streamed
//! and coalesced: concurrent requests for the same key share one backend
//! transfer.
//!
//! [`BlobCache`] is the entry point; storage media plug in through the
//! [`Backend`] trait.

pub mod action;
pub mod backend;
pub mod cas;
pub mod stats;
pub mod store;
pub mod transfer;

// Re-export main types
pub use backend::{open_backend, Backend, ByteStream, DiskBackend, MemoryBackend, StoreKey};
pub use stats::CacheStats;
pub use store::{BlobCache, CacheOptions};
pub use transfer::{InFlight, UploadOutcome};

