//! Storage backends.
//!
//! A backend is the medium the cache persists into. The cache only relies on
//! the [`Backend`] trait, so any medium (memory, local disk, a remote peer)
//! can be plugged in. Backends must be safe for concurrent use and must make
//! a key visible only after its write stream has been consumed completely.

use async_trait::async_trait;
use stash_config::BackendConfig;
use stash_core::{ActionKey, Digest, StashResult};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;

pub mod disk;
pub mod memory;

#[cfg(test)]
pub(crate) mod testing;

pub use disk::DiskBackend;
pub use memory::MemoryBackend;

/// Readable byte stream handed to and from backends
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Key of a stored record. Blobs and action results live in separate
/// namespaces and can never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Immutable blob in the content-addressable store
    Blob(Digest),
    /// Mutable result record in the action cache
    Action(ActionKey),
}

impl StoreKey {
    /// Namespace prefix of this key
    pub fn namespace(&self) -> &'static str {
        match self {
            StoreKey::Blob(_) => "cas",
            StoreKey::Action(_) => "ac",
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKey::Blob(digest) => write!(f, "cas/{}", digest),
            StoreKey::Action(key) => write!(f, "ac/{}", key),
        }
    }
}

/// Driver interface every storage medium implements
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Whether a record is stored under `key`, from metadata only
    async fn exists(&self, key: &StoreKey) -> StashResult<bool>;

    /// Open a stream over the record, or `None` if absent
    async fn read(&self, key: &StoreKey) -> StashResult<Option<ByteStream>>;

    /// Store `data` under `key`, replacing any previous record.
    ///
    /// The record must not become visible unless the whole stream was read
    /// without error. Dropping the returned future must discard partial data.
    async fn write(&self, key: &StoreKey, data: ByteStream) -> StashResult<()>;

    /// Release handles held by the backend
    async fn close(&self) -> StashResult<()>;
}

/// Open the backend a configuration selects
pub fn open_backend(config: &BackendConfig) -> StashResult<Arc<dyn Backend>> {
    match config {
        BackendConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendConfig::Disk { root } => Ok(Arc::new(DiskBackend::new(root)?)),
    }
}
