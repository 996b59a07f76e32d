//! In-memory backend.
//!
//! Records live in a `HashMap` behind a `parking_lot::RwLock`. Clones share
//! the same storage. Writes are buffered until the stream ends and only then
//! inserted, so a failed or dropped write leaves nothing behind.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use stash_core::{StashError, StashResult};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::{Backend, ByteStream, StoreKey};

/// Process-local backend
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    records: RwLock<HashMap<StoreKey, Bytes>>,
    writes: AtomicU64,
    reads: AtomicU64,
    closed: AtomicBool,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed writes
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Number of reads that found a record
    pub fn read_count(&self) -> u64 {
        self.inner.reads.load(Ordering::SeqCst)
    }

    /// Number of stored records across both namespaces
    pub fn len(&self) -> usize {
        self.inner.records.read().len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.inner.records.read().is_empty()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Copy of a record, bypassing the stream interface
    pub fn snapshot(&self, key: &StoreKey) -> Option<Bytes> {
        self.inner.records.read().get(key).cloned()
    }

    fn ensure_open(&self) -> StashResult<()> {
        if self.is_closed() {
            return Err(StashError::backend_msg("memory backend is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn exists(&self, key: &StoreKey) -> StashResult<bool> {
        self.ensure_open()?;
        Ok(self.inner.records.read().contains_key(key))
    }

    async fn read(&self, key: &StoreKey) -> StashResult<Option<ByteStream>> {
        self.ensure_open()?;
        let record = self.inner.records.read().get(key).cloned();
        Ok(record.map(|bytes| {
            self.inner.reads.fetch_add(1, Ordering::SeqCst);
            Box::pin(Cursor::new(bytes)) as ByteStream
        }))
    }

    async fn write(&self, key: &StoreKey, mut data: ByteStream) -> StashResult<()> {
        self.ensure_open()?;
        let mut buffer = Vec::new();
        data.read_to_end(&mut buffer)
            .await
            .map_err(|e| StashError::backend(format!("Failed to receive {}", key), e))?;

        debug!(key = %key, size = buffer.len(), "stored record in memory");
        self.inner.records.write().insert(key.clone(), Bytes::from(buffer));
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> StashResult<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
