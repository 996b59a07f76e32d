//! Store facade.
//!
//! [`BlobCache`] is the single entry point over one backend. It owns the
//! backend handle and the transfer engine, and gates every operation on the
//! open/closed lifecycle.

use stash_config::StoreConfig;
use stash_core::{DigestFunction, StashError, StashResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::info;

use crate::backend::{open_backend, Backend, MemoryBackend};
use crate::stats::{CacheStats, StatsRecorder};
use crate::transfer::{InFlight, TransferEngine};

/// Tuning for a [`BlobCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Function blob digests are computed and verified with
    pub digest_function: DigestFunction,
    /// Size of the chunks streamed to and from the backend
    pub chunk_size: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            digest_function: DigestFunction::default(),
            chunk_size: stash_config::DEFAULT_CHUNK_SIZE,
        }
    }
}

impl From<&StoreConfig> for CacheOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            digest_function: config.digest_function,
            chunk_size: config.chunk_size,
        }
    }
}

/// Content-addressable blob cache with a paired action cache.
///
/// Cheap to clone; clones share the backend, the in-flight transfers and the
/// lifecycle.
#[derive(Debug, Clone)]
pub struct BlobCache {
    inner: Arc<CacheInner>,
}

#[derive(Debug)]
struct CacheInner {
    backend: Arc<dyn Backend>,
    engine: TransferEngine,
    digest_function: DigestFunction,
    closed: AtomicBool,
    /// Held shared by every operation, exclusively by `close`. Records
    /// whether the backend has been closed.
    gate: RwLock<bool>,
    stats: Arc<StatsRecorder>,
}

impl BlobCache {
    /// Create a cache over `backend`
    pub fn new(backend: Arc<dyn Backend>, options: CacheOptions) -> Self {
        let stats = Arc::new(StatsRecorder::default());
        let engine = TransferEngine::new(
            Arc::clone(&backend),
            options.digest_function,
            options.chunk_size,
            Arc::clone(&stats),
        );
        Self {
            inner: Arc::new(CacheInner {
                backend,
                engine,
                digest_function: options.digest_function,
                closed: AtomicBool::new(false),
                gate: RwLock::new(false),
                stats,
            }),
        }
    }

    /// Open the backend `config` selects and create a cache over it
    pub fn open(config: &StoreConfig) -> StashResult<Self> {
        let backend = open_backend(&config.backend)?;
        info!(backend = backend.name(), digest_function = %config.digest_function, "opened blob cache");
        Ok(Self::new(backend, CacheOptions::from(config)))
    }

    /// Cache over a fresh in-memory backend with default options
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), CacheOptions::default())
    }

    /// Digest function blobs are verified with
    pub fn digest_function(&self) -> DigestFunction {
        self.inner.digest_function
    }

    /// Name of the backend in use
    pub fn backend_name(&self) -> &'static str {
        self.inner.backend.name()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Counters since the cache was created
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }

    /// Transfers currently registered in the engine
    pub fn in_flight(&self) -> InFlight {
        self.inner.engine.in_flight()
    }

    /// Close the cache.
    ///
    /// New operations fail with [`StashError::Closed`] from now on. Waits
    /// for operations already running and the download tasks they spawned
    /// to finish, then closes the backend. Calling it again waits for that
    /// drain and returns `Ok(())`; if closing the backend failed, the next
    /// call tries again.
    pub async fn close(&self) -> StashResult<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        let mut backend_closed = self.inner.gate.write().await;
        self.inner.engine.drain().await;
        if !*backend_closed {
            info!(backend = self.inner.backend.name(), "closing blob cache");
            self.inner.backend.close().await?;
            *backend_closed = true;
        }
        Ok(())
    }

    /// Admit one operation, holding off `close` until the guard drops
    pub(crate) async fn enter(&self) -> StashResult<RwLockReadGuard<'_, bool>> {
        if self.is_closed() {
            return Err(StashError::Closed);
        }
        let guard = self.inner.gate.read().await;
        // `close` may have won the race for the gate
        if self.is_closed() {
            return Err(StashError::Closed);
        }
        Ok(guard)
    }

    pub(crate) fn engine(&self) -> &TransferEngine {
        &self.inner.engine
    }

    pub(crate) fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }
}
