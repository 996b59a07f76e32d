//! Transfer engine.
//!
//! Coordinates backend transfers so that, per key, at most one upload and at
//! most one download are in flight at any instant. Concurrent requests for
//! the same key attach to the pending transfer and observe its outcome.
//!
//! Cancellation policy, identical for both directions: dropping a request's
//! future detaches only that request. The underlying transfer is abandoned
//! once no request is attached to it any more, and its table entry is always
//! removed when it completes, fails or is abandoned.

use bytes::Bytes;
use dashmap::DashMap;
use stash_core::{Digest, DigestFunction, StashError, StashResult};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::RwLock;

use crate::backend::{Backend, ByteStream, StoreKey};
use crate::stats::StatsRecorder;

mod download;
mod upload;
mod verify;

pub use upload::UploadOutcome;
pub(crate) use upload::UploadMode;

use download::PendingDownload;
use upload::PendingUpload;
use verify::{Verdict, VerifyingReader};

/// Content handed to an upload
#[derive(Debug, Clone)]
pub(crate) enum UploadSource {
    /// Bytes already in memory and already verified by the caller
    Bytes(Bytes),
    /// File streamed from disk and verified against `expected` on the way
    File { path: PathBuf, expected: Digest },
}

impl UploadSource {
    async fn open(
        self,
        function: DigestFunction,
        chunk_size: usize,
    ) -> StashResult<(ByteStream, Option<Verdict>)> {
        match self {
            UploadSource::Bytes(bytes) => Ok((Box::pin(std::io::Cursor::new(bytes)), None)),
            UploadSource::File { path, expected } => {
                let file = tokio::fs::File::open(&path).await.map_err(|e| {
                    StashError::io(format!("Failed to open {}", path.display()), e)
                })?;
                let reader = BufReader::with_capacity(chunk_size, file);
                let (verifying, verdict) = VerifyingReader::new(reader, function, expected);
                Ok((Box::pin(verifying), Some(verdict)))
            }
        }
    }
}

/// Table entries carry the id of the transfer that created them, so a
/// finishing transfer never removes its successor's entry.
pub(crate) trait TransferId {
    fn id(&self) -> u64;
}

/// Removes a table entry when the owning transfer ends or is dropped
pub(crate) struct PendingGuard<T: TransferId> {
    table: Arc<DashMap<StoreKey, T>>,
    key: StoreKey,
    id: u64,
}

impl<T: TransferId> Drop for PendingGuard<T> {
    fn drop(&mut self) {
        self.table.remove_if(&self.key, |_, pending| pending.id() == self.id);
    }
}

/// Number of transfers currently registered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InFlight {
    pub uploads: usize,
    pub downloads: usize,
}

/// Coalescing transfer coordinator shared by every operation of a store
#[derive(Debug)]
pub(crate) struct TransferEngine {
    backend: Arc<dyn Backend>,
    uploads: Arc<DashMap<StoreKey, PendingUpload>>,
    downloads: Arc<DashMap<StoreKey, PendingDownload>>,
    /// Held shared by every spawned download pump
    tasks: Arc<RwLock<()>>,
    next_id: AtomicU64,
    digest_function: DigestFunction,
    chunk_size: usize,
    stats: Arc<StatsRecorder>,
}

impl TransferEngine {
    pub(crate) fn new(
        backend: Arc<dyn Backend>,
        digest_function: DigestFunction,
        chunk_size: usize,
        stats: Arc<StatsRecorder>,
    ) -> Self {
        Self {
            backend,
            uploads: Arc::new(DashMap::new()),
            downloads: Arc::new(DashMap::new()),
            tasks: Arc::new(RwLock::new(())),
            next_id: AtomicU64::new(1),
            digest_function,
            chunk_size: chunk_size.max(1),
            stats,
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn guard<T: TransferId>(table: &Arc<DashMap<StoreKey, T>>, key: &StoreKey, id: u64) -> PendingGuard<T> {
        PendingGuard {
            table: Arc::clone(table),
            key: key.clone(),
            id,
        }
    }

    /// Wait until every spawned download pump has exited.
    ///
    /// Pumps only outlive their subscribers until they notice them gone, so
    /// this returns promptly once no operation is running.
    pub(crate) async fn drain(&self) {
        let _drained = self.tasks.write().await;
    }

    pub(crate) fn in_flight(&self) -> InFlight {
        InFlight {
            uploads: self.uploads.len(),
            downloads: self.downloads.len(),
        }
    }
}
