//! Coalesced uploads.

use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use serde::Serialize;
use stash_core::{DigestFunction, StashResult};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::{TransferEngine, TransferId, UploadSource};
use crate::backend::{Backend, StoreKey};
use crate::stats::StatsRecorder;

/// What an upload did to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadOutcome {
    /// The content was written
    Stored,
    /// The blob was already present and nothing was written
    AlreadyPresent,
}

/// How an upload treats a record that already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UploadMode {
    /// Immutable content: skip the write when the key exists, and let
    /// concurrent uploads of the same key share one transfer
    Dedup,
    /// Mutable record: always write, one transfer at a time per key
    Overwrite,
}

type UploadTask = BoxFuture<'static, StashResult<UploadOutcome>>;

/// Handle on an in-flight upload that any number of callers can await
pub(crate) type UploadFuture = Shared<UploadTask>;

/// Table entry for an in-flight upload.
///
/// Holds the transfer weakly: callers awaiting the upload keep it alive, the
/// table alone does not.
pub(crate) struct PendingUpload {
    id: u64,
    future: Option<WeakShared<UploadTask>>,
}

impl PendingUpload {
    fn upgrade(&self) -> Option<UploadFuture> {
        self.future.as_ref().and_then(WeakShared::upgrade)
    }
}

impl TransferId for PendingUpload {
    fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for PendingUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingUpload")
            .field("id", &self.id)
            .field("live", &self.upgrade().is_some())
            .finish()
    }
}

impl TransferEngine {
    /// Upload `source` under `key`.
    ///
    /// In [`UploadMode::Dedup`] a caller finding an upload of the same key in
    /// flight attaches to it and gets its outcome. In
    /// [`UploadMode::Overwrite`] the caller waits for that upload to settle
    /// and then starts its own, so the last writer wins.
    pub(crate) async fn upload(
        &self,
        key: StoreKey,
        source: UploadSource,
        mode: UploadMode,
    ) -> StashResult<UploadOutcome> {
        loop {
            // Upgraded handles leave this block before being awaited or
            // dropped: dropping the last one runs the entry guard, which
            // needs the shard lock held here.
            let (future, joined) = match self.uploads.entry(key.clone()) {
                Entry::Occupied(mut entry) => match entry.get().upgrade() {
                    Some(existing) => (existing, true),
                    None => {
                        // Every waiter of the previous transfer went away
                        let (pending, future) = self.start_upload(&key, source.clone(), mode);
                        entry.insert(pending);
                        (future, false)
                    }
                },
                Entry::Vacant(entry) => {
                    let (pending, future) = self.start_upload(&key, source.clone(), mode);
                    entry.insert(pending);
                    (future, false)
                }
            };

            if !joined {
                return future.await;
            }

            match mode {
                UploadMode::Dedup => {
                    debug!(key = %key, "joining in-flight upload");
                    self.stats.upload_coalesced();
                    return future.await;
                }
                UploadMode::Overwrite => {
                    debug!(key = %key, "waiting for previous write to settle");
                    let _ = future.await;
                }
            }
        }
    }

    /// The upload currently in flight for `key`, if any
    pub(crate) fn pending_upload(&self, key: &StoreKey) -> Option<UploadFuture> {
        self.uploads.get(key).and_then(|pending| pending.upgrade())
    }

    fn start_upload(
        &self,
        key: &StoreKey,
        source: UploadSource,
        mode: UploadMode,
    ) -> (PendingUpload, UploadFuture) {
        let id = self.next_id();
        let guard = Self::guard(&self.uploads, key, id);
        let backend = Arc::clone(&self.backend);
        let stats = Arc::clone(&self.stats);
        let function = self.digest_function;
        let chunk_size = self.chunk_size;
        let key = key.clone();

        let future = async move {
            let _guard = guard;
            run_upload(backend, stats, key, source, mode, function, chunk_size).await
        }
        .boxed()
        .shared();

        let pending = PendingUpload {
            id,
            future: future.downgrade(),
        };
        (pending, future)
    }
}

async fn run_upload(
    backend: Arc<dyn Backend>,
    stats: Arc<StatsRecorder>,
    key: StoreKey,
    source: UploadSource,
    mode: UploadMode,
    function: DigestFunction,
    chunk_size: usize,
) -> StashResult<UploadOutcome> {
    if mode == UploadMode::Dedup && backend.exists(&key).await? {
        debug!(key = %key, "blob already present, skipping write");
        stats.blob_already_present();
        return Ok(UploadOutcome::AlreadyPresent);
    }

    let (stream, verdict) = source.open(function, chunk_size).await?;
    if let Err(error) = backend.write(&key, stream).await {
        // A verification failure is the real cause of the aborted write
        let cause = verdict.and_then(|verdict| verdict.take()).unwrap_or(error);
        debug!(key = %key, error = %cause, "upload failed");
        return Err(cause);
    }

    match key {
        StoreKey::Blob(_) => stats.blob_stored(),
        StoreKey::Action(_) => stats.action_result_stored(),
    }
    debug!(key = %key, backend = backend.name(), "upload stored");
    Ok(UploadOutcome::Stored)
}
