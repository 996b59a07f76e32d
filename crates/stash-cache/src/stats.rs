//! Operation counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of cache activity since the store was opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Blobs written to the backend
    pub blobs_stored: u64,
    /// Blob uploads skipped because the blob was already present
    pub blobs_already_present: u64,
    /// Action results written to the backend
    pub action_results_stored: u64,
    /// Upload requests that attached to an in-flight upload
    pub uploads_coalesced: u64,
    /// Backend reads started
    pub downloads: u64,
    /// Download requests that attached to an in-flight download
    pub downloads_coalesced: u64,
    /// Download requests that first waited for an in-flight upload
    pub uploads_awaited: u64,
    /// Lookups that found nothing
    pub misses: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    blobs_stored: AtomicU64,
    blobs_already_present: AtomicU64,
    action_results_stored: AtomicU64,
    uploads_coalesced: AtomicU64,
    downloads: AtomicU64,
    downloads_coalesced: AtomicU64,
    uploads_awaited: AtomicU64,
    misses: AtomicU64,
}

macro_rules! counter {
    ($($name:ident => $field:ident),* $(,)?) => {
        impl StatsRecorder {
            $(
                pub(crate) fn $name(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*
        }
    };
}

counter! {
    blob_stored => blobs_stored,
    blob_already_present => blobs_already_present,
    action_result_stored => action_results_stored,
    upload_coalesced => uploads_coalesced,
    download_started => downloads,
    download_coalesced => downloads_coalesced,
    upload_awaited => uploads_awaited,
    miss => misses,
}

impl StatsRecorder {
    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            blobs_stored: self.blobs_stored.load(Ordering::Relaxed),
            blobs_already_present: self.blobs_already_present.load(Ordering::Relaxed),
            action_results_stored: self.action_results_stored.load(Ordering::Relaxed),
            uploads_coalesced: self.uploads_coalesced.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            downloads_coalesced: self.downloads_coalesced.load(Ordering::Relaxed),
            uploads_awaited: self.uploads_awaited.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
