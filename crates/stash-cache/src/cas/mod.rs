//! Content-addressable store operations.
//!
//! Blobs are immutable and keyed by their digest, so an upload of content
//! that is already present (or already in flight) never writes twice.

use bytes::Bytes;
use stash_core::utils::verify_digest;
use stash_core::{Digest, StashResult};
use std::path::Path;
use tokio::io::AsyncWrite;
use tracing::instrument;

use crate::backend::StoreKey;
use crate::store::BlobCache;
use crate::transfer::{UploadMode, UploadOutcome, UploadSource};

impl BlobCache {
    /// Whether a blob with `digest` is stored. Answered from backend
    /// metadata without downloading anything.
    #[instrument(skip(self), fields(digest = %digest))]
    pub async fn contains(&self, digest: &Digest) -> StashResult<bool> {
        let _op = self.enter().await?;
        self.backend().exists(&StoreKey::Blob(*digest)).await
    }

    /// Store `data` under `digest` unless it is already present.
    ///
    /// The content is checked against `digest` before any backend work; a
    /// mismatch is a validation error.
    #[instrument(skip(self, data), fields(digest = %digest))]
    pub async fn upload_blob(
        &self,
        digest: &Digest,
        data: impl Into<Bytes>,
    ) -> StashResult<UploadOutcome> {
        let _op = self.enter().await?;
        let data = data.into();
        verify_digest(self.digest_function(), &data, digest)?;

        self.engine()
            .upload(StoreKey::Blob(*digest), UploadSource::Bytes(data), UploadMode::Dedup)
            .await
    }

    /// Stream the file at `path` into the store under `digest`.
    ///
    /// The file is read in chunks and verified on the way; on a mismatch the
    /// partial write is discarded and a validation error returned.
    #[instrument(skip(self, path), fields(digest = %digest))]
    pub async fn upload_file(
        &self,
        digest: &Digest,
        path: impl AsRef<Path>,
    ) -> StashResult<UploadOutcome> {
        let _op = self.enter().await?;
        let source = UploadSource::File {
            path: path.as_ref().to_path_buf(),
            expected: *digest,
        };

        self.engine()
            .upload(StoreKey::Blob(*digest), source, UploadMode::Dedup)
            .await
    }

    /// Stream the blob into `sink`.
    ///
    /// Returns `Ok(false)` and leaves the sink untouched when the blob is
    /// absent. On failure the sink may hold a prefix of the blob.
    #[instrument(skip(self, sink), fields(digest = %digest))]
    pub async fn get<W>(&self, digest: &Digest, sink: &mut W) -> StashResult<bool>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let _op = self.enter().await?;
        self.engine().download(&StoreKey::Blob(*digest), sink).await
    }
}
