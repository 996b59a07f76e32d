//! Action cache operations.
//!
//! Maps an action key to the last result stored under it. Unlike blobs,
//! results are mutable: a later put replaces the earlier one.

use bytes::Bytes;
use stash_core::{ActionKey, StashResult};
use tokio::io::AsyncWrite;
use tracing::instrument;

use crate::backend::StoreKey;
use crate::store::BlobCache;
use crate::transfer::{UploadMode, UploadSource};

impl BlobCache {
    /// Whether a result is stored under `key`
    #[instrument(skip(self), fields(key = %key))]
    pub async fn contains_action_result(&self, key: &ActionKey) -> StashResult<bool> {
        let _op = self.enter().await?;
        self.backend().exists(&StoreKey::Action(key.clone())).await
    }

    /// Stream the result stored under `key` into `sink`.
    ///
    /// Same contract as [`BlobCache::get`].
    #[instrument(skip(self, sink), fields(key = %key))]
    pub async fn get_action_result<W>(&self, key: &ActionKey, sink: &mut W) -> StashResult<bool>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let _op = self.enter().await?;
        self.engine().download(&StoreKey::Action(key.clone()), sink).await
    }

    /// Store `result` under `key`, replacing any previous result
    #[instrument(skip(self, result), fields(key = %key))]
    pub async fn put_action_result(&self, key: &ActionKey, result: impl Into<Bytes>) -> StashResult<()> {
        let _op = self.enter().await?;
        self.engine()
            .upload(
                StoreKey::Action(key.clone()),
                UploadSource::Bytes(result.into()),
                UploadMode::Overwrite,
            )
            .await?;
        Ok(())
    }
}
