//! Local disk backend.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/cas/ab/abcd...-<size>   blobs, sharded by the first hash byte
//! <root>/ac/<action-key>         action results
//! <root>/tmp/                    in-progress writes
//! ```
//!
//! Writes stream into a temporary file that is renamed into place only after
//! the whole stream has been written and synced. A failed or dropped write
//! deletes its temporary file.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use stash_core::{StashError, StashResult};
use std::fs;
use std::io;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{Backend, ByteStream, StoreKey};

/// Backend storing records as files under a root directory
#[derive(Debug)]
pub struct DiskBackend {
    /// Root directory for storage
    root_path: Utf8PathBuf,
    /// Staging directory for in-progress writes
    tmp_path: Utf8PathBuf,
}

impl DiskBackend {
    /// Open (creating if needed) a disk backend rooted at `root_path`
    pub fn new<P: AsRef<Utf8Path>>(root_path: P) -> StashResult<Self> {
        let root_path = root_path.as_ref().to_path_buf();
        let tmp_path = root_path.join("tmp");

        for dir in [root_path.join("cas"), root_path.join("ac"), tmp_path.clone()] {
            fs::create_dir_all(&dir)
                .map_err(|e| StashError::backend(format!("Failed to create {}", dir), e))?;
        }

        Ok(Self { root_path, tmp_path })
    }

    /// Get the root path of the store
    pub fn root_path(&self) -> &Utf8Path {
        &self.root_path
    }

    /// File path a key is stored at
    pub fn key_to_path(&self, key: &StoreKey) -> Utf8PathBuf {
        match key {
            StoreKey::Blob(digest) => {
                let hex = digest.hash_hex();
                self.root_path
                    .join("cas")
                    .join(&hex[0..2])
                    .join(format!("{}-{}", hex, digest.size()))
            }
            StoreKey::Action(action_key) => self.root_path.join("ac").join(action_key.as_str()),
        }
    }
}

#[async_trait]
impl Backend for DiskBackend {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn exists(&self, key: &StoreKey) -> StashResult<bool> {
        let path = self.key_to_path(key);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StashError::backend(format!("Failed to stat {}", path), e)),
        }
    }

    async fn read(&self, key: &StoreKey) -> StashResult<Option<ByteStream>> {
        let path = self.key_to_path(key);
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Some(Box::pin(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StashError::backend(format!("Failed to open {}", path), e)),
        }
    }

    async fn write(&self, key: &StoreKey, mut data: ByteStream) -> StashResult<()> {
        let target = self.key_to_path(key);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StashError::backend(format!("Failed to create {}", parent), e))?;
        }

        let tmp_path = self.tmp_path.clone();
        let staged = blocking(move || tempfile::Builder::new().prefix("write-").tempfile_in(tmp_path))
            .await
            .map_err(|e| StashError::backend("Failed to create staging file", e))?;
        let handle = staged
            .as_file()
            .try_clone()
            .map_err(|e| StashError::backend("Failed to open staging file", e))?;
        let mut file = tokio::fs::File::from_std(handle);

        let written = tokio::io::copy(&mut data, &mut file)
            .await
            .map_err(|e| StashError::backend(format!("Failed to write {}", key), e))?;
        file.flush()
            .await
            .map_err(|e| StashError::backend(format!("Failed to flush {}", key), e))?;
        file.sync_all()
            .await
            .map_err(|e| StashError::backend(format!("Failed to sync {}", key), e))?;
        drop(file);

        let destination = target.clone();
        blocking(move || staged.persist(destination).map(drop).map_err(|e| e.error))
            .await
            .map_err(|e| StashError::backend(format!("Failed to move {} into place", key), e))?;

        debug!(key = %key, path = %target, size = written, "stored record on disk");
        Ok(())
    }

    async fn close(&self) -> StashResult<()> {
        debug!(root = %self.root_path, "closing disk backend");
        Ok(())
    }
}

/// Run a blocking filesystem call off the async worker threads
async fn blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(io::Error::from)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_core::{ActionKey, DigestFunction};
    use std::io::Cursor;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;

    fn open(temp_dir: &tempfile::TempDir) -> DiskBackend {
        let root = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf()).unwrap();
        DiskBackend::new(root).unwrap()
    }

    fn stream(data: Vec<u8>) -> ByteStream {
        Box::pin(Cursor::new(data))
    }

    #[test]
    fn test_disk_backend_creation() {
        let temp_dir = tempdir().unwrap();
        let backend = open(&temp_dir);
        assert!(backend.root_path().join("cas").is_dir());
        assert!(backend.root_path().join("ac").is_dir());
        assert!(backend.root_path().join("tmp").is_dir());
    }

    #[test]
    fn test_key_layout() {
        let temp_dir = tempdir().unwrap();
        let backend = open(&temp_dir);

        let digest = DigestFunction::Sha256.digest(b"hello world");
        let path = backend.key_to_path(&StoreKey::Blob(digest));
        assert!(path.ends_with(format!("cas/b9/{}-11", digest.hash_hex())));

        let action = ActionKey::new("step-1").unwrap();
        let path = backend.key_to_path(&StoreKey::Action(action));
        assert!(path.ends_with("ac/step-1"));
    }

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let temp_dir = tempdir().unwrap();
        let backend = open(&temp_dir);
        let key = StoreKey::Blob(DigestFunction::Sha256.digest(b"hello world"));

        assert!(!backend.exists(&key).await.unwrap());
        assert!(backend.read(&key).await.unwrap().is_none());

        backend.write(&key, stream(b"hello world".to_vec())).await.unwrap();
        assert!(backend.exists(&key).await.unwrap());

        let mut reader = backend.read(&key).await.unwrap().unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn test_overwrite_action() {
        let temp_dir = tempdir().unwrap();
        let backend = open(&temp_dir);
        let key = StoreKey::Action(ActionKey::new("k").unwrap());

        backend.write(&key, stream(b"first".to_vec())).await.unwrap();
        backend.write(&key, stream(b"second".to_vec())).await.unwrap();

        let mut out = Vec::new();
        backend.read(&key).await.unwrap().unwrap().read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"second");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_writes() {
        let temp_dir = tempdir().unwrap();
        let backend = std::sync::Arc::new(open(&temp_dir));

        let writes: Vec<_> = (0..8)
            .map(|i| {
                let backend = backend.clone();
                tokio::spawn(async move {
                    let key = StoreKey::Action(ActionKey::new(format!("step-{i}")).unwrap());
                    backend.write(&key, stream(vec![i as u8; 64 * 1024])).await
                })
            })
            .collect();
        for write in writes {
            write.await.unwrap().unwrap();
        }

        for i in 0..8 {
            let key = StoreKey::Action(ActionKey::new(format!("step-{i}")).unwrap());
            let mut out = Vec::new();
            backend.read(&key).await.unwrap().unwrap().read_to_end(&mut out).await.unwrap();
            assert_eq!(out, vec![i as u8; 64 * 1024]);
        }
        assert_eq!(std::fs::read_dir(backend.root_path().join("tmp")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_nothing() {
        let temp_dir = tempdir().unwrap();
        let backend = open(&temp_dir);
        let key = StoreKey::Action(ActionKey::new("broken").unwrap());

        let failing = crate::backend::testing::FailingReader::after(b"partial".to_vec());
        assert!(backend.write(&key, Box::pin(failing)).await.is_err());

        assert!(!backend.exists(&key).await.unwrap());
        let staged = std::fs::read_dir(backend.root_path().join("tmp")).unwrap().count();
        assert_eq!(staged, 0);
    }
}
