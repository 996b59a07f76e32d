//! Resolution of merged configuration into a concrete store configuration

use camino::{Utf8Path, Utf8PathBuf};
use stash_core::error::StashError;
use stash_core::DigestFunction;

use crate::toml::{BackendKind, StoreSection};
use crate::ConfigResult;

/// Default chunk size for streamed transfers (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Largest accepted chunk size (16 MiB)
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Backend selection with everything needed to open it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Memory,
    Disk { root: Utf8PathBuf },
}

/// Fully resolved configuration for one store instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    pub digest_function: DigestFunction,
    pub chunk_size: usize,
}

impl StoreConfig {
    /// In-memory store with default settings
    pub fn memory() -> Self {
        Self {
            backend: BackendConfig::Memory,
            digest_function: DigestFunction::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Disk store rooted at `root` with default settings
    pub fn disk(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            backend: BackendConfig::Disk { root: root.into() },
            digest_function: DigestFunction::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override the digest function
    pub fn with_digest_function(mut self, digest_function: DigestFunction) -> Self {
        self.digest_function = digest_function;
        self
    }

    /// Override the chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Resolve a merged `[store]` section, applying defaults.
    ///
    /// `default_dir` is used for the disk backend when no `dir` is set.
    pub fn from_section(section: StoreSection, default_dir: Option<&Utf8Path>) -> ConfigResult<Self> {
        let chunk_size = section.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(StashError::ConfigValidation {
                field: "chunk-size".to_string(),
                reason: format!("must be between 1 and {} bytes, got {}", MAX_CHUNK_SIZE, chunk_size),
            });
        }

        let backend = match section.backend.unwrap_or_default() {
            BackendKind::Memory => BackendConfig::Memory,
            BackendKind::Disk => {
                let root = section
                    .dir
                    .or_else(|| default_dir.map(Utf8Path::to_path_buf))
                    .ok_or_else(|| StashError::ConfigValidation {
                        field: "dir".to_string(),
                        reason: "the disk backend needs a directory".to_string(),
                    })?;
                BackendConfig::Disk { root }
            }
        };

        Ok(Self {
            backend,
            digest_function: section.digest_function.unwrap_or_default(),
            chunk_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_disk_in_default_dir() {
        let config =
            StoreConfig::from_section(StoreSection::default(), Some(Utf8Path::new("/tmp/stash")))
                .unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::Disk {
                root: Utf8PathBuf::from("/tmp/stash")
            }
        );
        assert_eq!(config.digest_function, DigestFunction::Sha256);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_disk_without_dir_fails() {
        let err = StoreConfig::from_section(StoreSection::default(), None).unwrap_err();
        assert!(matches!(err, StashError::ConfigValidation { ref field, .. } if field == "dir"));
    }

    #[test]
    fn test_memory_needs_no_dir() {
        let section = StoreSection {
            backend: Some(BackendKind::Memory),
            ..Default::default()
        };
        let config = StoreConfig::from_section(section, None).unwrap();
        assert_eq!(config.backend, BackendConfig::Memory);
    }

    #[test]
    fn test_chunk_size_bounds() {
        for bad in [0, MAX_CHUNK_SIZE + 1] {
            let section = StoreSection {
                backend: Some(BackendKind::Memory),
                chunk_size: Some(bad),
                ..Default::default()
            };
            assert!(StoreConfig::from_section(section, None).is_err());
        }
    }

    #[test]
    fn test_builders() {
        let config = StoreConfig::memory()
            .with_digest_function(DigestFunction::Blake3)
            .with_chunk_size(10);
        assert_eq!(config.digest_function, DigestFunction::Blake3);
        assert_eq!(config.chunk_size, 10);
    }
}
