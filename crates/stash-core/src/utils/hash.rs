//! Digest computation for cache content.
//!
//! Supports SHA-256 (the usual remote-execution digest function) and Blake3.
//! Both produce 32-byte hashes, so either fits in a [`Digest`].

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

use crate::error::{StashError, StashResult};
use crate::types::Digest;

/// Buffer size used when hashing files
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Hash algorithm used to derive digests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestFunction {
    #[default]
    Sha256,
    Blake3,
}

impl DigestFunction {
    /// Start an incremental hash
    pub fn hasher(self) -> DigestHasher {
        let inner = match self {
            DigestFunction::Sha256 => HasherInner::Sha256(Sha256::new()),
            DigestFunction::Blake3 => HasherInner::Blake3(Box::new(blake3::Hasher::new())),
        };
        DigestHasher { inner, size: 0 }
    }

    /// Compute the digest of an in-memory buffer
    pub fn digest(self, data: &[u8]) -> Digest {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }

    /// Lowercase name as used in configuration
    pub fn name(self) -> &'static str {
        match self {
            DigestFunction::Sha256 => "sha256",
            DigestFunction::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for DigestFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestFunction {
    type Err = StashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(DigestFunction::Sha256),
            "blake3" => Ok(DigestFunction::Blake3),
            other => Err(StashError::ConfigValidation {
                field: "digest_function".to_string(),
                reason: format!("unknown digest function '{}'", other),
            }),
        }
    }
}

enum HasherInner {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

/// Incremental hasher that also counts bytes
pub struct DigestHasher {
    inner: HasherInner,
    size: u64,
}

impl DigestHasher {
    /// Feed more content
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            HasherInner::Sha256(h) => h.update(data),
            HasherInner::Blake3(h) => {
                h.update(data);
            }
        }
        self.size += data.len() as u64;
    }

    /// Bytes hashed so far
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Finish and produce the digest
    pub fn finalize(self) -> Digest {
        let hash: [u8; 32] = match self.inner {
            HasherInner::Sha256(h) => h.finalize().into(),
            HasherInner::Blake3(h) => *h.finalize().as_bytes(),
        };
        Digest::new(hash, self.size)
    }
}

impl fmt::Debug for DigestHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let function = match self.inner {
            HasherInner::Sha256(_) => DigestFunction::Sha256,
            HasherInner::Blake3(_) => DigestFunction::Blake3,
        };
        f.debug_struct("DigestHasher")
            .field("function", &function)
            .field("size", &self.size)
            .finish()
    }
}

/// Check that `data` matches `expected`, size first
pub fn verify_digest(function: DigestFunction, data: &[u8], expected: &Digest) -> StashResult<()> {
    if data.len() as u64 != expected.size() {
        return Err(StashError::DigestMismatch {
            expected: expected.to_string(),
            actual: format!("{} bytes", data.len()),
        });
    }
    let actual = function.digest(data);
    if actual != *expected {
        return Err(StashError::DigestMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

/// Digest a single file without loading it whole
pub fn digest_file<P: AsRef<Path>>(function: DigestFunction, path: P) -> StashResult<Digest> {
    let path = path.as_ref();
    let mut file = File::open(path)
        .map_err(|e| StashError::io(format!("Failed to open {}", path.display()), e))?;
    let mut hasher = function.hasher();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| StashError::io(format!("Failed to read {}", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize())
}

/// Digest multiple files in parallel
pub fn digest_files_parallel(
    function: DigestFunction,
    paths: &[PathBuf],
) -> StashResult<Vec<(PathBuf, Digest)>> {
    paths
        .par_iter()
        .map(|path| Ok((path.clone(), digest_file(function, path)?)))
        .collect()
}

/// Digest every file under a directory, ordered by path
pub fn digest_directory<P: AsRef<Path>>(
    function: DigestFunction,
    dir_path: P,
) -> StashResult<Vec<(PathBuf, Digest)>> {
    let mut file_paths: Vec<PathBuf> = WalkDir::new(dir_path.as_ref())
        .into_iter()
        .filter_map(|entry| {
            entry.ok().and_then(|e| {
                if e.file_type().is_file() {
                    Some(e.path().to_path_buf())
                } else {
                    None
                }
            })
        })
        .collect();

    file_paths.sort();

    digest_files_parallel(function, &file_paths)
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use proptest::test_runner::Config as ProptestConfig;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]
        /// Digests are deterministic and record the content length
        #[test]
        fn digest_determinism_property(content in prop::collection::vec(any::<u8>(), 0..2048)) {
            for function in [DigestFunction::Sha256, DigestFunction::Blake3] {
                let a = function.digest(&content);
                let b = function.digest(&content);
                prop_assert_eq!(a, b);
                prop_assert_eq!(a.size(), content.len() as u64);
                prop_assert!(verify_digest(function, &content, &a).is_ok());
            }
        }

        /// Splitting the input at any point does not change the digest
        #[test]
        fn incremental_split_property(
            content in prop::collection::vec(any::<u8>(), 0..2048),
            split in any::<prop::sample::Index>(),
        ) {
            let at = split.index(content.len() + 1);
            let mut hasher = DigestFunction::Blake3.hasher();
            hasher.update(&content[..at]);
            hasher.update(&content[at..]);
            prop_assert_eq!(hasher.finalize(), DigestFunction::Blake3.digest(&content));
        }
    }
}
