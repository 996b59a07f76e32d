//! stash.toml configuration parsing and serialization

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use stash_core::error::StashError;
use stash_core::DigestFunction;
use std::fmt;
use std::str::FromStr;

use crate::ConfigResult;

/// Complete stash.toml configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StashToml {
    /// Store section
    #[serde(default)]
    pub store: StoreSection,
}

/// `[store]` section. Every field is optional so layers can be merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoreSection {
    /// Which backend to open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,

    /// Root directory for the disk backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<Utf8PathBuf>,

    /// Hash used to verify uploaded content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_function: Option<DigestFunction>,

    /// Chunk size for streamed transfers, in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
}

/// Backend selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local, lost on exit
    Memory,
    /// Files under a root directory
    #[default]
    Disk,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => f.write_str("memory"),
            BackendKind::Disk => f.write_str("disk"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = StashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(BackendKind::Memory),
            "disk" | "local" => Ok(BackendKind::Disk),
            other => Err(StashError::ConfigValidation {
                field: "backend".to_string(),
                reason: format!("unknown backend '{}', expected 'memory' or 'disk'", other),
            }),
        }
    }
}

impl StoreSection {
    /// Fill unset fields from `base`; fields set here win
    pub fn layered_over(self, base: StoreSection) -> StoreSection {
        StoreSection {
            backend: self.backend.or(base.backend),
            dir: self.dir.or(base.dir),
            digest_function: self.digest_function.or(base.digest_function),
            chunk_size: self.chunk_size.or(base.chunk_size),
        }
    }
}

/// Parse stash.toml content
pub fn parse(content: &str, path: &Utf8Path) -> ConfigResult<StashToml> {
    let config: StashToml = ::toml::from_str(content).map_err(|e| StashError::ConfigParse {
        path: path.to_string(),
        message: e.message().to_string(),
    })?;
    Ok(config)
}

/// Load and parse a stash.toml file
pub async fn load_from_file(path: &Utf8Path) -> ConfigResult<StashToml> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StashError::io(format!("Failed to read {}", path), e))?;
    parse(&content, path)
}

/// Serialize a configuration back to TOML
pub fn to_string(config: &StashToml) -> ConfigResult<String> {
    ::toml::to_string_pretty(config).map_err(|e| StashError::ConfigValidation {
        field: "store".to_string(),
        reason: format!("Failed to serialize configuration: {}", e),
    })
}
