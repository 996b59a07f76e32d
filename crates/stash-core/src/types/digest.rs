//! Content digests.
//!
//! A [`Digest`] is the identity of a blob: the hash of its bytes together
//! with its length. The canonical text form is `<hex-hash>/<size>`.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{StashError, StashResult};

/// Length in bytes of every supported hash
pub const HASH_LEN: usize = 32;

/// Content identity: hash of the bytes plus their length
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest {
    hash: [u8; HASH_LEN],
    size: u64,
}

impl Digest {
    /// Create a digest from raw hash bytes and a size
    pub fn new(hash: [u8; HASH_LEN], size: u64) -> Self {
        Self { hash, size }
    }

    /// Create a digest from a hexadecimal hash and a size
    pub fn from_hex(hex_str: &str, size: u64) -> StashResult<Self> {
        let bytes = hex::decode(hex_str).map_err(|e| StashError::InvalidDigest {
            input: hex_str.to_string(),
            reason: format!("invalid hex: {}", e),
        })?;
        let hash: [u8; HASH_LEN] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            StashError::InvalidDigest {
                input: hex_str.to_string(),
                reason: format!("expected {} hash bytes, got {}", HASH_LEN, bytes.len()),
            }
        })?;
        Ok(Self { hash, size })
    }

    /// Raw hash bytes
    pub fn hash(&self) -> &[u8; HASH_LEN] {
        &self.hash
    }

    /// Hash as a lowercase hexadecimal string
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Size of the content in bytes
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.hash_hex(), self.size)
    }
}

impl FromStr for Digest {
    type Err = StashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hash, size) = s.split_once('/').ok_or_else(|| StashError::InvalidDigest {
            input: s.to_string(),
            reason: "expected <hash>/<size>".to_string(),
        })?;
        let size = size.parse::<u64>().map_err(|e| StashError::InvalidDigest {
            input: s.to_string(),
            reason: format!("invalid size: {}", e),
        })?;
        Self::from_hex(hash, size)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO_HEX: &str = "0000000000000000000000000000000000000000000000000000000000000000";

    #[test]
    fn test_digest_creation() {
        let digest = Digest::new([7u8; HASH_LEN], 11);
        assert_eq!(digest.hash(), &[7u8; HASH_LEN]);
        assert_eq!(digest.size(), 11);
    }

    #[test]
    fn test_from_hex_invalid_length() {
        let err = Digest::from_hex("abcd", 4).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_from_hex_invalid_chars() {
        let bad = "zz".repeat(HASH_LEN);
        assert!(Digest::from_hex(&bad, 0).is_err());
    }

    #[test]
    fn test_display_and_parse() {
        let digest = Digest::from_hex(ZERO_HEX, 42).unwrap();
        let text = digest.to_string();
        assert_eq!(text, format!("{}/42", ZERO_HEX));
        let parsed: Digest = text.parse().unwrap();
        assert_eq!(parsed, digest);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("no-slash".parse::<Digest>().is_err());
        assert!(format!("{}/-1", ZERO_HEX).parse::<Digest>().is_err());
        assert!(format!("{}/", ZERO_HEX).parse::<Digest>().is_err());
    }

    #[test]
    fn test_same_hash_different_size_differs() {
        let a = Digest::new([1u8; HASH_LEN], 1);
        let b = Digest::new([1u8; HASH_LEN], 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_serde_as_string() {
        let digest = Digest::from_hex(ZERO_HEX, 3).unwrap();
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}/3\"", ZERO_HEX));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }
}
