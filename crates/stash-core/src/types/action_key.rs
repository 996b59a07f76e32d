//! Action cache keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{StashError, StashResult};

/// Longest accepted action key, in bytes
pub const MAX_ACTION_KEY_LEN: usize = 256;

/// Opaque fingerprint of a computation's inputs.
///
/// Keys are not derived from the result they index, so the caller is
/// responsible for avoiding collisions. The accepted alphabet is restricted
/// so that a key can be used directly as a file name by backends.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionKey(String);

impl ActionKey {
    /// Validate and wrap an action key
    pub fn new(key: impl Into<String>) -> StashResult<Self> {
        let key = key.into();
        validate(&key)?;
        Ok(Self(key))
    }

    /// The key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(key: &str) -> StashResult<()> {
    let invalid = |reason: &str| StashError::InvalidActionKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.len() > MAX_ACTION_KEY_LEN {
        return Err(invalid("key is longer than 256 bytes"));
    }
    if key == "." || key == ".." {
        return Err(invalid("key is a relative path component"));
    }
    if let Some(c) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(&format!("character {:?} is not allowed", c)));
    }
    Ok(())
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ActionKey {
    type Err = StashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ActionKey {
    type Error = StashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ActionKey> for String {
    fn from(key: ActionKey) -> Self {
        key.0
    }
}

impl AsRef<str> for ActionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
