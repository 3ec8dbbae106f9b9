//! Path to key conversion.

use crate::error::{Result, VaultError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Segment separator and key terminator.
pub const SEPARATOR: char = '/';

/// Canonical flat key of one tree node.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    /// Encode a segment sequence.
    pub fn encode<S: AsRef<str>>(segments: &[S]) -> Self {
        let mut key = String::new();
        for segment in segments {
            key.push_str(segment.as_ref());
            key.push(SEPARATOR);
        }
        if key.is_empty() {
            key.push(SEPARATOR);
        }
        StorageKey(key)
    }

    /// Wrap a raw key string as found in storage or in a snapshot.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        StorageKey(raw.into())
    }

    /// Split the key back into its segments.
    pub fn segments(&self) -> Vec<String> {
        decode(&self.0)
    }

    /// Key of the named child of this node.
    pub fn child(&self, segment: &str) -> Self {
        let mut key = if self.0.len() == 1 && self.0.starts_with(SEPARATOR) {
            String::new()
        } else {
            self.0.clone()
        };
        key.push_str(segment);
        key.push(SEPARATOR);
        StorageKey(key)
    }

    /// Whether this key addresses `ancestor` or a node below it.
    pub fn is_within(&self, ancestor: &StorageKey) -> bool {
        self.0.starts_with(&ancestor.0)
    }

    /// Segments of this key relative to `ancestor`.
    ///
    /// Returns `None` when the key is not strictly below `ancestor`.
    pub fn relative_to(&self, ancestor: &StorageKey) -> Option<Vec<String>> {
        let rest = self.0.strip_prefix(&ancestor.0)?;
        if rest.is_empty() {
            return None;
        }
        Some(decode(rest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({})", self.0)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Encode a segment sequence into its key string.
pub fn encode<S: AsRef<str>>(segments: &[S]) -> String {
    StorageKey::encode(segments).into_string()
}

/// Decode a key string into its segments, dropping the empty element the
/// terminator leaves behind.
pub fn decode(key: &str) -> Vec<String> {
    let body = key.strip_suffix(SEPARATOR).unwrap_or(key);
    if body.is_empty() {
        return Vec::new();
    }
    body.split(SEPARATOR).map(str::to_string).collect()
}

/// Reject segment names that would not survive an encode/decode cycle.
pub fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(VaultError::Configuration("empty path segment".into()));
    }
    if segment.contains(SEPARATOR) {
        return Err(VaultError::Configuration(format!(
            "path segment '{}' contains '{}'",
            segment, SEPARATOR
        )));
    }
    Ok(())
}
