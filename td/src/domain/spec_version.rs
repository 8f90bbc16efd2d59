//! Specification version tracking - a content-hashed fingerprint of a
//! project's spec, appended to whenever the spec file's bytes change.

use serde::{Deserialize, Serialize};
use taskstore::{content_hash, now_ms};

use super::id::generate_id;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpecVersion {
    pub version_id: String,
    pub content_hash: String,
    pub created_at: i64,
}

impl SpecVersion {
    pub fn from_content(bytes: &[u8]) -> Self {
        Self {
            version_id: generate_id("specver"),
            content_hash: content_hash(bytes),
            created_at: now_ms(),
        }
    }
}

/// Compare `new_content` against the project's most recent recorded hash
/// and return a fresh [`SpecVersion`] iff the content actually changed.
///
/// Returns `None` when `previous` already covers this content - writing the
/// same spec twice must not fork the version history.
pub fn version_if_changed(previous: Option<&SpecVersion>, new_content: &[u8]) -> Option<SpecVersion> {
    let hash = content_hash(new_content);
    match previous {
        Some(prev) if prev.content_hash == hash => None,
        _ => Some(SpecVersion { version_id: generate_id("specver"), content_hash: hash, created_at: now_ms() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_content_does_not_version() {
        let v1 = SpecVersion::from_content(b"# spec");
        assert!(version_if_changed(Some(&v1), b"# spec").is_none());
    }

    #[test]
    fn changed_content_produces_new_distinct_hash() {
        let v1 = SpecVersion::from_content(b"# spec v1");
        let v2 = version_if_changed(Some(&v1), b"# spec v2").expect("should version");
        assert_ne!(v1.content_hash, v2.content_hash);
        assert_ne!(v1.version_id, v2.version_id);
    }
}
