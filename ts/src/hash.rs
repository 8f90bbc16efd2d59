//! Content hashing used to fingerprint specification text across revisions.

use sha2::{Digest, Sha256};

/// Lowercase hex-encoded SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_sensitive_to_content() {
        let a = content_hash(b"# Todo\n\n- add\n");
        let b = content_hash(b"# Todo\n\n- add\n");
        let c = content_hash(b"# Todo\n\n- add\n- delete\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
