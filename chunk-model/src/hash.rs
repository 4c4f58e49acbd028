//! Content hashing.
//!
//! A single pure function over bytes. Used for both `file_hash` (full file
//! content) and `content_hash` (a single chunk's text), which is why it
//! lives here rather than in `chunking-store`: both the store and the
//! index manager need it without depending on each other.

use sha2::{Digest, Sha256};

/// SHA-256 of `bytes`, rendered as 64 lowercase hex characters.
///
/// Deterministic across processes, operating systems, and runs — it is a
/// pure function of the bytes, nothing else.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `true` if `s` has the shape of a hash produced by [`sha256_hex`]:
/// exactly 64 lowercase hex characters.
pub fn is_well_formed_hash(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector_empty_string() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn deterministic_and_well_formed() {
        let a = sha256_hex(b"fn main() {}");
        let b = sha256_hex(b"fn main() {}");
        assert_eq!(a, b);
        assert!(is_well_formed_hash(&a));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn distinct_inputs_distinct_hashes() {
        assert_ne!(sha256_hex(b"a"), sha256_hex(b"b"));
    }

    #[test]
    fn rejects_malformed_hash_strings() {
        assert!(!is_well_formed_hash("too-short"));
        assert!(!is_well_formed_hash(&"a".repeat(63)));
        assert!(!is_well_formed_hash(&"A".repeat(64)));
    }
}
