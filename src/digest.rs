// MD5 hex digests used across the sync engine.
//
// The digest choice is contract-relevant: session identifiers are derived
// from it and the merge-conflict tiebreak compares digests lexicographically,
// so every node in a deployment must agree on the algorithm.

use md5::{Digest, Md5};

/// Returns the lowercase hex MD5 digest of a UTF-8 string.
pub fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // RFC 1321 test vector
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex("abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(md5_hex("record data"), md5_hex("record data"));
        assert_ne!(md5_hex("record data"), md5_hex("record data "));
    }
}
