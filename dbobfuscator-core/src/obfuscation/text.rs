//! Hash-based masking for character columns.

use crate::models::CellValue;
use md5::{Digest, Md5};

/// Lowercase hex MD5 of `bytes` (always 32 characters).
pub fn hash_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Hashes the canonical bytes of `raw`, truncated to `max_chars` if bounded.
///
/// Hex output is ASCII, so truncating by bytes never splits a character.
pub(super) fn hash_truncated(raw: &CellValue, max_chars: Option<usize>) -> String {
    let mut hashed = raw
        .canonical_bytes()
        .map_or_else(String::new, |bytes| hash_hex(&bytes));
    if let Some(limit) = max_chars {
        hashed.truncate(limit);
    }
    hashed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hex_known_digest() {
        assert_eq!(hash_hex(b"alice"), "6384e2b2184bcbf58eccf10ca7a6563c");
        assert_eq!(hash_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_truncation() {
        let raw = CellValue::from("alice");
        assert_eq!(hash_truncated(&raw, Some(5)), "6384e");
        assert_eq!(hash_truncated(&raw, Some(0)), "");
        assert_eq!(hash_truncated(&raw, Some(255)).len(), 32);
        assert_eq!(hash_truncated(&raw, None).len(), 32);
    }

    #[test]
    fn test_bytes_and_text_hash_alike() {
        assert_eq!(
            hash_truncated(&CellValue::Bytes(b"alice".to_vec()), None),
            hash_truncated(&CellValue::from("alice"), None)
        );
    }
}
