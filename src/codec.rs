//! Record codec
//! Maps paths to storage keys and read timestamps to stored values

use crate::error::{Result, StorageError};
use std::ops::RangeInclusive;

/// Byte that never occurs in UTF-8, used as the upper bound of a prefix range
const PREFIX_UPPER_BOUND: u8 = 0xFF;

/// Encode a path as its storage key (the literal UTF-8 bytes, no normalization)
pub fn encode_key(path: &str) -> Vec<u8> {
    path.as_bytes().to_vec()
}

/// Decode a storage key back into a path
pub fn decode_key(key: &[u8]) -> Result<String> {
    String::from_utf8(key.to_vec())
        .map_err(|e| StorageError::Codec(format!("key is not valid UTF-8: {}", e)))
}

/// Encode a millisecond timestamp as a stored value
pub fn encode_timestamp(timestamp: u64) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&timestamp)?)
}

/// Decode a stored value into a millisecond timestamp
pub fn decode_timestamp(value: &[u8]) -> Result<u64> {
    Ok(serde_json::from_slice(value)?)
}

/// Closed key range covering every key that starts with `prefix`
///
/// UTF-8 byte order matches code point order, and every continuation of
/// `prefix` starts with a byte below 0xF5, so `prefix ++ [0xFF]` is an upper
/// bound no real key can reach.
pub fn prefix_range(prefix: &str) -> RangeInclusive<Vec<u8>> {
    let start = encode_key(prefix);
    let mut end = start.clone();
    end.push(PREFIX_UPPER_BOUND);
    start..=end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_range(prefix: &str, key: &str) -> bool {
        prefix_range(prefix).contains(&encode_key(key))
    }

    #[test]
    fn test_key_is_literal() {
        let path = "/blog/post?id=3#comments";
        let key = encode_key(path);
        assert_eq!(key, path.as_bytes());
        assert_eq!(decode_key(&key).unwrap(), path);
    }

    #[test]
    fn test_invalid_key_is_codec_error() {
        let err = decode_key(&[0xFF, 0xFE]).unwrap_err();
        assert!(matches!(err, StorageError::Codec(_)));
    }

    #[test]
    fn test_timestamp_value() {
        let value = encode_timestamp(1_700_000_000_123).unwrap();
        assert_eq!(decode_timestamp(&value).unwrap(), 1_700_000_000_123);
        assert!(decode_timestamp(b"\"nope\"").is_err());
    }

    #[test]
    fn test_prefix_range_bounds() {
        assert!(in_range("/blog", "/blog"));
        assert!(in_range("/blog", "/blog/a"));
        assert!(in_range("/blog", "/blogroll"));
        assert!(in_range("/blog", "/blog/\u{FFFF}"));
        assert!(in_range("/blog", "/blog/\u{1F600}"));
        assert!(!in_range("/blog", "/blo"));
        assert!(!in_range("/blog", "/about"));
        assert!(!in_range("/blog", "/bloh"));
        assert!(!in_range("/blog", "/c"));
    }

    #[test]
    fn test_empty_prefix_covers_everything() {
        assert!(in_range("", ""));
        assert!(in_range("", "/"));
        assert!(in_range("", "\u{10FFFF}"));
    }
}
