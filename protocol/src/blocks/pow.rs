//! # Mining Gate
//!
//! The proof-of-work check: a submission is valid when the first 48 bits
//! of `sha256(address || last12 || nonce)`, read as a big-endian
//! integer, do not exceed the current work threshold. Lower work means
//! fewer acceptable hashes, i.e. harder blocks.

use crate::crypto::hash::sha256;

/// The hash a submission is judged by: miner address, the previous
/// block's 12-character hash prefix, and the raw nonce bytes.
pub fn submission_hash(address: &str, last12: &str, nonce: &[u8]) -> String {
    sha256(&[address.as_bytes(), last12.as_bytes(), nonce])
}

/// The first 48 bits of a hex digest as an integer. Fails closed: a
/// malformed digest reads as the hardest possible value.
pub fn hash_prefix_value(hash_hex: &str) -> u64 {
    if hash_hex.len() < 12 {
        return u64::MAX;
    }
    u64::from_str_radix(&hash_hex[..12], 16).unwrap_or(u64::MAX)
}

/// Whether a digest satisfies the given work threshold.
pub fn meets_work(hash_hex: &str, work: u64) -> bool {
    hash_prefix_value(hash_hex) <= work
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_hash_is_plain_concatenation() {
        let h = submission_hash("taaaaaaaaa", "000000000000", &[0x00]);
        let manual = sha256(&[b"taaaaaaaaa000000000000", &[0x00][..]]);
        assert_eq!(h, manual);
        assert_eq!(h.len(), 64);
    }

    #[test]
    fn prefix_value_parses_first_twelve_chars() {
        assert_eq!(hash_prefix_value(&"0".repeat(64)), 0);
        assert_eq!(
            hash_prefix_value("000000000001ffffffffffffffffffffffffffffffffffffffffffffffffffff"),
            1
        );
        assert_eq!(hash_prefix_value(&"f".repeat(64)), 0xffff_ffff_ffff);
    }

    #[test]
    fn malformed_digests_fail_closed() {
        assert_eq!(hash_prefix_value("short"), u64::MAX);
        assert_eq!(hash_prefix_value("zzzzzzzzzzzz0000"), u64::MAX);
    }

    #[test]
    fn work_threshold_is_inclusive() {
        let hash = "000000000064ffffffffffffffffffffffffffffffffffffffffffffffffffff"; // prefix = 100
        assert!(meets_work(hash, 100));
        assert!(meets_work(hash, 101));
        assert!(!meets_work(hash, 99));
        assert!(meets_work(&"0".repeat(64), 0));
    }

    #[test]
    fn everything_meets_unbounded_work() {
        let h = submission_hash("taaaaaaaaa", "000000000000", &[0x42]);
        assert!(meets_work(&h, u64::MAX));
    }
}
