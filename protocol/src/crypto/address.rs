//! # v2 Address Derivation & Input Validation
//!
//! A v2 address is ten characters: the network prefix followed by nine
//! base-36 characters derived from the private key through a chain of
//! double-SHA-256 rounds. The derivation consumes a 9-slot scratch array
//! in an order driven by the evolving hash, which makes the mapping
//! non-linear in the key while staying fully deterministic.
//!
//! The character-class validators for addresses, names, metadata, and
//! A-records also live here; every external input is checked by one of
//! them before it reaches an engine.

use super::hash::{sha256_hex, sha256};

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Map a byte (as parsed from two hex chars) onto `0-9a-z`.
///
/// The range 0..=255 is walked in buckets of seven: the first ten
/// buckets map to digits, the next twenty-six to letters, and the
/// leftover tail above 251 collapses to `'e'`.
fn hex_to_base36(value: u32) -> char {
    let mut bucket = 6u32;
    while bucket <= 251 {
        if value <= bucket {
            return if bucket <= 69 {
                (b'0' + ((bucket - 6) / 7) as u8) as char
            } else {
                (b'a' + ((bucket - 76) / 7) as u8) as char
            };
        }
        bucket += 7;
    }
    'e'
}

/// Derive the v2 address for a private key.
///
/// Pure and bit-stable: repeated calls with the same key and prefix
/// yield the identical ten-character address.
pub fn make_v2_address(private_key: &str, prefix: char) -> String {
    let mut chain: [Option<String>; 9] = Default::default();
    let mut hash = sha256_hex(&sha256_hex(private_key));

    for slot in chain.iter_mut() {
        *slot = Some(hash[0..2].to_string());
        hash = sha256_hex(&sha256_hex(&hash));
    }

    let mut out = String::with_capacity(10);
    out.push(prefix);
    let mut cursor = 0usize;
    while out.len() < 10 {
        let index = usize::from_str_radix(&hash[2 * cursor..2 * cursor + 2], 16)
            .unwrap_or_default()
            % 9;
        match chain[index].take() {
            None => {
                // Slot already consumed: advance the hash and re-read the
                // same cursor position.
                hash = sha256_hex(&hash);
            }
            Some(pair) => {
                let value = u32::from_str_radix(&pair, 16).unwrap_or_default();
                out.push(hex_to_base36(value));
                cursor += 1;
            }
        }
    }
    out
}

/// Compute the wallet authentication digest: `sha256(address || key)`.
pub fn auth_digest(address: &str, private_key: &str) -> String {
    sha256(&[address.as_bytes(), private_key.as_bytes()])
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn is_lower_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn is_base36(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
}

/// `^t[a-z0-9]{9}$` — the only form accepted for block submission.
pub fn is_v2_address(s: &str, prefix: char) -> bool {
    let mut chars = s.chars();
    chars.next() == Some(prefix) && s.len() == 10 && is_base36(&s[1..])
}

/// `^(t[a-z0-9]{9}|[a-f0-9]{10})$` — v2 or legacy ten-hex addresses.
pub fn is_valid_address(s: &str, prefix: char) -> bool {
    is_v2_address(s, prefix) || (s.len() == 10 && is_lower_hex(s))
}

/// `^[a-z0-9]{1,64}$`.
pub fn is_valid_name(s: &str) -> bool {
    (1..=64).contains(&s.len()) && is_base36(s)
}

/// Like [`is_valid_name`] but tolerating a leading `xn--` (punycode
/// lookups arrive in this form).
pub fn is_fetchable_name(s: &str) -> bool {
    is_valid_name(s.strip_prefix("xn--").unwrap_or(s))
}

/// Printable ASCII plus LF, 1–255 bytes.
pub fn is_valid_metadata(s: &str) -> bool {
    (1..=255).contains(&s.len())
        && s.bytes().all(|b| (0x20..=0x7f).contains(&b) || b == b'\n')
}

/// A-record shape: 2–255 bytes, no whitespace, first byte not one of
/// `. ? #`.
pub fn is_valid_a_record(s: &str) -> bool {
    if !(2..=255).contains(&s.len()) {
        return false;
    }
    let first = s.as_bytes()[0];
    if matches!(first, b'.' | b'?' | b'#') {
        return false;
    }
    !s.bytes().any(|b| b.is_ascii_whitespace())
}

// ---------------------------------------------------------------------------
// Name targets
// ---------------------------------------------------------------------------

/// Remove a trailing `.<suffix>` from a name query, if present.
pub fn strip_name_suffix<'a>(name: &'a str, suffix: &str) -> &'a str {
    let dotted_len = suffix.len() + 1;
    if name.len() > dotted_len
        && name.ends_with(suffix)
        && name.as_bytes()[name.len() - dotted_len] == b'.'
    {
        &name[..name.len() - dotted_len]
    } else {
        name
    }
}

/// Parse a payment target of the form `[metaname@]name.<suffix>`.
///
/// Matching is case-insensitive; the returned parts are lowercased. The
/// metaname, when present, is 1–32 characters of `[a-z0-9-_]`. Returns
/// `None` when the target is not name-shaped at all (plain addresses
/// fall through to normal routing).
pub fn parse_name_target(to: &str, suffix: &str) -> Option<(Option<String>, String)> {
    let lowered = to.to_lowercase();
    let stripped = strip_name_suffix(&lowered, suffix);
    if stripped.len() == lowered.len() {
        return None;
    }

    let (metaname, name) = match stripped.split_once('@') {
        Some((meta, name)) => {
            let meta_ok = (1..=32).contains(&meta.len())
                && meta
                    .bytes()
                    .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase() || b == b'-' || b == b'_');
            if !meta_ok {
                return None;
            }
            (Some(meta.to_string()), name)
        }
        None => (None, stripped),
    };

    if !is_valid_name(name) {
        return None;
    }
    Some((metaname, name.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_pure() {
        let a = make_v2_address("test", 't');
        let b = make_v2_address("test", 't');
        assert_eq!(a, b);
    }

    #[test]
    fn derived_address_shape() {
        for key in ["test", "", "correct horse battery staple", "🦀"] {
            let addr = make_v2_address(key, 't');
            assert_eq!(addr.len(), 10, "key {key:?}");
            assert!(is_v2_address(&addr, 't'), "key {key:?} gave {addr}");
        }
    }

    #[test]
    fn distinct_keys_distinct_addresses() {
        assert_ne!(make_v2_address("alpha", 't'), make_v2_address("beta", 't'));
    }

    #[test]
    fn base36_bucket_boundaries() {
        assert_eq!(hex_to_base36(0), '0');
        assert_eq!(hex_to_base36(6), '0');
        assert_eq!(hex_to_base36(7), '1');
        assert_eq!(hex_to_base36(69), '9');
        assert_eq!(hex_to_base36(70), 'a');
        assert_eq!(hex_to_base36(76), 'a');
        assert_eq!(hex_to_base36(77), 'b');
        assert_eq!(hex_to_base36(251), 'z');
        assert_eq!(hex_to_base36(252), 'e');
        assert_eq!(hex_to_base36(255), 'e');
    }

    #[test]
    fn address_validation() {
        assert!(is_v2_address("taaaaaaaaa", 't'));
        assert!(is_v2_address("t123456789", 't'));
        assert!(!is_v2_address("kaaaaaaaaa", 't'));
        assert!(!is_v2_address("taaaaaaaa", 't'));
        assert!(!is_v2_address("taaaaaaaaaa", 't'));
        assert!(!is_v2_address("tAAAAAAAAA", 't'));

        // Legacy ten-hex form is valid generally, but not v2.
        assert!(is_valid_address("0123456789", 't'));
        assert!(is_valid_address("abcdef0123", 't'));
        assert!(!is_v2_address("abcdef0123", 't'));
        assert!(!is_valid_address("ghijklmnop", 't'));
    }

    #[test]
    fn name_validation() {
        assert!(is_valid_name("a"));
        assert!(is_valid_name("example"));
        assert!(is_valid_name(&"a".repeat(64)));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name(&"a".repeat(65)));
        assert!(!is_valid_name("Example"));
        assert!(!is_valid_name("ex.ample"));

        assert!(is_fetchable_name("xn--mnchen-3ya"));
        assert!(!is_fetchable_name("xn--"));
    }

    #[test]
    fn metadata_validation() {
        assert!(is_valid_metadata("hello=world;ref=1"));
        assert!(is_valid_metadata("line one\nline two"));
        assert!(!is_valid_metadata(""));
        assert!(!is_valid_metadata(&"x".repeat(256)));
        assert!(!is_valid_metadata("tab\tseparated"));
        assert!(!is_valid_metadata("émoji"));
    }

    #[test]
    fn a_record_validation() {
        assert!(is_valid_a_record("example.com"));
        assert!(is_valid_a_record("https://example.com/path"));
        assert!(!is_valid_a_record(".example.com"));
        assert!(!is_valid_a_record("?query"));
        assert!(!is_valid_a_record("#frag"));
        assert!(!is_valid_a_record("has space"));
        assert!(!is_valid_a_record("x"));
        assert!(!is_valid_a_record(&"x".repeat(256)));
    }

    #[test]
    fn suffix_stripping() {
        assert_eq!(strip_name_suffix("example.tst", "tst"), "example");
        assert_eq!(strip_name_suffix("example", "tst"), "example");
        assert_eq!(strip_name_suffix("tst", "tst"), "tst");
        assert_eq!(strip_name_suffix("a.tst.tst", "tst"), "a.tst");
    }

    #[test]
    fn name_target_parsing() {
        assert_eq!(
            parse_name_target("example.tst", "tst"),
            Some((None, "example".to_string()))
        );
        assert_eq!(
            parse_name_target("shop@example.tst", "tst"),
            Some((Some("shop".to_string()), "example".to_string()))
        );
        // Case-insensitive, lowercased on the way out.
        assert_eq!(
            parse_name_target("Shop@Example.TST", "tst"),
            Some((Some("shop".to_string()), "example".to_string()))
        );
        // Not name-shaped: plain addresses fall through.
        assert_eq!(parse_name_target("taaaaaaaaa", "tst"), None);
        // Bad metaname.
        assert_eq!(parse_name_target("b@d!@example.tst", "tst"), None);
        // Bad name part.
        assert_eq!(parse_name_target("ex.ample.tst", "tst"), None);
    }

    #[test]
    fn auth_digest_concatenates() {
        assert_eq!(
            auth_digest("taaaaaaaaa", "secret"),
            crate::crypto::hash::sha256_hex("taaaaaaaaasecret")
        );
    }
}
