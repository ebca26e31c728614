//! # Hashing Utilities
//!
//! SHA-256 is the only hash Tessera uses: block solutions, address
//! derivation, and wallet authentication all run through it. Digests are
//! handled as lowercase hex strings because that is the form they take
//! on the wire, in the database, and as input to further hashing rounds
//! (the address derivation re-hashes hex strings, not raw digests).

use sha2::{Digest, Sha256};

/// Hash the byte-wise concatenation of `parts` and return the lowercase
/// hex digest.
///
/// Strings go in as UTF-8, byte buffers as-is. `sha256(&[a, b])` is
/// identical to hashing the single buffer `a ++ b`.
pub fn sha256(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Hash a single string. Shorthand for the common one-part case.
pub fn sha256_hex(data: &str) -> String {
    sha256(&[data.as_bytes()])
}

/// Serde adapter storing byte buffers as lowercase hex strings, used for
/// block nonces so they read naturally in both bincode rows and JSON.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_digest() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn parts_concatenate() {
        assert_eq!(sha256(&[b"ab", b"c"]), sha256_hex("abc"));
        assert_eq!(sha256(&[b"a", b"b", b"c"]), sha256_hex("abc"));
    }

    #[test]
    fn digest_is_lowercase_hex() {
        let h = sha256_hex("tessera");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
