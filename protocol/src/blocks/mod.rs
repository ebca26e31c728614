//! # Block Module
//!
//! The chain itself and the two gates that grow it.
//!
//! ```text
//! pow.rs    — submission hashing and the 48-bit difficulty check
//! engine.rs — submit_block: validation, reward, retarget, decay,
//!             duplicate detection, genesis bootstrap
//! ```
//!
//! Heights are assigned by an auto-incrementing id starting at the
//! genesis block's `id = 1`; there are no forks and no reorgs, so id
//! order is chain order.

pub mod engine;
pub mod pow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use engine::{AcceptedBlock, BlockEngine, WorkDecrease, WorkDetailed};

/// One block row. `hash` is nullable to accommodate legacy rows from
/// before solutions were recorded; such rows never participate in
/// duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Height, starting at 1 for genesis.
    pub id: u64,
    /// Lowercase hex solution hash, unique when present.
    pub hash: Option<String>,
    /// The rewarded address.
    pub address: String,
    /// Submitted nonce bytes, stored and serialized as hex.
    #[serde(with = "crate::crypto::hash::hex_bytes")]
    pub nonce: Vec<u8>,
    pub time: DateTime<Utc>,
    /// Work threshold in force when this block was accepted.
    pub difficulty: u64,
    /// Reward paid to `address`, in TST.
    pub value: u64,
    pub useragent: Option<String>,
    pub origin: Option<String>,
}

impl Block {
    /// First twelve hex characters of the hash; the all-zero prefix for
    /// hashless legacy rows. This is the value successors chain onto.
    pub fn short_hash(&self) -> String {
        match &self.hash {
            Some(h) if h.len() >= 12 => h[..12].to_string(),
            _ => "0".repeat(12),
        }
    }

    /// JSON projection with the derived `short_hash` joined in.
    pub fn to_json(&self) -> serde_json::Value {
        let mut v = serde_json::to_value(self).unwrap_or_default();
        if let Some(map) = v.as_object_mut() {
            map.insert(
                "short_hash".to_string(),
                serde_json::Value::String(self.short_hash()),
            );
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(hash: Option<&str>) -> Block {
        Block {
            id: 1,
            hash: hash.map(|h| h.to_string()),
            address: "taaaaaaaaa".into(),
            nonce: vec![0xde, 0xad],
            time: Utc::now(),
            difficulty: 100_000,
            value: 25,
            useragent: None,
            origin: None,
        }
    }

    #[test]
    fn short_hash_prefixes() {
        let b = block(Some(
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
        ));
        assert_eq!(b.short_hash(), "ba7816bf8f01");
        assert_eq!(block(None).short_hash(), "000000000000");
    }

    #[test]
    fn json_includes_short_hash_and_hex_nonce() {
        let v = block(Some(&"c".repeat(64))).to_json();
        assert_eq!(v["short_hash"], "cccccccccccc");
        assert_eq!(v["nonce"], "dead");
        assert_eq!(v["id"], 1);
    }

    #[test]
    fn bincode_roundtrip() {
        let b = block(Some(&"d".repeat(64)));
        let bytes = bincode::serialize(&b).unwrap();
        let back: Block = bincode::deserialize(&bytes).unwrap();
        assert_eq!(b, back);
    }
}
