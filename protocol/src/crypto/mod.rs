//! # Cryptographic Primitives
//!
//! Deterministic SHA-256 helpers and the v2 address derivation that
//! everything identity-shaped in Tessera hangs off. There are no
//! signatures here: the network authenticates wallets with a hash
//! contract (`sha256(address || privatekey)`), and addresses are a pure
//! function of the private key.
//!
//! The derivation in [`address`] is consensus-critical and bit-stable:
//! two nodes deriving an address for the same key must agree on every
//! character, forever.

pub mod address;
pub mod hash;

pub use address::{
    is_fetchable_name, is_v2_address, is_valid_a_record, is_valid_address, is_valid_metadata,
    is_valid_name, make_v2_address, parse_name_target, strip_name_suffix,
};
pub use hash::{sha256, sha256_hex};
