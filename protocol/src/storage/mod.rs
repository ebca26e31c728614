//! # Storage Module
//!
//! Two stores with very different lifetimes:
//!
//! ```text
//! db.rs   — sled-backed durable store: addresses, blocks, transactions,
//!           names, auth log. Serializable transactions, bincode rows.
//! fast.rs — process-local mutable state: current work, current
//!           validator, feature flags, MOTD, work-over-time ring.
//! ```
//!
//! The split is load-bearing: everything in `db` survives a restart and
//! is written under transactions; everything in `fast` is rebuilt from
//! defaults on boot (work resets to `max_work`, the validator to empty)
//! and is read on every submission without touching disk.

pub mod db;
pub mod fast;

pub use db::Store;
pub use fast::FastState;
