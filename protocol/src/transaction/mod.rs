//! # Transaction Module
//!
//! The transfer log and the engine that appends to it.
//!
//! ```text
//! types.rs  — Transaction row, pseudo-addresses, type classification
//! engine.rs — atomic push_transaction with name-aware routing
//! ```
//!
//! Every balance movement in the system is one row here: transfers,
//! block rewards, staking movements, and name operations. Rows are
//! append-only; there is no mempool and no pending state — a transaction
//! either commits with its balance effects in a single store
//! transaction, or it never existed.

pub mod engine;
pub mod types;

pub use engine::TransactionEngine;
pub use types::{
    Transaction, TransactionType, A_RECORD_ADDRESS, NAME_ADDRESS, STAKING_ADDRESS,
};
