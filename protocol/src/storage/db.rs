//! # Persistent Store
//!
//! The durability layer, built on sled's embedded key-value store with
//! bincode row encoding. All durable entities share one keyspace with
//! typed key prefixes:
//!
//! | Prefix | Key                              | Value                  |
//! |--------|----------------------------------|------------------------|
//! | `a:`   | address (UTF-8)                  | `bincode(Address)`     |
//! | `b:`   | block id (8B BE)                 | `bincode(Block)`       |
//! | `bh:`  | block hash (hex UTF-8)           | block id (8B BE)       |
//! | `t:`   | transaction id (8B BE)           | `bincode(Transaction)` |
//! | `ta:`  | address ⊕ `0x00` ⊕ id (8B BE)    | empty                  |
//! | `n:`   | name (UTF-8)                     | `bincode(Name)`        |
//! | `l:`   | time millis (8B BE) ⊕ seq (4B BE)| `bincode(AuthLogEntry)`|
//! | `m:`   | metadata key (UTF-8)             | varies                 |
//!
//! Block ids are stored big-endian so sled's lexicographic ordering
//! matches chain order, and the `bh:` index doubles as the uniqueness
//! constraint on block hashes: an insert that finds the key already
//! present aborts the surrounding transaction.
//!
//! A single keyspace (rather than one tree per table) lets every engine
//! operation — block submission, transfer, name purchase, staking
//! mutation — run in **one** `sled` transaction over one tree: every
//! side effect commits or none does. Transactional trees cannot be
//! iterated, so range-shaped reads (unpaid names, penalty holders, log
//! windows) are scanned ahead of the transaction and the individual rows
//! re-read inside it.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};

use crate::blocks::Block;
use crate::errors::{NodeError, Result, StoreError};
use crate::ledger::{Address, AuthLogEntry};
use crate::names::Name;
use crate::transaction::Transaction;

type SResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

mod keys {
    pub const ADDRESS: &[u8] = b"a:";
    pub const BLOCK: &[u8] = b"b:";
    pub const BLOCK_HASH: &[u8] = b"bh:";
    pub const TX: &[u8] = b"t:";
    pub const TX_ADDR: &[u8] = b"ta:";
    pub const NAME: &[u8] = b"n:";
    pub const AUTH_LOG: &[u8] = b"l:";

    pub const META_LAST_TX_ID: &[u8] = b"m:last_tx_id";
    pub const META_LAST_BLOCK_ID: &[u8] = b"m:last_block_id";

    pub fn address(addr: &str) -> Vec<u8> {
        [ADDRESS, addr.as_bytes()].concat()
    }

    pub fn block(id: u64) -> Vec<u8> {
        [BLOCK, &id.to_be_bytes()[..]].concat()
    }

    pub fn block_hash(hash: &str) -> Vec<u8> {
        [BLOCK_HASH, hash.as_bytes()].concat()
    }

    pub fn tx(id: u64) -> Vec<u8> {
        [TX, &id.to_be_bytes()[..]].concat()
    }

    pub fn tx_addr_prefix(addr: &str) -> Vec<u8> {
        [TX_ADDR, addr.as_bytes(), &[0u8]].concat()
    }

    pub fn tx_addr(addr: &str, id: u64) -> Vec<u8> {
        [TX_ADDR, addr.as_bytes(), &[0u8], &id.to_be_bytes()[..]].concat()
    }

    pub fn name(name: &str) -> Vec<u8> {
        [NAME, name.as_bytes()].concat()
    }

    pub fn auth_log(millis: u64, seq: u32) -> Vec<u8> {
        [AUTH_LOG, &millis.to_be_bytes()[..], &seq.to_be_bytes()[..]].concat()
    }
}

fn enc<T: Serialize>(value: &T) -> SResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn dec<T: DeserializeOwned>(bytes: &[u8]) -> SResult<T> {
    Ok(bincode::deserialize(bytes)?)
}

fn trailing_id(key: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = key.len();
    if n >= 8 {
        buf.copy_from_slice(&key[n - 8..]);
    }
    u64::from_be_bytes(buf)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// sled-backed persistent store.
///
/// Thread safety comes from sled itself: concurrent reads are lock-free
/// and transactions are serializable. Share with `Arc<Store>`.
#[derive(Debug)]
pub struct Store {
    db: sled::Db,
    tree: sled::Tree,
    /// Tie-breaker for auth-log keys landing on the same millisecond.
    log_seq: AtomicU32,
}

impl Store {
    /// Open or create a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> SResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory store that disappears on drop. For tests.
    pub fn open_temporary() -> SResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> SResult<Self> {
        let tree = db.open_tree("ledger")?;
        Ok(Self {
            db,
            tree,
            log_seq: AtomicU32::new(0),
        })
    }

    /// Block until all pending writes are durable.
    pub fn flush(&self) -> SResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn scan_decode<T: DeserializeOwned>(&self, prefix: &[u8]) -> SResult<Vec<T>> {
        let mut out = Vec::new();
        for item in self.tree.scan_prefix(prefix) {
            let (_, value) = item?;
            out.push(dec(&value)?);
        }
        Ok(out)
    }

    fn prefix_count(&self, prefix: &[u8]) -> SResult<usize> {
        let mut n = 0;
        for item in self.tree.scan_prefix(prefix) {
            item?;
            n += 1;
        }
        Ok(n)
    }

    // -- Addresses ----------------------------------------------------------

    pub fn address(&self, addr: &str) -> SResult<Option<Address>> {
        match self.tree.get(keys::address(addr))? {
            Some(bytes) => Ok(Some(dec(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_address(&self, row: &Address) -> SResult<()> {
        self.tree.insert(keys::address(&row.address), enc(row)?)?;
        Ok(())
    }

    /// Every known address, in key order.
    pub fn addresses(&self) -> SResult<Vec<Address>> {
        self.scan_decode(keys::ADDRESS)
    }

    pub fn address_count(&self) -> SResult<usize> {
        self.prefix_count(keys::ADDRESS)
    }

    /// Addresses carrying an outstanding validator penalty.
    pub fn penalized_addresses(&self) -> SResult<Vec<Address>> {
        Ok(self
            .addresses()?
            .into_iter()
            .filter(|a| a.penalty > 0)
            .collect())
    }

    // -- Blocks -------------------------------------------------------------

    pub fn block(&self, id: u64) -> SResult<Option<Block>> {
        match self.tree.get(keys::block(id))? {
            Some(bytes) => Ok(Some(dec(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn block_by_hash(&self, hash: &str) -> SResult<Option<Block>> {
        match self.tree.get(keys::block_hash(hash))? {
            Some(id_bytes) => self.block(trailing_id(&id_bytes)),
            None => Ok(None),
        }
    }

    /// The chain tip: the block with the highest id.
    pub fn latest_block(&self) -> SResult<Option<Block>> {
        match self.tree.scan_prefix(keys::BLOCK).next_back() {
            Some(item) => {
                let (_, value) = item?;
                Ok(Some(dec(&value)?))
            }
            None => Ok(None),
        }
    }

    /// Blocks newest-first with limit/offset paging.
    pub fn blocks_desc(&self, limit: usize, offset: usize) -> SResult<Vec<Block>> {
        let mut out = Vec::with_capacity(limit);
        for item in self.tree.scan_prefix(keys::BLOCK).rev().skip(offset).take(limit) {
            let (_, value) = item?;
            out.push(dec(&value)?);
        }
        Ok(out)
    }

    /// Blocks oldest-first with limit/offset paging.
    pub fn blocks_asc(&self, limit: usize, offset: usize) -> SResult<Vec<Block>> {
        let mut out = Vec::with_capacity(limit);
        for item in self.tree.scan_prefix(keys::BLOCK).skip(offset).take(limit) {
            let (_, value) = item?;
            out.push(dec(&value)?);
        }
        Ok(out)
    }

    pub fn block_count(&self) -> SResult<usize> {
        self.prefix_count(keys::BLOCK)
    }

    // -- Transactions -------------------------------------------------------

    pub fn transaction(&self, id: u64) -> SResult<Option<Transaction>> {
        match self.tree.get(keys::tx(id))? {
            Some(bytes) => Ok(Some(dec(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Paged transaction listing, filtered before paging so limit/offset
    /// apply to the filtered view.
    pub fn transactions_where<F>(
        &self,
        filter: F,
        limit: usize,
        offset: usize,
        newest_first: bool,
    ) -> SResult<(Vec<Transaction>, usize)>
    where
        F: Fn(&Transaction) -> bool,
    {
        let mut matched = 0usize;
        let mut page = Vec::with_capacity(limit);

        let iter = self.tree.scan_prefix(keys::TX);
        let items: Box<dyn Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>> =
            if newest_first {
                Box::new(iter.rev())
            } else {
                Box::new(iter)
            };

        for item in items {
            let (_, value) = item?;
            let tx: Transaction = dec(&value)?;
            if !filter(&tx) {
                continue;
            }
            if matched >= offset && page.len() < limit {
                page.push(tx);
            }
            matched += 1;
        }
        Ok((page, matched))
    }

    pub fn transaction_count(&self) -> SResult<usize> {
        self.prefix_count(keys::TX)
    }

    /// Transactions involving `addr`, newest-first, with the total count
    /// for the address.
    pub fn transactions_of_address(
        &self,
        addr: &str,
        limit: usize,
        offset: usize,
    ) -> SResult<(Vec<Transaction>, usize)> {
        let prefix = keys::tx_addr_prefix(addr);
        let total = self.prefix_count(&prefix)?;

        let mut out = Vec::with_capacity(limit);
        for item in self.tree.scan_prefix(&prefix).rev().skip(offset).take(limit) {
            let (key, _) = item?;
            if let Some(tx) = self.transaction(trailing_id(&key))? {
                out.push(tx);
            }
        }
        Ok((out, total))
    }

    // -- Names --------------------------------------------------------------

    pub fn name(&self, name: &str) -> SResult<Option<Name>> {
        match self.tree.get(keys::name(name))? {
            Some(bytes) => Ok(Some(dec(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_name(&self, row: &Name) -> SResult<()> {
        self.tree.insert(keys::name(&row.name), enc(row)?)?;
        Ok(())
    }

    /// Every registered name, alphabetical (key order).
    pub fn names(&self) -> SResult<Vec<Name>> {
        self.scan_decode(keys::NAME)
    }

    pub fn name_count(&self) -> SResult<usize> {
        self.prefix_count(keys::NAME)
    }

    /// Names still paying out a block bonus.
    pub fn unpaid_names(&self) -> SResult<Vec<Name>> {
        Ok(self.names()?.into_iter().filter(|n| n.unpaid > 0).collect())
    }

    // -- Auth log -----------------------------------------------------------

    pub fn append_auth_log(&self, entry: &AuthLogEntry) -> SResult<()> {
        let millis = entry.time.timestamp_millis().max(0) as u64;
        let seq = self.log_seq.fetch_add(1, Ordering::Relaxed);
        self.tree
            .insert(keys::auth_log(millis, seq), enc(entry)?)?;
        Ok(())
    }

    /// Entries at or after `since`, oldest first.
    pub fn auth_log_since(&self, since: DateTime<Utc>) -> SResult<Vec<AuthLogEntry>> {
        let millis = since.timestamp_millis().max(0) as u64;
        let start = keys::auth_log(millis, 0);
        let end = [keys::AUTH_LOG, &[0xffu8; 12][..]].concat();

        let mut out = Vec::new();
        for item in self.tree.range(start..end) {
            let (_, value) = item?;
            out.push(dec(&value)?);
        }
        Ok(out)
    }

    /// Delete entries strictly older than `cutoff`. Returns how many
    /// were removed.
    pub fn prune_auth_log(&self, cutoff: DateTime<Utc>) -> SResult<usize> {
        let millis = cutoff.timestamp_millis().max(0) as u64;
        let end = keys::auth_log(millis, 0);

        let doomed: Vec<sled::IVec> = self
            .tree
            .range(keys::AUTH_LOG.to_vec()..end)
            .keys()
            .collect::<sled::Result<_>>()?;
        for key in &doomed {
            self.tree.remove(key)?;
        }
        Ok(doomed.len())
    }

    // -- Transactions (ACID) ------------------------------------------------

    /// Run `f` as a serializable store transaction.
    ///
    /// `f` may run more than once on conflict; it must be free of side
    /// effects outside the transactional tree. Typed aborts surface as
    /// the original [`NodeError`]; storage faults as `server_error`.
    pub fn run_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: Fn(&TransactionalTree) -> ConflictableTransactionResult<T, NodeError>,
    {
        self.tree.transaction(f).map_err(|e| match e {
            TransactionError::Abort(node_err) => node_err,
            TransactionError::Storage(sled_err) => NodeError::Store(sled_err.into()),
        })
    }
}

// ---------------------------------------------------------------------------
// Transactional helpers
// ---------------------------------------------------------------------------

fn abort_store<T>(e: StoreError) -> ConflictableTransactionResult<T, NodeError> {
    Err(ConflictableTransactionError::Abort(NodeError::Store(e)))
}

fn tx_enc<T: Serialize>(value: &T) -> ConflictableTransactionResult<Vec<u8>, NodeError> {
    match enc(value) {
        Ok(bytes) => Ok(bytes),
        Err(e) => abort_store(e),
    }
}

fn tx_dec<T: DeserializeOwned>(bytes: &[u8]) -> ConflictableTransactionResult<T, NodeError> {
    match dec(bytes) {
        Ok(v) => Ok(v),
        Err(e) => abort_store(e),
    }
}

/// Read an address row inside a transaction.
pub fn tx_address(
    t: &TransactionalTree,
    addr: &str,
) -> ConflictableTransactionResult<Option<Address>, NodeError> {
    match t.get(keys::address(addr))? {
        Some(bytes) => Ok(Some(tx_dec(&bytes)?)),
        None => Ok(None),
    }
}

/// Write an address row inside a transaction.
pub fn tx_put_address(
    t: &TransactionalTree,
    row: &Address,
) -> ConflictableTransactionResult<(), NodeError> {
    t.insert(keys::address(&row.address), tx_enc(row)?)?;
    Ok(())
}

/// Read a name row inside a transaction.
pub fn tx_name(
    t: &TransactionalTree,
    name: &str,
) -> ConflictableTransactionResult<Option<Name>, NodeError> {
    match t.get(keys::name(name))? {
        Some(bytes) => Ok(Some(tx_dec(&bytes)?)),
        None => Ok(None),
    }
}

/// Write a name row inside a transaction.
pub fn tx_put_name(
    t: &TransactionalTree,
    row: &Name,
) -> ConflictableTransactionResult<(), NodeError> {
    t.insert(keys::name(&row.name), tx_enc(row)?)?;
    Ok(())
}

fn tx_next_counter(
    t: &TransactionalTree,
    key: &[u8],
) -> ConflictableTransactionResult<u64, NodeError> {
    let next = match t.get(key)? {
        Some(bytes) => trailing_id(&bytes) + 1,
        None => 1,
    };
    t.insert(key, &next.to_be_bytes())?;
    Ok(next)
}

/// Allocate the next block id (chain height) inside a transaction.
pub fn tx_next_block_id(t: &TransactionalTree) -> ConflictableTransactionResult<u64, NodeError> {
    tx_next_counter(t, keys::META_LAST_BLOCK_ID)
}

/// Insert a block row and its hash-index entry.
///
/// Aborts with [`NodeError::SolutionDuplicate`] when the hash is already
/// present — this is the at-most-once acceptance guarantee for solutions.
pub fn tx_insert_block(
    t: &TransactionalTree,
    block: &Block,
) -> ConflictableTransactionResult<(), NodeError> {
    if let Some(hash) = &block.hash {
        let hash_key = keys::block_hash(hash);
        if t.get(&hash_key)?.is_some() {
            return Err(ConflictableTransactionError::Abort(
                NodeError::SolutionDuplicate,
            ));
        }
        t.insert(hash_key, &block.id.to_be_bytes())?;
    }
    t.insert(keys::block(block.id), tx_enc(block)?)?;
    Ok(())
}

/// Append a transaction row, assigning its id from the counter and
/// writing the per-address index entries. Returns the stored row.
pub fn tx_append_transaction(
    t: &TransactionalTree,
    template: &Transaction,
) -> ConflictableTransactionResult<Transaction, NodeError> {
    let mut row = template.clone();
    row.id = tx_next_counter(t, keys::META_LAST_TX_ID)?;

    const EMPTY: &[u8] = &[];
    t.insert(keys::tx(row.id), tx_enc(&row)?)?;
    if let Some(from) = &row.from {
        t.insert(keys::tx_addr(from, row.id), EMPTY)?;
    }
    t.insert(keys::tx_addr(&row.to, row.id), EMPTY)?;
    Ok(row)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
