//! # Block Engine
//!
//! Block submission end to end: production-mode gating, the PoW/PoS
//! acceptance check, reward computation with the unpaid-name and penalty
//! bonuses, work retargeting, and the per-block decay of both bonus
//! counters — all committed in a single store transaction. The
//! `block_hashes` index turns a lost submission race into
//! `solution_duplicate` rather than a double credit.
//!
//! The engine also owns genesis bootstrap: an empty chain gets block 1
//! with the all-zero hash, which later submissions chain onto via its
//! twelve-zero short hash.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::blocks::pow::{hash_prefix_value, submission_hash};
use crate::blocks::Block;
use crate::config::Constants;
use crate::crypto::address::is_v2_address;
use crate::errors::{NodeError, Result};
use crate::events::{Event, EventSink};
use crate::ledger::{Address, AddressLedger, RequestMeta};
use crate::storage::db::{
    tx_address, tx_append_transaction, tx_insert_block, tx_name, tx_next_block_id, tx_put_address,
    tx_put_name,
};
use crate::storage::{FastState, Store};
use crate::transaction::Transaction;

/// The address credited with the genesis block. Legacy-hex shaped, so it
/// can never collide with a derivable v2 wallet.
const GENESIS_ADDRESS: &str = "0000000000";

/// Result of an accepted submission.
#[derive(Debug, Clone)]
pub struct AcceptedBlock {
    pub block: Block,
    /// The mined reward transaction.
    pub transaction: Transaction,
    /// The retargeted work now in force.
    pub new_work: u64,
}

/// Reward decay forecast for `/work/detailed`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkDecrease {
    /// How much the block value drops at the next decrease.
    pub value: u64,
    /// Blocks until that decrease.
    pub blocks: u64,
    /// Blocks until the name bonus is fully paid out.
    pub reset: u64,
}

/// Detailed work surface for `/work/detailed`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkDetailed {
    pub work: u64,
    /// Names still paying a bonus.
    pub unpaid: u64,
    pub base_value: u64,
    /// Reward the next block will carry.
    pub block_value: u64,
    pub decrease: WorkDecrease,
}

// ---------------------------------------------------------------------------
// BlockEngine
// ---------------------------------------------------------------------------

/// Single writer over the chain tip.
pub struct BlockEngine {
    store: Arc<Store>,
    fast: Arc<FastState>,
    constants: Arc<Constants>,
    ledger: Arc<AddressLedger>,
    events: Arc<dyn EventSink>,
    /// Serializes the validate-and-commit section of submissions.
    submit_lock: Mutex<()>,
}

impl BlockEngine {
    pub fn new(
        store: Arc<Store>,
        fast: Arc<FastState>,
        constants: Arc<Constants>,
        ledger: Arc<AddressLedger>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            fast,
            constants,
            ledger,
            events,
            submit_lock: Mutex::new(()),
        }
    }

    // -- Queries ------------------------------------------------------------

    pub fn get(&self, id: u64) -> Result<Block> {
        self.store.block(id)?.ok_or(NodeError::BlockNotFound)
    }

    pub fn latest(&self) -> Result<Block> {
        self.store.latest_block()?.ok_or(NodeError::BlockNotFound)
    }

    pub fn list_desc(&self, limit: usize, offset: usize) -> Result<(Vec<Block>, usize)> {
        let total = self.store.block_count()?;
        Ok((self.store.blocks_desc(limit, offset)?, total))
    }

    pub fn list_asc(&self, limit: usize, offset: usize) -> Result<(Vec<Block>, usize)> {
        let total = self.store.block_count()?;
        Ok((self.store.blocks_asc(limit, offset)?, total))
    }

    /// Work retarget: pull the threshold toward the value that would
    /// have made the observed interval hit `seconds_per_block`, by
    /// `work_factor` of the gap, clamped to the configured range.
    pub fn retarget(&self, work: u64, seconds: f64) -> u64 {
        let spb = self.constants.seconds_per_block as f64;
        let target = seconds * work as f64 / spb;
        let next = (work as f64 + (target - work as f64) * self.constants.work_factor).round();
        (next.max(0.0) as u64).clamp(self.constants.min_work, self.constants.max_work)
    }

    /// The `/work/detailed` surface: current work, the next block's
    /// reward, and when the name bonus decays.
    pub fn work_detailed(&self) -> Result<WorkDetailed> {
        let unpaid_names = self.store.unpaid_names()?;
        let penalties = self.store.penalized_addresses()?.len() as u64;
        let base_value = match self.store.latest_block()? {
            Some(last) => self.constants.base_block_value(last.id),
            None => self.constants.base_block_value(0),
        };

        let unpaid = unpaid_names.len() as u64;
        let decrease = if unpaid_names.is_empty() {
            WorkDecrease {
                value: 0,
                blocks: 0,
                reset: 0,
            }
        } else {
            let min = unpaid_names.iter().map(|n| n.unpaid).min().unwrap_or(0);
            let max = unpaid_names.iter().map(|n| n.unpaid).max().unwrap_or(0);
            WorkDecrease {
                value: unpaid_names.iter().filter(|n| n.unpaid == min).count() as u64,
                blocks: min,
                reset: max,
            }
        };

        Ok(WorkDetailed {
            work: self.fast.work(),
            unpaid,
            base_value,
            block_value: base_value + unpaid + penalties,
            decrease,
        })
    }

    // -- Genesis ------------------------------------------------------------

    /// Insert the genesis block if the chain is empty. Returns the block
    /// when one was created.
    pub fn ensure_genesis(&self) -> Result<Option<Block>> {
        if self.store.latest_block()?.is_some() {
            self.fast.set_genesis_genned();
            return Ok(None);
        }

        let template = Block {
            id: 0,
            hash: Some("0".repeat(64)),
            address: GENESIS_ADDRESS.to_string(),
            nonce: Vec::new(),
            time: Utc::now(),
            difficulty: self.constants.max_work,
            value: 0,
            useragent: None,
            origin: None,
        };
        let block = self.store.run_transaction(|t| {
            let mut block = template.clone();
            block.id = tx_next_block_id(t)?;
            tx_insert_block(t, &block)?;
            Ok(block)
        })?;

        self.fast.set_genesis_genned();
        info!(id = block.id, "genesis block created");
        Ok(Some(block))
    }

    // -- Submission ---------------------------------------------------------

    /// `POST /submit_block`: the full acceptance pipeline.
    pub fn submit(&self, req: &RequestMeta, address: &str, nonce: &[u8]) -> Result<AcceptedBlock> {
        let _guard = self.submit_lock.lock();

        let mining = self.fast.mining_enabled();
        let staking = self.fast.staking_enabled();
        if !mining && !staking {
            return Err(NodeError::MiningDisabled);
        }

        if !is_v2_address(address, self.constants.address_prefix) {
            return Err(NodeError::InvalidParameter("address".to_string()));
        }
        if nonce.is_empty() {
            return Err(NodeError::MissingParameter("nonce".to_string()));
        }
        if nonce.len() > self.constants.nonce_max_size {
            return Err(NodeError::LargeParameter("nonce".to_string()));
        }

        let last = self
            .store
            .latest_block()?
            .ok_or_else(|| NodeError::ServerError("chain has no genesis block".to_string()))?;

        let hash = submission_hash(address, &last.short_hash(), nonce);
        let work = self.fast.work();
        let leading = hash_prefix_value(&hash);

        let pow_ok = mining && (leading <= work || self.fast.free_nonce_submission());
        let pos_ok = staking && !self.fast.validator().is_empty() && address == self.fast.validator();
        if !(pow_ok || pos_ok) {
            return Err(if staking {
                NodeError::UnselectedValidator
            } else {
                NodeError::SolutionIncorrect
            });
        }

        // Scans cannot run inside the store transaction, so the bonus
        // sets are fixed here; the rows are re-read under the
        // transaction before being decremented.
        let unpaid_names: Vec<String> = self
            .store
            .unpaid_names()?
            .into_iter()
            .map(|n| n.name)
            .collect();
        let penalized: Vec<String> = self
            .store
            .penalized_addresses()?
            .into_iter()
            .map(|a| a.address)
            .collect();

        let value =
            self.constants.base_block_value(last.id) + unpaid_names.len() as u64 + penalized.len() as u64;

        let now = Utc::now();
        let seconds = ((now - last.time).num_milliseconds().max(0) as f64) / 1000.0;
        let new_work = self.retarget(work, seconds);

        let template = Block {
            id: 0,
            hash: Some(hash.clone()),
            address: address.to_string(),
            nonce: nonce.to_vec(),
            time: now,
            difficulty: work,
            value,
            useragent: req.useragent.clone(),
            origin: req.origin.clone(),
        };

        let (block, reward_tx) = self.store.run_transaction(|t| {
            let mut block = template.clone();
            block.id = tx_next_block_id(t)?;
            tx_insert_block(t, &block)?;

            for name in &unpaid_names {
                if let Some(mut row) = tx_name(t, name)? {
                    row.unpaid = row.unpaid.saturating_sub(1);
                    tx_put_name(t, &row)?;
                }
            }
            for addr in &penalized {
                if let Some(mut row) = tx_address(t, addr)? {
                    row.penalty = row.penalty.saturating_sub(1);
                    tx_put_address(t, &row)?;
                }
            }

            let reward_tx = tx_append_transaction(
                t,
                &Transaction {
                    id: 0,
                    from: None,
                    to: address.to_string(),
                    value,
                    time: now,
                    name: None,
                    op: None,
                    sent_metaname: None,
                    sent_name: None,
                    useragent: req.useragent.clone(),
                    origin: req.origin.clone(),
                },
            )?;

            // Credit the miner last so a penalty decrement on the same
            // row composes with the reward.
            let mut miner = match tx_address(t, address)? {
                Some(row) => row,
                None => Address::new(address),
            };
            miner.balance += value;
            miner.totalin += value;
            tx_put_address(t, &miner)?;

            Ok((block, reward_tx))
        })?;

        self.fast.set_work(new_work);
        if pos_ok {
            // The elected validator delivered; the next epoch tick
            // elects fresh without penalizing anyone.
            self.fast.set_validator("");
        }
        if let Err(e) = self.ledger.log_mining(req, address) {
            warn!(error = %e, "failed to record mining auth-log entry");
        }

        info!(
            id = block.id,
            address,
            value,
            new_work,
            pos = pos_ok,
            "block accepted"
        );
        self.events.emit(Event::Block {
            block: block.clone(),
            new_work,
        });
        self.events.emit(Event::Transaction {
            transaction: reward_tx.clone(),
        });

        Ok(AcceptedBlock {
            block,
            transaction: reward_tx,
            new_work,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
