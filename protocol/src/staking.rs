//! # Staking Engine
//!
//! The proof-of-stake state machine: deposits move balance into stake,
//! withdrawals move it back, and a per-epoch tick elects the next
//! validator by weighted lottery over the active stakes. A validator
//! that lets its epoch lapse without producing a block is penalized —
//! stake moves into the `penalty` counter, which then pays back out
//! through block rewards (see the block engine's decay pass).
//!
//! Stake movements are ledger transactions like everything else: a
//! deposit emits a `staking`-typed row from the `staking`
//! pseudo-address, a withdrawal one toward it.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use sled::transaction::ConflictableTransactionError;
use tracing::{debug, info};

use crate::config::Constants;
use crate::errors::{NodeError, Result};
use crate::events::{Event, EventSink};
use crate::ledger::{Address, AddressLedger, RequestMeta};
use crate::storage::db::{tx_address, tx_append_transaction, tx_put_address};
use crate::storage::{FastState, Store};
use crate::transaction::{Transaction, STAKING_ADDRESS};

/// Public JSON shape of one stake.
pub fn stake_json(row: &Address) -> serde_json::Value {
    serde_json::json!({
        "owner": row.address,
        "stake": row.stake,
        "active": row.stake_active,
    })
}

/// Deposits, withdrawals, penalties, and the validator lottery.
pub struct StakingEngine {
    store: Arc<Store>,
    fast: Arc<FastState>,
    constants: Arc<Constants>,
    ledger: Arc<AddressLedger>,
    events: Arc<dyn EventSink>,
}

impl StakingEngine {
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
        }
    }

    // -- Queries ------------------------------------------------------------

    /// All non-zero stakes, largest first.
    pub fn list(&self, limit: usize, offset: usize) -> Result<(Vec<Address>, usize)> {
        let mut rows: Vec<Address> = self
            .store
            .addresses()?
            .into_iter()
            .filter(|a| a.stake > 0)
            .collect();
        rows.sort_by(|a, b| b.stake.cmp(&a.stake).then(a.address.cmp(&b.address)));
        let total = rows.len();
        Ok((rows.into_iter().skip(offset).take(limit).collect(), total))
    }

    /// Stake of a single address.
    pub fn get(&self, address: &str) -> Result<Address> {
        self.ledger.require(address)
    }

    /// Addresses still holding an outstanding penalty.
    pub fn penalties(&self) -> Result<Vec<Address>> {
        let mut rows = self.store.penalized_addresses()?;
        rows.sort_by(|a, b| b.penalty.cmp(&a.penalty).then(a.address.cmp(&b.address)));
        Ok(rows)
    }

    /// The currently elected validator; empty when none.
    pub fn validator(&self) -> String {
        self.fast.validator()
    }

    // -- Mutations ----------------------------------------------------------

    /// Move spendable balance into stake and activate it.
    pub fn deposit(&self, req: &RequestMeta, private_key: &str, amount: u64) -> Result<Address> {
        if amount < 1 {
            return Err(NodeError::InvalidParameter("amount".to_string()));
        }
        let sender = self.ledger.authenticate(req, private_key)?;
        if sender.balance < amount {
            return Err(NodeError::InsufficientFunds);
        }

        let now = Utc::now();
        let row = self.store.run_transaction(|t| {
            let mut row = match tx_address(t, &sender.address)? {
                Some(row) => row,
                None => {
                    return Err(ConflictableTransactionError::Abort(
                        NodeError::AddressNotFound,
                    ))
                }
            };
            if row.balance < amount {
                return Err(ConflictableTransactionError::Abort(
                    NodeError::InsufficientFunds,
                ));
            }
            row.balance -= amount;
            row.stake += amount;
            row.stake_active = true;
            tx_put_address(t, &row)?;

            tx_append_transaction(
                t,
                &Transaction {
                    id: 0,
                    from: Some(STAKING_ADDRESS.to_string()),
                    to: sender.address.clone(),
                    value: amount,
                    time: now,
                    name: None,
                    op: None,
                    sent_metaname: None,
                    sent_name: None,
                    useragent: req.useragent.clone(),
                    origin: req.origin.clone(),
                },
            )?;
            Ok(row)
        })?;

        info!(address = %row.address, amount, stake = row.stake, "stake deposited");
        self.emit_stake(&row);
        Ok(row)
    }

    /// Move stake back into spendable balance. The stake deactivates
    /// when it reaches zero.
    pub fn withdraw(&self, req: &RequestMeta, private_key: &str, amount: u64) -> Result<Address> {
        if amount < 1 {
            return Err(NodeError::InvalidParameter("amount".to_string()));
        }
        let sender = self.ledger.authenticate(req, private_key)?;
        if sender.stake < amount {
            return Err(NodeError::InsufficientFunds);
        }

        let now = Utc::now();
        let row = self.store.run_transaction(|t| {
            let mut row = match tx_address(t, &sender.address)? {
                Some(row) => row,
                None => {
                    return Err(ConflictableTransactionError::Abort(
                        NodeError::AddressNotFound,
                    ))
                }
            };
            if row.stake < amount {
                return Err(ConflictableTransactionError::Abort(
                    NodeError::InsufficientFunds,
                ));
            }
            row.stake -= amount;
            row.balance += amount;
            row.stake_active = row.stake > 0;
            tx_put_address(t, &row)?;

            tx_append_transaction(
                t,
                &Transaction {
                    id: 0,
                    from: Some(sender.address.clone()),
                    to: STAKING_ADDRESS.to_string(),
                    value: amount,
                    time: now,
                    name: None,
                    op: None,
                    sent_metaname: None,
                    sent_name: None,
                    useragent: req.useragent.clone(),
                    origin: req.origin.clone(),
                },
            )?;
            Ok(row)
        })?;

        info!(address = %row.address, amount, stake = row.stake, "stake withdrawn");
        self.emit_stake(&row);
        Ok(row)
    }

    /// Confiscate up to `validator_penalty` from a staker and deactivate
    /// it. No-op for unknown addresses.
    pub fn penalize(&self, address: &str) -> Result<Option<Address>> {
        let penalty_cap = self.constants.validator_penalty;
        let row = self.store.run_transaction(|t| {
            let mut row = match tx_address(t, address)? {
                Some(row) => row,
                None => return Ok(None),
            };
            let p = penalty_cap.min(row.stake);
            row.stake -= p;
            row.penalty += p;
            row.stake_active = false;
            tx_put_address(t, &row)?;
            Ok(Some(row))
        })?;

        if let Some(row) = &row {
            info!(address, penalty = row.penalty, stake = row.stake, "validator penalized");
            self.emit_stake(row);
        }
        Ok(row)
    }

    // -- Validator election -------------------------------------------------

    /// One epoch tick: penalize a validator that failed to deliver, then
    /// elect the next one by stake-weighted lottery.
    pub fn run_validator_tick(&self) -> Result<String> {
        let previous = self.fast.validator();
        if !previous.is_empty() {
            self.penalize(&previous)?;
        }

        let candidates: Vec<(String, u64)> = self
            .store
            .addresses()?
            .into_iter()
            .filter(|a| a.stake > 0 && a.stake_active)
            .map(|a| (a.address, a.stake))
            .collect();

        let total: u64 = candidates.iter().map(|(_, stake)| stake).sum();
        let chosen = if total > 0 {
            let draw = rand::thread_rng().gen_range(0..total);
            select_by_draw(&candidates, draw)
                .unwrap_or_default()
                .to_string()
        } else {
            String::new()
        };

        self.fast.set_validator(&chosen);
        debug!(validator = %chosen, candidates = candidates.len(), total, "validator elected");
        self.events.emit(Event::Validator {
            validator: chosen.clone(),
        });
        Ok(chosen)
    }

    fn emit_stake(&self, row: &Address) {
        self.events.emit(Event::Stake {
            owner: row.address.clone(),
            stake: row.stake,
            stake_active: row.stake_active,
        });
    }
}

/// Pick the first candidate whose cumulative stake strictly exceeds the
/// draw. Equal boundaries resolve to the earlier entry.
fn select_by_draw(candidates: &[(String, u64)], draw: u64) -> Option<&str> {
    let mut cumulative = 0u64;
    for (address, stake) in candidates {
        cumulative += stake;
        if cumulative > draw {
            return Some(address);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
