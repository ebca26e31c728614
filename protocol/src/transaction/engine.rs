//! # Transaction Engine
//!
//! Atomic value movement. `send` resolves the recipient (a plain
//! address, or a `[metaname@]name.tst` payment target routed to the
//! name's current owner), then `push` performs the whole movement in one
//! store transaction: debit sender, credit-or-create recipient, append
//! the row. The `transaction` event broadcasts only after commit.

use std::sync::Arc;

use chrono::Utc;
use sled::transaction::ConflictableTransactionError;
use tracing::info;

use crate::config::Constants;
use crate::crypto::address::{is_valid_address, is_valid_metadata, parse_name_target};
use crate::errors::{NodeError, Result};
use crate::events::{Event, EventSink};
use crate::ledger::{Address, AddressLedger, RequestMeta};
use crate::storage::db::{tx_address, tx_append_transaction, tx_put_address};
use crate::storage::Store;
use crate::transaction::Transaction;

/// Resolved routing for an outgoing transfer.
struct Routing {
    to: String,
    sent_metaname: Option<String>,
    sent_name: Option<String>,
}

/// The append-only transfer pipeline.
pub struct TransactionEngine {
    store: Arc<Store>,
    constants: Arc<Constants>,
    ledger: Arc<AddressLedger>,
    events: Arc<dyn EventSink>,
}

impl TransactionEngine {
    pub fn new(
        store: Arc<Store>,
        constants: Arc<Constants>,
        ledger: Arc<AddressLedger>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            constants,
            ledger,
            events,
        }
    }

    // -- Queries ------------------------------------------------------------

    pub fn get(&self, id: u64) -> Result<Transaction> {
        self.store
            .transaction(id)?
            .ok_or(NodeError::TransactionNotFound)
    }

    /// Paged listing with optional mined-row exclusion.
    pub fn list(
        &self,
        limit: usize,
        offset: usize,
        newest_first: bool,
        exclude_mined: bool,
    ) -> Result<(Vec<Transaction>, usize)> {
        Ok(self.store.transactions_where(
            |tx| !exclude_mined || tx.from.is_some(),
            limit,
            offset,
            newest_first,
        )?)
    }

    /// Transactions touching one address, newest first.
    pub fn of_address(
        &self,
        address: &str,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Transaction>, usize)> {
        self.ledger.require(address)?;
        Ok(self.store.transactions_of_address(address, limit, offset)?)
    }

    // -- Sending ------------------------------------------------------------

    /// Authenticate and send: the `POST /transactions` operation.
    pub fn send(
        &self,
        req: &RequestMeta,
        private_key: &str,
        to: &str,
        amount: u64,
        metadata: Option<&str>,
    ) -> Result<Transaction> {
        if amount < 1 {
            return Err(NodeError::InvalidParameter("amount".to_string()));
        }
        if let Some(meta) = metadata {
            if meta.len() > 255 {
                return Err(NodeError::LargeParameter("metadata".to_string()));
            }
            if !is_valid_metadata(meta) {
                return Err(NodeError::InvalidParameter("metadata".to_string()));
            }
        }

        let routing = self.resolve_recipient(to)?;
        let sender = self.ledger.authenticate(req, private_key)?;
        if sender.balance < amount {
            return Err(NodeError::InsufficientFunds);
        }

        self.push(req, &sender.address, routing, amount, metadata)
    }

    /// Route a recipient string: name targets go to the name's owner,
    /// anything else must be a literal address.
    fn resolve_recipient(&self, to: &str) -> Result<Routing> {
        if let Some((metaname, name)) = parse_name_target(to, self.constants.name_suffix) {
            let row = self.store.name(&name)?.ok_or(NodeError::NameNotFound)?;
            return Ok(Routing {
                to: row.owner,
                sent_metaname: metaname,
                sent_name: Some(name),
            });
        }

        let to = to.to_lowercase();
        if !is_valid_address(&to, self.constants.address_prefix) {
            return Err(NodeError::InvalidParameter("to".to_string()));
        }
        Ok(Routing {
            to,
            sent_metaname: None,
            sent_name: None,
        })
    }

    /// The atomic transfer: conservation holds or nothing happens.
    fn push(
        &self,
        req: &RequestMeta,
        from: &str,
        routing: Routing,
        amount: u64,
        metadata: Option<&str>,
    ) -> Result<Transaction> {
        let now = Utc::now();
        let row = self.store.run_transaction(|t| {
            let mut sender = match tx_address(t, from)? {
                Some(row) => row,
                None => {
                    return Err(ConflictableTransactionError::Abort(
                        NodeError::AddressNotFound,
                    ))
                }
            };
            if sender.balance < amount {
                return Err(ConflictableTransactionError::Abort(
                    NodeError::InsufficientFunds,
                ));
            }
            sender.balance -= amount;
            sender.totalout += amount;
            tx_put_address(t, &sender)?;

            // Credit (and lazily create) the recipient. Reading after the
            // sender write keeps self-sends consistent.
            let mut recipient = match tx_address(t, &routing.to)? {
                Some(row) => row,
                None => Address::new(&routing.to),
            };
            recipient.balance += amount;
            recipient.totalin += amount;
            tx_put_address(t, &recipient)?;

            tx_append_transaction(
                t,
                &Transaction {
                    id: 0,
                    from: Some(from.to_string()),
                    to: routing.to.clone(),
                    value: amount,
                    time: now,
                    name: None,
                    op: metadata.map(|s| s.to_string()),
                    sent_metaname: routing.sent_metaname.clone(),
                    sent_name: routing.sent_name.clone(),
                    useragent: req.useragent.clone(),
                    origin: req.origin.clone(),
                },
            )
        })?;

        info!(id = row.id, from, to = %row.to, value = amount, "transaction pushed");
        self.events.emit(Event::Transaction {
            transaction: row.clone(),
        });
        Ok(row)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
