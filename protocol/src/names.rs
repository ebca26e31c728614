//! # Name Registry
//!
//! Human-readable names, purchased for a fixed cost and owned by
//! addresses. A freshly purchased name starts with `unpaid = name_cost`;
//! every produced block pays one unit back to the network by adding 1
//! TST to the block reward and decrementing the counter (the decrement
//! itself lives in the block engine, inside the block's transaction).
//!
//! Names double as payment targets: `[metaname@]name.tst` routes a
//! transfer to the name's current owner. That parsing lives in
//! [`crate::crypto::address`]; this module owns the lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Constants;
use crate::crypto::address::{is_fetchable_name, is_valid_a_record, is_valid_address, is_valid_name, strip_name_suffix};
use crate::errors::{NodeError, Result};
use crate::events::{Event, EventSink};
use crate::ledger::{AddressLedger, RequestMeta};
use crate::storage::db::{tx_address, tx_append_transaction, tx_name, tx_put_address, tx_put_name};
use crate::storage::Store;
use crate::transaction::{Transaction, A_RECORD_ADDRESS, NAME_ADDRESS};

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// One registered name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    pub name: String,
    pub owner: String,
    /// The purchaser; survives transfers.
    pub original_owner: String,
    pub registered: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// The A record, when set.
    pub a: Option<String>,
    /// Remaining block-bonus units this name pays out.
    pub unpaid: u64,
}

// ---------------------------------------------------------------------------
// NameRegistry
// ---------------------------------------------------------------------------

/// Purchase, transfer, and A-record operations plus registry queries.
pub struct NameRegistry {
    store: Arc<Store>,
    constants: Arc<Constants>,
    ledger: Arc<AddressLedger>,
    events: Arc<dyn EventSink>,
}

impl NameRegistry {
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

    /// Normalize a client-supplied name for lookup: lowercase and strip
    /// a trailing `.tst`. Fails with `invalid_parameter` when the result
    /// is not name-shaped (a leading `xn--` is tolerated for lookups).
    pub fn normalize_for_fetch(&self, raw: &str) -> Result<String> {
        let lowered = raw.to_lowercase();
        let stripped = strip_name_suffix(&lowered, self.constants.name_suffix);
        if !is_fetchable_name(stripped) {
            return Err(NodeError::InvalidParameter("name".to_string()));
        }
        Ok(stripped.to_string())
    }

    pub fn get(&self, raw: &str) -> Result<Name> {
        let name = self.normalize_for_fetch(raw)?;
        self.store.name(&name)?.ok_or(NodeError::NameNotFound)
    }

    pub fn is_available(&self, raw: &str) -> Result<bool> {
        let name = self.normalize_for_fetch(raw)?;
        Ok(self.store.name(&name)?.is_none())
    }

    /// All names, alphabetical, paged, with the total count.
    pub fn list(&self, limit: usize, offset: usize) -> Result<(Vec<Name>, usize)> {
        let rows = self.store.names()?;
        let total = rows.len();
        Ok((rows.into_iter().skip(offset).take(limit).collect(), total))
    }

    /// Names owned by one address.
    pub fn names_of(&self, address: &str) -> Result<Vec<Name>> {
        Ok(self
            .store
            .names()?
            .into_iter()
            .filter(|n| n.owner == address)
            .collect())
    }

    pub fn count_of(&self, address: &str) -> Result<u64> {
        Ok(self.names_of(address)?.len() as u64)
    }

    /// The configured purchase cost.
    pub fn cost(&self) -> u64 {
        self.constants.name_cost
    }

    /// The name bonus: how many names currently add 1 TST to each block
    /// reward.
    pub fn bonus(&self) -> Result<u64> {
        Ok(self.store.unpaid_names()?.len() as u64)
    }

    // -- Mutations ----------------------------------------------------------

    /// Purchase `raw` for the wallet behind `private_key`.
    pub fn purchase(&self, req: &RequestMeta, private_key: &str, raw: &str) -> Result<Name> {
        let lowered = raw.to_lowercase();
        let name = strip_name_suffix(&lowered, self.constants.name_suffix).to_string();
        if !is_valid_name(&name) {
            return Err(NodeError::InvalidParameter("name".to_string()));
        }
        if self.store.name(&name)?.is_some() {
            return Err(NodeError::NameTaken);
        }

        let sender = self.ledger.authenticate(req, private_key)?;
        let cost = self.constants.name_cost;
        if sender.balance < cost {
            return Err(NodeError::InsufficientFunds);
        }

        let now = Utc::now();
        let row = Name {
            name: name.clone(),
            owner: sender.address.clone(),
            original_owner: sender.address.clone(),
            registered: now,
            updated: now,
            a: None,
            unpaid: cost,
        };

        let (stored, tx_row) = self.store.run_transaction(|t| {
            // Re-check under the transaction: a racing purchase may have
            // taken the name or spent the funds since the pre-checks.
            if tx_name(t, &name)?.is_some() {
                return Err(sled::transaction::ConflictableTransactionError::Abort(
                    NodeError::NameTaken,
                ));
            }
            let mut payer = match tx_address(t, &sender.address)? {
                Some(row) => row,
                None => {
                    return Err(sled::transaction::ConflictableTransactionError::Abort(
                        NodeError::AddressNotFound,
                    ))
                }
            };
            if payer.balance < cost {
                return Err(sled::transaction::ConflictableTransactionError::Abort(
                    NodeError::InsufficientFunds,
                ));
            }
            payer.balance -= cost;
            payer.totalout += cost;
            tx_put_address(t, &payer)?;
            tx_put_name(t, &row)?;

            let tx_row = tx_append_transaction(
                t,
                &Transaction {
                    id: 0,
                    from: Some(sender.address.clone()),
                    to: NAME_ADDRESS.to_string(),
                    value: cost,
                    time: now,
                    name: Some(name.clone()),
                    op: None,
                    sent_metaname: None,
                    sent_name: None,
                    useragent: req.useragent.clone(),
                    origin: req.origin.clone(),
                },
            )?;
            Ok((row.clone(), tx_row))
        })?;

        info!(name = %stored.name, owner = %stored.owner, "name purchased");
        self.events.emit(Event::Transaction {
            transaction: tx_row,
        });
        self.events.emit(Event::Name {
            name: stored.clone(),
        });
        Ok(stored)
    }

    /// Transfer a name owned by the wallet behind `private_key` to
    /// another address.
    pub fn transfer(
        &self,
        req: &RequestMeta,
        private_key: &str,
        raw: &str,
        to: &str,
    ) -> Result<Name> {
        if !is_valid_address(to, self.constants.address_prefix) {
            return Err(NodeError::InvalidParameter("address".to_string()));
        }
        let name = self.normalize_for_fetch(raw)?;
        let sender = self.ledger.authenticate(req, private_key)?;
        let current = self.store.name(&name)?.ok_or(NodeError::NameNotFound)?;
        if current.owner != sender.address {
            return Err(NodeError::NotNameOwner);
        }

        let now = Utc::now();
        let (stored, tx_row) = self.store.run_transaction(|t| {
            let mut row = match tx_name(t, &name)? {
                Some(row) => row,
                None => {
                    return Err(sled::transaction::ConflictableTransactionError::Abort(
                        NodeError::NameNotFound,
                    ))
                }
            };
            row.owner = to.to_string();
            row.updated = now;
            tx_put_name(t, &row)?;

            let tx_row = tx_append_transaction(
                t,
                &Transaction {
                    id: 0,
                    from: Some(sender.address.clone()),
                    to: to.to_string(),
                    value: 0,
                    time: now,
                    name: Some(name.clone()),
                    op: None,
                    sent_metaname: None,
                    sent_name: None,
                    useragent: req.useragent.clone(),
                    origin: req.origin.clone(),
                },
            )?;
            Ok((row, tx_row))
        })?;

        info!(name = %stored.name, from = %sender.address, to, "name transferred");
        self.events.emit(Event::Transaction {
            transaction: tx_row,
        });
        self.events.emit(Event::Name {
            name: stored.clone(),
        });
        Ok(stored)
    }

    /// Set or clear the A record of a name owned by the wallet behind
    /// `private_key`.
    pub fn update_a_record(
        &self,
        req: &RequestMeta,
        private_key: &str,
        raw: &str,
        a: Option<&str>,
    ) -> Result<Name> {
        let a = a.map(str::trim).filter(|s| !s.is_empty());
        if let Some(record) = a {
            if record.len() > 255 {
                return Err(NodeError::LargeParameter("a".to_string()));
            }
            if !is_valid_a_record(record) {
                return Err(NodeError::InvalidParameter("a".to_string()));
            }
        }

        let name = self.normalize_for_fetch(raw)?;
        let sender = self.ledger.authenticate(req, private_key)?;
        let current = self.store.name(&name)?.ok_or(NodeError::NameNotFound)?;
        if current.owner != sender.address {
            return Err(NodeError::NotNameOwner);
        }

        let now = Utc::now();
        let (stored, tx_row) = self.store.run_transaction(|t| {
            let mut row = match tx_name(t, &name)? {
                Some(row) => row,
                None => {
                    return Err(sled::transaction::ConflictableTransactionError::Abort(
                        NodeError::NameNotFound,
                    ))
                }
            };
            row.a = a.map(|s| s.to_string());
            row.updated = now;
            tx_put_name(t, &row)?;

            let tx_row = tx_append_transaction(
                t,
                &Transaction {
                    id: 0,
                    from: Some(sender.address.clone()),
                    to: A_RECORD_ADDRESS.to_string(),
                    value: 0,
                    time: now,
                    name: Some(name.clone()),
                    op: a.map(|s| s.to_string()),
                    sent_metaname: None,
                    sent_name: None,
                    useragent: req.useragent.clone(),
                    origin: req.origin.clone(),
                },
            )?;
            Ok((row, tx_row))
        })?;

        info!(name = %stored.name, a = ?stored.a, "a record updated");
        self.events.emit(Event::Transaction {
            transaction: tx_row,
        });
        self.events.emit(Event::Name {
            name: stored.clone(),
        });
        Ok(stored)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;
    use crate::transaction::TransactionType;

    struct Setup {
        registry: NameRegistry,
        store: Arc<Store>,
        ledger: Arc<AddressLedger>,
    }

    fn setup() -> Setup {
        let store = Arc::new(Store::open_temporary().unwrap());
        let constants = Arc::new(Constants::default());
        let ledger = Arc::new(AddressLedger::new(
            Arc::clone(&store),
            Arc::clone(&constants),
        ));
        let registry = NameRegistry::new(
            Arc::clone(&store),
            constants,
            Arc::clone(&ledger),
            Arc::new(NullSink),
        );
        Setup {
            registry,
            store,
            ledger,
        }
    }

    fn meta() -> RequestMeta {
        RequestMeta::internal()
    }

    /// Authenticate once (creating the row) and seed it with a balance.
    fn fund(s: &Setup, key: &str, balance: u64) -> String {
        let row = s.ledger.authenticate(&meta(), key).unwrap();
        let mut funded = row.clone();
        funded.balance = balance;
        funded.totalin = balance;
        s.store.put_address(&funded).unwrap();
        row.address
    }

    #[test]
    fn purchase_debits_and_registers() {
        let s = setup();
        let owner = fund(&s, "alice", 1000);

        let name = s.registry.purchase(&meta(), "alice", "example").unwrap();
        assert_eq!(name.owner, owner);
        assert_eq!(name.original_owner, owner);
        assert_eq!(name.unpaid, 500);
        assert_eq!(name.registered, name.updated);

        let row = s.store.address(&owner).unwrap().unwrap();
        assert_eq!(row.balance, 500);
        assert_eq!(row.totalout, 500);

        // One transaction row, classified as a purchase.
        let (txs, total) = s
            .store
            .transactions_where(|_| true, 10, 0, true)
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(txs[0].transaction_type(), TransactionType::NamePurchase);
        assert_eq!(txs[0].value, 500);
        assert_eq!(txs[0].name.as_deref(), Some("example"));
    }

    #[test]
    fn purchase_normalizes_case_and_suffix() {
        let s = setup();
        fund(&s, "alice", 1000);
        let name = s.registry.purchase(&meta(), "alice", "Example.TST").unwrap();
        assert_eq!(name.name, "example");
    }

    #[test]
    fn purchase_rejections() {
        let s = setup();
        fund(&s, "alice", 1000);
        fund(&s, "poor", 10);

        let err = s.registry.purchase(&meta(), "alice", "Bad Name!").unwrap_err();
        assert!(matches!(err, NodeError::InvalidParameter(p) if p == "name"));

        s.registry.purchase(&meta(), "alice", "example").unwrap();
        let err = s.registry.purchase(&meta(), "alice", "example").unwrap_err();
        assert!(matches!(err, NodeError::NameTaken));

        let err = s.registry.purchase(&meta(), "poor", "another").unwrap_err();
        assert!(matches!(err, NodeError::InsufficientFunds));
        // Nothing was charged on the failed purchase.
        let poor = s.ledger.authenticate(&meta(), "poor").unwrap();
        assert_eq!(poor.balance, 10);
    }

    #[test]
    fn transfer_changes_owner_keeps_original() {
        let s = setup();
        let alice = fund(&s, "alice", 1000);
        let bob = fund(&s, "bob", 0);

        s.registry.purchase(&meta(), "alice", "example").unwrap();
        let moved = s
            .registry
            .transfer(&meta(), "alice", "example", &bob)
            .unwrap();
        assert_eq!(moved.owner, bob);
        assert_eq!(moved.original_owner, alice);
        assert!(moved.updated >= moved.registered);

        // Zero-value transaction row with the name attached.
        let (txs, _) = s.store.transactions_where(|_| true, 10, 0, true).unwrap();
        assert_eq!(txs[0].transaction_type(), TransactionType::NameTransfer);
        assert_eq!(txs[0].value, 0);

        // Old owner can no longer transfer it.
        let err = s
            .registry
            .transfer(&meta(), "alice", "example", &alice)
            .unwrap_err();
        assert!(matches!(err, NodeError::NotNameOwner));
    }

    #[test]
    fn a_record_lifecycle() {
        let s = setup();
        fund(&s, "alice", 1000);
        s.registry.purchase(&meta(), "alice", "example").unwrap();

        let updated = s
            .registry
            .update_a_record(&meta(), "alice", "example", Some("host.example.com"))
            .unwrap();
        assert_eq!(updated.a.as_deref(), Some("host.example.com"));

        let (txs, _) = s.store.transactions_where(|_| true, 10, 0, true).unwrap();
        assert_eq!(txs[0].transaction_type(), TransactionType::NameARecord);
        assert_eq!(txs[0].op.as_deref(), Some("host.example.com"));

        // Clearing.
        let cleared = s
            .registry
            .update_a_record(&meta(), "alice", "example", None)
            .unwrap();
        assert_eq!(cleared.a, None);

        // Validation.
        let err = s
            .registry
            .update_a_record(&meta(), "alice", "example", Some(".bad"))
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidParameter(p) if p == "a"));
        let long = "x".repeat(256);
        let err = s
            .registry
            .update_a_record(&meta(), "alice", "example", Some(&long))
            .unwrap_err();
        assert!(matches!(err, NodeError::LargeParameter(p) if p == "a"));
    }

    #[test]
    fn queries() {
        let s = setup();
        let alice = fund(&s, "alice", 5000);
        for name in ["delta", "alpha", "charlie"] {
            s.registry.purchase(&meta(), "alice", name).unwrap();
        }

        assert_eq!(s.registry.cost(), 500);
        assert_eq!(s.registry.bonus().unwrap(), 3);
        assert_eq!(s.registry.count_of(&alice).unwrap(), 3);

        let (page, total) = s.registry.list(2, 0).unwrap();
        assert_eq!(total, 3);
        assert_eq!(page[0].name, "alpha");
        assert_eq!(page[1].name, "charlie");

        assert!(s.registry.is_available("newname").unwrap());
        assert!(!s.registry.is_available("alpha.tst").unwrap());

        let fetched = s.registry.get("ALPHA.tst").unwrap();
        assert_eq!(fetched.name, "alpha");
        assert!(matches!(
            s.registry.get("missing").unwrap_err(),
            NodeError::NameNotFound
        ));
    }
}
