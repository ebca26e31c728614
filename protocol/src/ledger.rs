//! # Address Ledger
//!
//! Address rows and the wallet authentication contract. Addresses are
//! created lazily — the first credit or the first successful auth brings
//! the row into existence — and never destroyed. Balance fields are only
//! ever mutated by the transaction, block, and staking engines inside
//! their store transactions; this module deliberately exposes no raw
//! balance setter.
//!
//! ## Authentication
//!
//! A wallet proves ownership of an address with
//! `sha256(address || privatekey)`. The first proof ever seen for an
//! address is adopted as its credential (covering both brand-new rows
//! and legacy rows that predate the scheme); afterwards the digest must
//! match and the row must not be locked. Every attempt — success,
//! failure, and mining use — lands in the auth log, dedup-suppressed per
//! `(ip, address, type)` within a 30-minute window and pruned after 30
//! days.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Constants, AUTH_LOG_DEDUP_MINUTES, AUTH_LOG_RETENTION_DAYS};
use crate::crypto::address::{auth_digest, make_v2_address};
use crate::errors::{NodeError, Result};
use crate::storage::Store;

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// One address row: balances, staking state, and the auth credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub address: String,
    /// Spendable balance in TST.
    pub balance: u64,
    /// Lifetime credited total.
    pub totalin: u64,
    /// Lifetime debited total.
    pub totalout: u64,
    /// Currently staked amount.
    pub stake: u64,
    /// Accumulated validator penalty still paying out as block bonus.
    pub penalty: u64,
    /// Whether the stake participates in the validator lottery.
    pub stake_active: bool,
    /// Locked addresses fail authentication unconditionally.
    pub locked: bool,
    /// `sha256(address || privatekey)` of the owning wallet, once seen.
    pub privatekey_hash: Option<String>,
    pub firstseen: DateTime<Utc>,
}

impl Address {
    /// A zeroed row for a lazily created address.
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            balance: 0,
            totalin: 0,
            totalout: 0,
            stake: 0,
            penalty: 0,
            stake_active: false,
            locked: false,
            privatekey_hash: None,
            firstseen: Utc::now(),
        }
    }

    /// Public JSON projection. The auth credential and lock flag never
    /// leave the node.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "address": self.address,
            "balance": self.balance,
            "totalin": self.totalin,
            "totalout": self.totalout,
            "stake": self.stake,
            "penalty": self.penalty,
            "stake_active": self.stake_active,
            "firstseen": self.firstseen.to_rfc3339(),
        })
    }

    /// Like [`to_json`](Self::to_json) with the owned-name count joined
    /// in (the `fetchNames` query option).
    pub fn to_json_with_names(&self, names: u64) -> serde_json::Value {
        let mut v = self.to_json();
        if let Some(map) = v.as_object_mut() {
            map.insert("names".to_string(), serde_json::json!(names));
        }
        v
    }
}

/// Auth-log entry category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthLogType {
    Auth,
    Mining,
}

/// One auth-log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthLogEntry {
    pub ip: String,
    pub address: String,
    pub time: DateTime<Utc>,
    pub log_type: AuthLogType,
    pub useragent: Option<String>,
    pub origin: Option<String>,
}

/// Client context threaded through every authenticated operation, used
/// for the auth log and the provenance columns on blocks and
/// transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub ip: String,
    pub useragent: Option<String>,
    pub origin: Option<String>,
}

impl RequestMeta {
    /// Context for internally originated operations (ticks, tests).
    pub fn internal() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            useragent: None,
            origin: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AddressLedger
// ---------------------------------------------------------------------------

/// Query and authentication surface over address rows.
pub struct AddressLedger {
    store: Arc<Store>,
    constants: Arc<Constants>,
}

impl AddressLedger {
    pub fn new(store: Arc<Store>, constants: Arc<Constants>) -> Self {
        Self { store, constants }
    }

    pub fn get(&self, address: &str) -> Result<Option<Address>> {
        Ok(self.store.address(address)?)
    }

    /// Fetch a row or fail with `address_not_found`.
    pub fn require(&self, address: &str) -> Result<Address> {
        self.get(address)?.ok_or(NodeError::AddressNotFound)
    }

    /// All addresses ordered by first appearance, paged, with the total.
    pub fn list(&self, limit: usize, offset: usize) -> Result<(Vec<Address>, usize)> {
        let mut rows = self.store.addresses()?;
        rows.sort_by(|a, b| a.firstseen.cmp(&b.firstseen).then(a.address.cmp(&b.address)));
        let total = rows.len();
        Ok((rows.into_iter().skip(offset).take(limit).collect(), total))
    }

    /// Addresses ordered by balance, richest first.
    pub fn rich(&self, limit: usize, offset: usize) -> Result<(Vec<Address>, usize)> {
        let mut rows = self.store.addresses()?;
        rows.sort_by(|a, b| b.balance.cmp(&a.balance).then(a.address.cmp(&b.address)));
        let total = rows.len();
        Ok((rows.into_iter().skip(offset).take(limit).collect(), total))
    }

    // -- Authentication -----------------------------------------------------

    /// The auth contract: returns whether the proof was accepted and
    /// the (possibly just-created) row.
    pub fn verify(
        &self,
        req: &RequestMeta,
        address: &str,
        private_key: &str,
    ) -> Result<(bool, Address)> {
        let digest = auth_digest(address, private_key);
        let outcome = match self.store.address(address)? {
            None => {
                let mut row = Address::new(address);
                row.privatekey_hash = Some(digest);
                self.store.put_address(&row)?;
                debug!(address, "address created on first auth");
                (true, row)
            }
            Some(mut row) => match &row.privatekey_hash {
                None => {
                    row.privatekey_hash = Some(digest);
                    self.store.put_address(&row)?;
                    debug!(address, "adopted credential for legacy address");
                    (true, row)
                }
                Some(stored) => {
                    let authed = !row.locked && *stored == digest;
                    (authed, row)
                }
            },
        };

        self.log(req, address, AuthLogType::Auth)?;
        Ok(outcome)
    }

    /// Derive the v2 address for `private_key` and verify it. Fails with
    /// `auth_failed` when the proof is rejected.
    pub fn authenticate(&self, req: &RequestMeta, private_key: &str) -> Result<Address> {
        let address = make_v2_address(private_key, self.constants.address_prefix);
        let (authed, row) = self.verify(req, &address, private_key)?;
        if authed {
            Ok(row)
        } else {
            Err(NodeError::AuthFailed)
        }
    }

    /// Record a mining-type auth-log entry for a block submission.
    pub fn log_mining(&self, req: &RequestMeta, address: &str) -> Result<()> {
        self.log(req, address, AuthLogType::Mining)
    }

    fn log(&self, req: &RequestMeta, address: &str, log_type: AuthLogType) -> Result<()> {
        let window = Utc::now() - Duration::minutes(AUTH_LOG_DEDUP_MINUTES);
        let recent = self.store.auth_log_since(window)?;
        let duplicate = recent.iter().any(|e| {
            e.ip == req.ip && e.address == address && e.log_type == log_type
        });
        if duplicate {
            return Ok(());
        }

        self.store.append_auth_log(&AuthLogEntry {
            ip: req.ip.clone(),
            address: address.to_string(),
            time: Utc::now(),
            log_type,
            useragent: req.useragent.clone(),
            origin: req.origin.clone(),
        })?;
        Ok(())
    }

    /// Drop auth-log entries past the retention window. Returns the
    /// number removed; the hourly tick calls this.
    pub fn prune_auth_log(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(AUTH_LOG_RETENTION_DAYS);
        Ok(self.store.prune_auth_log(cutoff)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> AddressLedger {
        let store = Arc::new(Store::open_temporary().unwrap());
        AddressLedger::new(store, Arc::new(Constants::default()))
    }

    fn meta() -> RequestMeta {
        RequestMeta {
            ip: "10.0.0.1".into(),
            useragent: Some("test-wallet/1.0".into()),
            origin: None,
        }
    }

    #[test]
    fn first_auth_creates_row() {
        let ledger = ledger();
        let (authed, row) = ledger.verify(&meta(), "taaaaaaaaa", "secret").unwrap();
        assert!(authed);
        assert_eq!(row.balance, 0);
        assert_eq!(row.totalin, 0);
        assert_eq!(row.totalout, 0);
        assert!(row.privatekey_hash.is_some());

        // The row persisted.
        assert!(ledger.get("taaaaaaaaa").unwrap().is_some());
    }

    #[test]
    fn second_auth_checks_digest() {
        let ledger = ledger();
        ledger.verify(&meta(), "taaaaaaaaa", "secret").unwrap();

        let (ok, _) = ledger.verify(&meta(), "taaaaaaaaa", "secret").unwrap();
        assert!(ok);
        let (bad, _) = ledger.verify(&meta(), "taaaaaaaaa", "wrong").unwrap();
        assert!(!bad);
    }

    #[test]
    fn null_credential_is_adopted() {
        let ledger = ledger();
        // A row credited before ever authenticating has no credential.
        ledger.store.put_address(&Address::new("taaaaaaaaa")).unwrap();

        let (ok, row) = ledger.verify(&meta(), "taaaaaaaaa", "late-key").unwrap();
        assert!(ok);
        assert!(row.privatekey_hash.is_some());

        // And from then on the adopted key is enforced.
        let (bad, _) = ledger.verify(&meta(), "taaaaaaaaa", "other").unwrap();
        assert!(!bad);
    }

    #[test]
    fn locked_address_never_authenticates() {
        let ledger = ledger();
        ledger.verify(&meta(), "taaaaaaaaa", "secret").unwrap();

        let mut row = ledger.get("taaaaaaaaa").unwrap().unwrap();
        row.locked = true;
        ledger.store.put_address(&row).unwrap();

        let (ok, _) = ledger.verify(&meta(), "taaaaaaaaa", "secret").unwrap();
        assert!(!ok);
    }

    #[test]
    fn authenticate_derives_and_accepts() {
        let ledger = ledger();
        let row = ledger.authenticate(&meta(), "test").unwrap();
        assert!(row.address.starts_with('t'));
        assert_eq!(row.address.len(), 10);

        // Same key, same address, still accepted.
        let again = ledger.authenticate(&meta(), "test").unwrap();
        assert_eq!(row.address, again.address);
    }

    #[test]
    fn authenticate_rejects_wrong_key_for_claimed_row() {
        let ledger = ledger();
        let row = ledger.authenticate(&meta(), "test").unwrap();

        // Force a credential mismatch onto the derived address row.
        let mut tampered = row.clone();
        tampered.privatekey_hash = Some("0".repeat(64));
        ledger.store.put_address(&tampered).unwrap();

        let err = ledger.authenticate(&meta(), "test").unwrap_err();
        assert!(matches!(err, NodeError::AuthFailed));
    }

    #[test]
    fn auth_attempts_are_logged_with_dedup() {
        let ledger = ledger();
        let since = Utc::now() - Duration::minutes(1);

        ledger.verify(&meta(), "taaaaaaaaa", "secret").unwrap();
        ledger.verify(&meta(), "taaaaaaaaa", "secret").unwrap();
        ledger.verify(&meta(), "taaaaaaaaa", "wrong").unwrap();
        assert_eq!(ledger.store.auth_log_since(since).unwrap().len(), 1);

        // A different ip is its own dedup bucket.
        let other = RequestMeta {
            ip: "10.0.0.2".into(),
            ..meta()
        };
        ledger.verify(&other, "taaaaaaaaa", "secret").unwrap();
        assert_eq!(ledger.store.auth_log_since(since).unwrap().len(), 2);

        // Mining entries are a separate type and log alongside auth.
        ledger.log_mining(&meta(), "taaaaaaaaa").unwrap();
        assert_eq!(ledger.store.auth_log_since(since).unwrap().len(), 3);
    }

    #[test]
    fn listing_orders() {
        let ledger = ledger();
        let mut a = Address::new("taaaaaaaaa");
        a.balance = 5;
        let mut b = Address::new("tbbbbbbbbb");
        b.balance = 50;
        b.firstseen = a.firstseen + Duration::seconds(1);
        ledger.store.put_address(&a).unwrap();
        ledger.store.put_address(&b).unwrap();

        let (by_age, total) = ledger.list(10, 0).unwrap();
        assert_eq!(total, 2);
        assert_eq!(by_age[0].address, "taaaaaaaaa");

        let (by_balance, _) = ledger.rich(10, 0).unwrap();
        assert_eq!(by_balance[0].address, "tbbbbbbbbb");

        let (paged, _) = ledger.list(1, 1).unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].address, "tbbbbbbbbb");
    }

    #[test]
    fn json_projection_hides_credentials() {
        let mut row = Address::new("taaaaaaaaa");
        row.privatekey_hash = Some("deadbeef".into());
        let v = row.to_json();
        assert!(v.get("privatekey_hash").is_none());
        assert!(v.get("locked").is_none());
        assert_eq!(v["address"], "taaaaaaaaa");

        let with_names = row.to_json_with_names(3);
        assert_eq!(with_names["names"], 3);
    }
}
