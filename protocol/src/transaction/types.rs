//! Core type definitions for ledger transactions.
//!
//! A [`Transaction`] is one append-only row in the transfer log. The row
//! shape is deliberately wide: plain transfers, block rewards, staking
//! movements, and the three name operations all share it, distinguished
//! by the classification in [`TransactionType`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Pseudo-addresses
// ---------------------------------------------------------------------------

/// `to`/`from` sentinel for staking deposits and withdrawals.
pub const STAKING_ADDRESS: &str = "staking";

/// `to` sentinel for name purchases.
pub const NAME_ADDRESS: &str = "name";

/// `to` sentinel for A-record updates.
pub const A_RECORD_ADDRESS: &str = "a";

// ---------------------------------------------------------------------------
// TransactionType
// ---------------------------------------------------------------------------

/// Classification of a transaction row, derived from its fields rather
/// than stored. Returned in JSON and used for event routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Block reward credit; `from` is null.
    Mined,
    /// Stake deposit or withdrawal.
    Staking,
    /// Name registration (`to = "name"`).
    NamePurchase,
    /// A-record update (`to = "a"`).
    NameARecord,
    /// Name ownership change.
    NameTransfer,
    /// Plain value transfer.
    Transfer,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mined => "mined",
            Self::Staking => "staking",
            Self::NamePurchase => "name_purchase",
            Self::NameARecord => "name_a_record",
            Self::NameTransfer => "name_transfer",
            Self::Transfer => "transfer",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// One row of the append-only transfer log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Auto-incrementing identifier; assignment order is chain order.
    pub id: u64,
    /// Sending address. `None` for mined rewards; the literal
    /// [`STAKING_ADDRESS`] for stake deposits.
    pub from: Option<String>,
    /// Recipient address, or one of the pseudo-addresses.
    pub to: String,
    /// Amount moved, in TST.
    pub value: u64,
    /// Creation time.
    pub time: DateTime<Utc>,
    /// Name involved, for name operations.
    pub name: Option<String>,
    /// Transaction metadata; for A-record updates this carries the new
    /// record value.
    pub op: Option<String>,
    /// Metaname component of the original `metaname@name.tst` payment
    /// target, when the transfer was routed through a name.
    pub sent_metaname: Option<String>,
    /// Name component of the original payment target.
    pub sent_name: Option<String>,
    /// User agent of the submitting client.
    pub useragent: Option<String>,
    /// Origin header of the submitting client.
    pub origin: Option<String>,
}

impl Transaction {
    /// Classify this row per the routing rules.
    pub fn transaction_type(&self) -> TransactionType {
        if self.from.is_none() {
            return TransactionType::Mined;
        }
        if self.from.as_deref() == Some(STAKING_ADDRESS) || self.to == STAKING_ADDRESS {
            return TransactionType::Staking;
        }
        if self.name.is_some() {
            return match self.to.as_str() {
                NAME_ADDRESS => TransactionType::NamePurchase,
                A_RECORD_ADDRESS => TransactionType::NameARecord,
                _ => TransactionType::NameTransfer,
            };
        }
        TransactionType::Transfer
    }

    /// Whether `address` appears on either side of this row.
    pub fn involves(&self, address: &str) -> bool {
        self.from.as_deref() == Some(address) || self.to == address
    }

    /// JSON projection including the derived `type` field.
    pub fn to_json(&self) -> serde_json::Value {
        let mut v = serde_json::to_value(self).unwrap_or_default();
        if let Some(map) = v.as_object_mut() {
            map.insert(
                "type".to_string(),
                serde_json::Value::String(self.transaction_type().to_string()),
            );
        }
        v
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
