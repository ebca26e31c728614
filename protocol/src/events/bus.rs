//! # Event Bus Interface
//!
//! Typed events emitted by the engines after each committed operation,
//! and the category vocabulary sessions subscribe with. The engines
//! depend only on [`EventSink`]; delivery, filtering, and slow-consumer
//! handling live in [`super::sessions`].

use serde::{Deserialize, Serialize};

use crate::blocks::Block;
use crate::names::Name;
use crate::transaction::Transaction;

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Subscription categories a session can hold.
///
/// `OwnTransactions` is the filtered sibling of `Transactions`: it only
/// delivers rows where the session's authenticated address appears on
/// either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    Blocks,
    Transactions,
    Names,
    OwnTransactions,
    Stake,
    Validator,
}

impl EventCategory {
    pub const ALL: [EventCategory; 6] = [
        EventCategory::Blocks,
        EventCategory::Transactions,
        EventCategory::Names,
        EventCategory::OwnTransactions,
        EventCategory::Stake,
        EventCategory::Validator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::Transactions => "transactions",
            Self::Names => "names",
            Self::OwnTransactions => "ownTransactions",
            Self::Stake => "stake",
            Self::Validator => "validator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == s)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A state change worth telling subscribers about.
#[derive(Debug, Clone)]
pub enum Event {
    /// A block was accepted; `new_work` is the retargeted threshold.
    Block { block: Block, new_work: u64 },
    /// A transaction row was committed (any type).
    Transaction { transaction: Transaction },
    /// A name was purchased, transferred, or had its record updated.
    Name { name: Name },
    /// An address's stake changed (deposit, withdrawal, or penalty).
    Stake {
        owner: String,
        stake: u64,
        stake_active: bool,
    },
    /// A validator was elected for the new epoch (empty = none).
    Validator { validator: String },
}

impl Event {
    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Block { .. } => "block",
            Self::Transaction { .. } => "transaction",
            Self::Name { .. } => "name",
            Self::Stake { .. } => "stake",
            Self::Validator { .. } => "validator",
        }
    }

    /// The subscription categories this event matches. Transactions
    /// match both the firehose category and the per-address one.
    pub fn categories(&self) -> &'static [EventCategory] {
        match self {
            Self::Block { .. } => &[EventCategory::Blocks],
            Self::Transaction { .. } => {
                &[EventCategory::Transactions, EventCategory::OwnTransactions]
            }
            Self::Name { .. } => &[EventCategory::Names],
            Self::Stake { .. } => &[EventCategory::Stake],
            Self::Validator { .. } => &[EventCategory::Validator],
        }
    }

    /// The full server-push message for this event.
    pub fn to_message(&self) -> serde_json::Value {
        let mut msg = serde_json::json!({
            "type": "event",
            "event": self.kind(),
        });
        let map = msg.as_object_mut().expect("object literal");
        match self {
            Self::Block { block, new_work } => {
                map.insert("block".into(), block.to_json());
                map.insert("new_work".into(), serde_json::json!(new_work));
            }
            Self::Transaction { transaction } => {
                map.insert("transaction".into(), transaction.to_json());
            }
            Self::Name { name } => {
                map.insert(
                    "name".into(),
                    serde_json::to_value(name).unwrap_or_default(),
                );
            }
            Self::Stake {
                owner,
                stake,
                stake_active,
            } => {
                map.insert(
                    "stake".into(),
                    serde_json::json!({
                        "owner": owner,
                        "stake": stake,
                        "active": stake_active,
                    }),
                );
            }
            Self::Validator { validator } => {
                map.insert("validator".into(), serde_json::json!(validator));
            }
        }
        msg
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// The seam between engines and the session layer. Implementations must
/// never block: emitting happens on the hot path right after commit.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Sink that drops everything. For tests and headless tools.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn category_names_roundtrip() {
        for c in EventCategory::ALL {
            assert_eq!(EventCategory::parse(c.as_str()), Some(c));
        }
        assert_eq!(EventCategory::parse("ownTransactions"), Some(EventCategory::OwnTransactions));
        assert_eq!(EventCategory::parse("nonsense"), None);
    }

    #[test]
    fn transaction_event_matches_both_categories() {
        let event = Event::Transaction {
            transaction: Transaction {
                id: 1,
                from: Some("taaaaaaaaa".into()),
                to: "tbbbbbbbbb".into(),
                value: 5,
                time: Utc::now(),
                name: None,
                op: None,
                sent_metaname: None,
                sent_name: None,
                useragent: None,
                origin: None,
            },
        };
        assert_eq!(
            event.categories(),
            &[EventCategory::Transactions, EventCategory::OwnTransactions]
        );
        let msg = event.to_message();
        assert_eq!(msg["type"], "event");
        assert_eq!(msg["event"], "transaction");
        assert_eq!(msg["transaction"]["type"], "transfer");
    }

    #[test]
    fn stake_event_payload() {
        let msg = Event::Stake {
            owner: "taaaaaaaaa".into(),
            stake: 400,
            stake_active: true,
        }
        .to_message();
        assert_eq!(msg["event"], "stake");
        assert_eq!(msg["stake"]["owner"], "taaaaaaaaa");
        assert_eq!(msg["stake"]["stake"], 400);
        assert_eq!(msg["stake"]["active"], true);
    }

    #[test]
    fn validator_event_payload() {
        let msg = Event::Validator {
            validator: "taaaaaaaaa".into(),
        }
        .to_message();
        assert_eq!(msg["event"], "validator");
        assert_eq!(msg["validator"], "taaaaaaaaa");
    }
}
