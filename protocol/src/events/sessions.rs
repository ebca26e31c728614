//! # Session Registry
//!
//! Connected WebSocket clients as the kernel sees them: an optional
//! authenticated address, a subscription set, and a bounded outbox the
//! transport drains. The registry is the [`EventSink`] the engines emit
//! into; `broadcast` walks the sessions, applies the per-category and
//! `ownTransactions` filters, and drops (with a log line) rather than
//! blocks when a consumer has fallen behind.
//!
//! Connections begin with a single-use token issued over HTTP. The token
//! carries the pre-authenticated address (when a private key was given)
//! and expires after thirty seconds unclaimed.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{SESSION_OUTBOX_CAPACITY, WS_TOKEN_TTL_SECS};
use crate::errors::{NodeError, Result};
use crate::events::bus::{Event, EventCategory, EventSink};
use crate::ledger::RequestMeta;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One live connection.
pub struct Session {
    pub id: Uuid,
    /// Authenticated address; `None` for guests. Swapped atomically by
    /// the `login`/`logout` handlers.
    address: RwLock<Option<String>>,
    subscriptions: RwLock<HashSet<EventCategory>>,
    outbox: mpsc::Sender<String>,
    /// Connection context, reused for every operation the session runs.
    pub meta: RequestMeta,
}

impl Session {
    pub fn address(&self) -> Option<String> {
        self.address.read().clone()
    }

    pub fn set_address(&self, address: Option<String>) {
        *self.address.write() = address;
    }

    pub fn is_guest(&self) -> bool {
        self.address.read().is_none()
    }

    pub fn subscribe(&self, category: EventCategory) {
        self.subscriptions.write().insert(category);
    }

    pub fn unsubscribe(&self, category: EventCategory) {
        self.subscriptions.write().remove(&category);
    }

    /// Current subscription names, sorted for stable output.
    pub fn subscription_level(&self) -> Vec<&'static str> {
        let mut level: Vec<&'static str> = self
            .subscriptions
            .read()
            .iter()
            .map(|c| c.as_str())
            .collect();
        level.sort_unstable();
        level
    }

    fn wants(&self, event: &Event) -> bool {
        let subs = self.subscriptions.read();
        match event {
            Event::Transaction { transaction } => {
                if subs.contains(&EventCategory::Transactions) {
                    return true;
                }
                if subs.contains(&EventCategory::OwnTransactions) {
                    if let Some(address) = self.address.read().as_deref() {
                        return transaction.involves(address);
                    }
                }
                false
            }
            other => other
                .categories()
                .iter()
                .any(|category| subs.contains(category)),
        }
    }

    /// Non-blocking delivery; returns whether the message was queued.
    fn try_deliver(&self, payload: &str) -> bool {
        self.outbox.try_send(payload.to_string()).is_ok()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct PendingSession {
    address: Option<String>,
    issued: DateTime<Utc>,
}

/// All live sessions plus the unclaimed connection tokens.
pub struct SessionRegistry {
    sessions: DashMap<Uuid, std::sync::Arc<Session>>,
    tokens: DashMap<Uuid, PendingSession>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            tokens: DashMap::new(),
        }
    }

    /// Issue a single-use connection token, optionally pre-authenticated.
    pub fn issue_token(&self, address: Option<String>) -> Uuid {
        // Expired leftovers go away whenever a new token is cut.
        let deadline = Utc::now() - Duration::seconds(WS_TOKEN_TTL_SECS);
        self.tokens.retain(|_, pending| pending.issued > deadline);

        let token = Uuid::new_v4();
        self.tokens.insert(
            token,
            PendingSession {
                address,
                issued: Utc::now(),
            },
        );
        token
    }

    /// Redeem a token. Tokens are single-use and expire after
    /// [`WS_TOKEN_TTL_SECS`]; both failures surface as `invalid_token`.
    pub fn claim_token(&self, token: &Uuid) -> Result<Option<String>> {
        let (_, pending) = self
            .tokens
            .remove(token)
            .ok_or(NodeError::InvalidToken)?;
        if Utc::now() - pending.issued > Duration::seconds(WS_TOKEN_TTL_SECS) {
            return Err(NodeError::InvalidToken);
        }
        Ok(pending.address)
    }

    /// Register a connection and hand back the session plus the outbox
    /// receiver the transport should drain. New sessions start with the
    /// default subscriptions: `blocks` and `ownTransactions`.
    pub fn connect(
        &self,
        address: Option<String>,
        meta: RequestMeta,
    ) -> (std::sync::Arc<Session>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SESSION_OUTBOX_CAPACITY);
        let session = std::sync::Arc::new(Session {
            id: Uuid::new_v4(),
            address: RwLock::new(address),
            subscriptions: RwLock::new(HashSet::from([
                EventCategory::Blocks,
                EventCategory::OwnTransactions,
            ])),
            outbox: tx,
            meta,
        });
        self.sessions.insert(session.id, std::sync::Arc::clone(&session));
        debug!(session = %session.id, guests = session.is_guest(), "session connected");
        (session, rx)
    }

    pub fn disconnect(&self, id: &Uuid) {
        self.sessions.remove(id);
        debug!(session = %id, "session disconnected");
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Deliver an event to every subscribed session. Never blocks; a
    /// full outbox loses the event for that session only.
    pub fn broadcast(&self, event: &Event) {
        let payload = event.to_message().to_string();
        for entry in self.sessions.iter() {
            let session = entry.value();
            if !session.wants(event) {
                continue;
            }
            if !session.try_deliver(&payload) {
                warn!(
                    session = %session.id,
                    event = event.kind(),
                    "session outbox full, event dropped"
                );
            }
        }
    }
}

impl EventSink for SessionRegistry {
    fn emit(&self, event: Event) {
        self.broadcast(&event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;

    fn tx_event(from: &str, to: &str) -> Event {
        Event::Transaction {
            transaction: Transaction {
                id: 1,
                from: Some(from.to_string()),
                to: to.to_string(),
                value: 5,
                time: Utc::now(),
                name: None,
                op: None,
                sent_metaname: None,
                sent_name: None,
                useragent: None,
                origin: None,
            },
        }
    }

    fn block_event() -> Event {
        Event::Block {
            block: crate::blocks::Block {
                id: 2,
                hash: Some("e".repeat(64)),
                address: "taaaaaaaaa".into(),
                nonce: vec![1],
                time: Utc::now(),
                difficulty: 1000,
                value: 25,
                useragent: None,
                origin: None,
            },
            new_work: 990,
        }
    }

    #[test]
    fn tokens_are_single_use() {
        let registry = SessionRegistry::new();
        let token = registry.issue_token(Some("taaaaaaaaa".into()));

        let claimed = registry.claim_token(&token).unwrap();
        assert_eq!(claimed.as_deref(), Some("taaaaaaaaa"));

        let err = registry.claim_token(&token).unwrap_err();
        assert!(matches!(err, NodeError::InvalidToken));
    }

    #[test]
    fn unknown_and_expired_tokens_rejected() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            registry.claim_token(&Uuid::new_v4()).unwrap_err(),
            NodeError::InvalidToken
        ));

        let token = Uuid::new_v4();
        registry.tokens.insert(
            token,
            PendingSession {
                address: None,
                issued: Utc::now() - Duration::seconds(WS_TOKEN_TTL_SECS + 5),
            },
        );
        assert!(matches!(
            registry.claim_token(&token).unwrap_err(),
            NodeError::InvalidToken
        ));
    }

    #[test]
    fn default_subscriptions_deliver_blocks() {
        let registry = SessionRegistry::new();
        let (_session, mut rx) = registry.connect(None, RequestMeta::internal());

        registry.broadcast(&block_event());
        let delivered = rx.try_recv().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&delivered).unwrap();
        assert_eq!(parsed["event"], "block");
        assert_eq!(parsed["new_work"], 990);
    }

    #[test]
    fn own_transactions_filter_by_address() {
        let registry = SessionRegistry::new();
        let (_alice, mut alice_rx) =
            registry.connect(Some("taaaaaaaaa".into()), RequestMeta::internal());
        let (_guest, mut guest_rx) = registry.connect(None, RequestMeta::internal());

        registry.broadcast(&tx_event("taaaaaaaaa", "tbbbbbbbbb"));
        assert!(alice_rx.try_recv().is_ok());
        // Guests hold ownTransactions but no address, so nothing matches.
        assert!(guest_rx.try_recv().is_err());

        registry.broadcast(&tx_event("tccccccccc", "tddddddddd"));
        assert!(alice_rx.try_recv().is_err());
    }

    #[test]
    fn firehose_subscription_sees_everything() {
        let registry = SessionRegistry::new();
        let (session, mut rx) = registry.connect(None, RequestMeta::internal());
        session.subscribe(EventCategory::Transactions);

        registry.broadcast(&tx_event("tccccccccc", "tddddddddd"));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let registry = SessionRegistry::new();
        let (session, mut rx) = registry.connect(None, RequestMeta::internal());

        session.unsubscribe(EventCategory::Blocks);
        registry.broadcast(&block_event());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn login_switches_filtering_atomically() {
        let registry = SessionRegistry::new();
        let (session, mut rx) = registry.connect(None, RequestMeta::internal());

        registry.broadcast(&tx_event("taaaaaaaaa", "tbbbbbbbbb"));
        assert!(rx.try_recv().is_err());

        session.set_address(Some("taaaaaaaaa".into()));
        registry.broadcast(&tx_event("taaaaaaaaa", "tbbbbbbbbb"));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn full_outbox_drops_instead_of_blocking() {
        let registry = SessionRegistry::new();
        let (_session, mut rx) = registry.connect(None, RequestMeta::internal());

        for _ in 0..(SESSION_OUTBOX_CAPACITY + 10) {
            registry.broadcast(&block_event());
        }
        // The queue holds exactly its capacity; the rest were dropped.
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SESSION_OUTBOX_CAPACITY);
    }

    #[test]
    fn disconnect_removes_session() {
        let registry = SessionRegistry::new();
        let (session, _rx) = registry.connect(None, RequestMeta::internal());
        assert_eq!(registry.session_count(), 1);
        registry.disconnect(&session.id);
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn subscription_level_is_sorted() {
        let registry = SessionRegistry::new();
        let (session, _rx) = registry.connect(None, RequestMeta::internal());
        assert_eq!(session.subscription_level(), vec!["blocks", "ownTransactions"]);
    }
}
