//! # WebSocket Message Router
//!
//! Request/response dispatch for connected sessions. Clients send
//! `{id, type, ...}` messages; the router executes the matching handler
//! in the session's context and answers with `{ok, id, type:
//! "response", responding_to, ...}` (or a typed error envelope). The
//! `id` is chosen by the client and echoed back verbatim so wallets can
//! match responses to in-flight requests.
//!
//! `login` is the one handler that changes what a session *is*: it
//! re-derives the address from the supplied private key, runs the
//! ledger's auth contract, and swaps the session from guest to
//! authenticated in a single assignment — subsequent broadcasts filter
//! against the new address immediately.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};

use crate::blocks::BlockEngine;
use crate::config::Constants;
use crate::errors::{NodeError, Result};
use crate::events::bus::EventCategory;
use crate::events::sessions::Session;
use crate::ledger::AddressLedger;
use crate::names::NameRegistry;
use crate::staking::{stake_json, StakingEngine};
use crate::storage::FastState;
use crate::transaction::TransactionEngine;

/// Dispatches session messages to the engines.
pub struct MessageRouter {
    constants: Arc<Constants>,
    fast: Arc<FastState>,
    ledger: Arc<AddressLedger>,
    names: Arc<NameRegistry>,
    transactions: Arc<TransactionEngine>,
    blocks: Arc<BlockEngine>,
    staking: Arc<StakingEngine>,
}

impl MessageRouter {
    pub fn new(
        constants: Arc<Constants>,
        fast: Arc<FastState>,
        ledger: Arc<AddressLedger>,
        names: Arc<NameRegistry>,
        transactions: Arc<TransactionEngine>,
        blocks: Arc<BlockEngine>,
        staking: Arc<StakingEngine>,
    ) -> Self {
        Self {
            constants,
            fast,
            ledger,
            names,
            transactions,
            blocks,
            staking,
        }
    }

    /// The server-initiated greeting sent right after the upgrade.
    pub fn hello(&self) -> Value {
        let (motd, motd_date) = self.fast.motd();
        json!({
            "ok": true,
            "type": "hello",
            "server_time": Utc::now().to_rfc3339(),
            "motd": motd,
            "motd_set": motd_date.to_rfc3339(),
            "work": self.fast.work(),
            "last_block": self.blocks.latest().ok().map(|b| b.to_json()),
        })
    }

    /// Handle one inbound message and produce the response envelope.
    pub fn handle(&self, session: &Session, raw: &str) -> Value {
        let msg: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(_) => {
                return error_envelope(None, None, &NodeError::InvalidParameter("message".into()))
            }
        };
        let id = msg.get("id").and_then(Value::as_u64);
        let msg_type = match msg.get("type").and_then(Value::as_str) {
            Some(t) => t.to_string(),
            None => {
                return error_envelope(id, None, &NodeError::MissingParameter("type".into()))
            }
        };

        match self.dispatch(session, &msg_type, &msg) {
            Ok(extra) => ok_envelope(id, &msg_type, extra),
            Err(e) => error_envelope(id, Some(&msg_type), &e),
        }
    }

    fn dispatch(&self, session: &Session, msg_type: &str, msg: &Value) -> Result<Value> {
        match msg_type {
            "work" => Ok(json!({ "work": self.fast.work() })),

            "address" => {
                let address = str_param(msg, "address")?;
                let row = self.ledger.require(&address)?;
                let body = if bool_param(msg, "fetchNames") {
                    row.to_json_with_names(self.names.count_of(&row.address)?)
                } else {
                    row.to_json()
                };
                Ok(json!({ "address": body }))
            }

            "login" => {
                let private_key = str_param(msg, "privatekey")?;
                let row = self.ledger.authenticate(&session.meta, &private_key)?;
                session.set_address(Some(row.address.clone()));
                Ok(json!({ "isGuest": false, "address": row.to_json() }))
            }

            "logout" => {
                session.set_address(None);
                Ok(json!({ "isGuest": true }))
            }

            "me" => match session.address() {
                Some(address) => {
                    let row = self.ledger.require(&address)?;
                    Ok(json!({ "isGuest": false, "address": row.to_json() }))
                }
                None => Ok(json!({ "isGuest": true })),
            },

            "subscribe" => {
                let category = category_param(msg)?;
                session.subscribe(category);
                Ok(json!({ "subscription_level": session.subscription_level() }))
            }

            "unsubscribe" => {
                let category = category_param(msg)?;
                session.unsubscribe(category);
                Ok(json!({ "subscription_level": session.subscription_level() }))
            }

            "get_subscription_level" => {
                Ok(json!({ "subscription_level": session.subscription_level() }))
            }

            "get_valid_subscription_levels" => {
                let levels: Vec<&'static str> =
                    EventCategory::ALL.iter().map(|c| c.as_str()).collect();
                Ok(json!({ "valid_subscription_levels": levels }))
            }

            "make_transaction" => {
                let private_key = str_param(msg, "privatekey")?;
                let to = str_param(msg, "to")?;
                let amount = u64_param(msg, "amount")?;
                let metadata = opt_str_param(msg, "metadata");
                let tx = self.transactions.send(
                    &session.meta,
                    &private_key,
                    &to,
                    amount,
                    metadata.as_deref(),
                )?;
                Ok(json!({ "transaction": tx.to_json() }))
            }

            "submit_block" => {
                let address = match opt_str_param(msg, "address") {
                    Some(a) => a,
                    None => session
                        .address()
                        .ok_or_else(|| NodeError::MissingParameter("address".to_string()))?,
                };
                let nonce = nonce_param(msg)?;
                let accepted = self.blocks.submit(&session.meta, &address, &nonce)?;
                Ok(json!({
                    "success": true,
                    "block": accepted.block.to_json(),
                    "new_work": accepted.new_work,
                }))
            }

            "stake" => {
                let address = match opt_str_param(msg, "address") {
                    Some(a) => a,
                    None => session
                        .address()
                        .ok_or_else(|| NodeError::MissingParameter("address".to_string()))?,
                };
                let row = self.staking.get(&address)?;
                Ok(json!({ "stake": stake_json(&row) }))
            }

            "deposit_stake" => {
                let private_key = str_param(msg, "privatekey")?;
                let amount = u64_param(msg, "amount")?;
                let row = self.staking.deposit(&session.meta, &private_key, amount)?;
                Ok(json!({ "stake": stake_json(&row) }))
            }

            "withdraw_stake" => {
                let private_key = str_param(msg, "privatekey")?;
                let amount = u64_param(msg, "amount")?;
                let row = self.staking.withdraw(&session.meta, &private_key, amount)?;
                Ok(json!({ "stake": stake_json(&row) }))
            }

            "validator" => Ok(json!({ "validator": self.staking.validator() })),

            "motd" => {
                let (motd, motd_date) = self.fast.motd();
                Ok(json!({
                    "motd": motd,
                    "motd_set": motd_date.to_rfc3339(),
                    "wallet_version": self.constants.wallet_version,
                }))
            }

            _ => Err(NodeError::InvalidParameter("type".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelopes & params
// ---------------------------------------------------------------------------

fn ok_envelope(id: Option<u64>, responding_to: &str, extra: Value) -> Value {
    let mut out = json!({
        "ok": true,
        "type": "response",
        "responding_to": responding_to,
    });
    if let Some(id) = id {
        out["id"] = json!(id);
    }
    if let Value::Object(extra) = extra {
        let map = out.as_object_mut().expect("object literal");
        for (k, v) in extra {
            map.insert(k, v);
        }
    }
    out
}

fn error_envelope(id: Option<u64>, responding_to: Option<&str>, err: &NodeError) -> Value {
    let mut out = json!({
        "ok": false,
        "type": "error",
        "error": err.error_string(),
        "message": err.to_string(),
    });
    if let Some(id) = id {
        out["id"] = json!(id);
    }
    if let Some(responding_to) = responding_to {
        out["responding_to"] = json!(responding_to);
    }
    if let Some(parameter) = err.parameter() {
        out["parameter"] = json!(parameter);
    }
    out
}

fn str_param(msg: &Value, name: &str) -> Result<String> {
    opt_str_param(msg, name).ok_or_else(|| NodeError::MissingParameter(name.to_string()))
}

fn opt_str_param(msg: &Value, name: &str) -> Option<String> {
    msg.get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn bool_param(msg: &Value, name: &str) -> bool {
    match msg.get(name) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    }
}

fn category_param(msg: &Value) -> Result<EventCategory> {
    let raw = str_param(msg, "event")?;
    EventCategory::parse(&raw).ok_or_else(|| NodeError::InvalidParameter("event".to_string()))
}

fn u64_param(msg: &Value, name: &str) -> Result<u64> {
    match msg.get(name) {
        None | Some(Value::Null) => Err(NodeError::MissingParameter(name.to_string())),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| NodeError::InvalidParameter(name.to_string())),
        Some(Value::String(s)) => s
            .parse::<u64>()
            .map_err(|_| NodeError::InvalidParameter(name.to_string())),
        Some(_) => Err(NodeError::InvalidParameter(name.to_string())),
    }
}

/// Nonces arrive either as a raw string (its UTF-8 bytes are the nonce)
/// or as an array of byte values.
fn nonce_param(msg: &Value) -> Result<Vec<u8>> {
    match msg.get("nonce") {
        None | Some(Value::Null) => Err(NodeError::MissingParameter("nonce".to_string())),
        Some(Value::String(s)) => Ok(s.as_bytes().to_vec()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| NodeError::InvalidParameter("nonce".to_string())),
        Some(_) => Err(NodeError::InvalidParameter("nonce".to_string())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
