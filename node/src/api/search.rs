//! Typed search: exact-match resolution of a query against every
//! entity kind, and an extended transaction search by address
//! involvement, name, or metadata substring.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use tessera_protocol::crypto::address::{is_valid_address, is_valid_name, strip_name_suffix};
use tessera_protocol::NodeError;

use super::{ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

fn query_string(query: &SearchQuery) -> ApiResult<String> {
    let q = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| NodeError::MissingParameter("q".to_string()))?;
    Ok(q.to_string())
}

/// `GET /search` — exact matches across addresses, names, blocks, and
/// transactions.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let q = query_string(&query)?;
    let lowered = q.to_lowercase();

    let exact_address = if is_valid_address(&lowered, state.constants.address_prefix) {
        state.ledger.get(&lowered)?.map(|a| a.to_json())
    } else {
        None
    };

    let stripped = strip_name_suffix(&lowered, state.constants.name_suffix);
    let exact_name = if is_valid_name(stripped) {
        state
            .store
            .name(stripped)?
            .map(|n| serde_json::to_value(n).unwrap_or_default())
    } else {
        None
    };

    let numeric = q.parse::<u64>().ok();
    let exact_block = match numeric {
        Some(id) => state.store.block(id)?.map(|b| b.to_json()),
        None => None,
    };
    let exact_transaction = match numeric {
        Some(id) => state.store.transaction(id)?.map(|t| t.to_json()),
        None => None,
    };

    Ok(Json(json!({
        "ok": true,
        "query": q,
        "matches": {
            "exactAddress": exact_address.unwrap_or(Value::Bool(false)),
            "exactName": exact_name.unwrap_or(Value::Bool(false)),
            "exactBlock": exact_block.unwrap_or(Value::Bool(false)),
            "exactTransaction": exact_transaction.unwrap_or(Value::Bool(false)),
        },
    })))
}

/// `GET /search/extended` — transaction match counts for a query:
/// by address involvement, by attached name, and by metadata substring.
pub async fn extended(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let q = query_string(&query)?;
    if q.len() < 3 {
        return Err(NodeError::InvalidParameter("q".to_string()).into());
    }
    let lowered = q.to_lowercase();

    let address_involved = if is_valid_address(&lowered, state.constants.address_prefix) {
        let (_, total) = state
            .store
            .transactions_where(|tx| tx.involves(&lowered), 0, 0, true)?;
        Some(total)
    } else {
        None
    };

    let stripped = strip_name_suffix(&lowered, state.constants.name_suffix).to_string();
    let name_involved = if is_valid_name(&stripped) {
        let (_, total) = state.store.transactions_where(
            |tx| {
                tx.name.as_deref() == Some(stripped.as_str())
                    || tx.sent_name.as_deref() == Some(stripped.as_str())
            },
            0,
            0,
            true,
        )?;
        Some(total)
    } else {
        None
    };

    let (_, metadata_total) = state
        .store
        .transactions_where(|tx| tx.op.as_deref().is_some_and(|op| op.contains(&q)), 0, 0, true)?;

    Ok(Json(json!({
        "ok": true,
        "query": q,
        "matches": {
            "transactions": {
                "addressInvolved": address_involved.map(Value::from).unwrap_or(Value::Bool(false)),
                "nameInvolved": name_involved.map(Value::from).unwrap_or(Value::Bool(false)),
                "metadata": metadata_total,
            },
        },
    })))
}
