//! Transaction endpoints: listing, lookup, and `POST /transactions`
//! into the transfer pipeline.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{body_opt_str, body_str, body_u64, request_meta, ApiResult, AppState, Pagination};

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    #[serde(rename = "excludeMined")]
    pub exclude_mined: Option<bool>,
}

impl TransactionQuery {
    fn page(&self) -> Pagination {
        Pagination {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

fn listing(state: &AppState, query: &TransactionQuery, newest_first: bool) -> ApiResult<Json<Value>> {
    let (limit, offset) = query.page().clamp();
    let (rows, total) = state.transactions.list(
        limit,
        offset,
        newest_first,
        query.exclude_mined.unwrap_or(false),
    )?;
    Ok(Json(json!({
        "ok": true,
        "count": rows.len(),
        "total": total,
        "transactions": rows.iter().map(|t| t.to_json()).collect::<Vec<_>>(),
    })))
}

/// `GET /transactions` — oldest first, the canonical log order.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> ApiResult<Json<Value>> {
    listing(&state, &query, false)
}

/// `GET /transactions/latest`
pub async fn latest(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> ApiResult<Json<Value>> {
    listing(&state, &query, true)
}

/// `GET /transactions/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Value>> {
    let tx = state.transactions.get(id)?;
    Ok(Json(json!({ "ok": true, "transaction": tx.to_json() })))
}

/// `POST /transactions` — push a transfer.
pub async fn create(
    State(state): State<AppState>,
    connect: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let meta = request_meta(&connect, &headers);
    let private_key = body_str(&body, "privatekey")?;
    let to = body_str(&body, "to")?;
    let amount = body_u64(&body, "amount")?;
    let metadata = body_opt_str(&body, "metadata");

    let tx = state
        .transactions
        .send(&meta, &private_key, &to, amount, metadata.as_deref())?;
    Ok(Json(json!({ "ok": true, "transaction": tx.to_json() })))
}
