//! Address endpoints: listing, rich list, single lookup with optional
//! name counts, per-address history, and `POST /login`.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{body_str, request_meta, ApiResult, AppState, Pagination};

#[derive(Debug, Default, Deserialize)]
pub struct AddressQuery {
    #[serde(rename = "fetchNames")]
    pub fetch_names: Option<bool>,
}

/// `GET /addresses`
pub async fn list(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Value>> {
    let (limit, offset) = page.clamp();
    let (rows, total) = state.ledger.list(limit, offset)?;
    Ok(Json(json!({
        "ok": true,
        "count": rows.len(),
        "total": total,
        "addresses": rows.iter().map(|a| a.to_json()).collect::<Vec<_>>(),
    })))
}

/// `GET /addresses/rich`
pub async fn rich(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Value>> {
    let (limit, offset) = page.clamp();
    let (rows, total) = state.ledger.rich(limit, offset)?;
    Ok(Json(json!({
        "ok": true,
        "count": rows.len(),
        "total": total,
        "addresses": rows.iter().map(|a| a.to_json()).collect::<Vec<_>>(),
    })))
}

/// `GET /addresses/{address}`
pub async fn get_one(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<AddressQuery>,
) -> ApiResult<Json<Value>> {
    let row = state.ledger.require(&address)?;
    let body = if query.fetch_names.unwrap_or(false) {
        row.to_json_with_names(state.names.count_of(&row.address)?)
    } else {
        row.to_json()
    };
    Ok(Json(json!({ "ok": true, "address": body })))
}

/// `GET /addresses/{address}/transactions`
pub async fn transactions_of(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Value>> {
    let (limit, offset) = page.clamp();
    let (rows, total) = state.transactions.of_address(&address, limit, offset)?;
    Ok(Json(json!({
        "ok": true,
        "count": rows.len(),
        "total": total,
        "transactions": rows.iter().map(|t| t.to_json()).collect::<Vec<_>>(),
    })))
}

/// `GET /addresses/{address}/names`
pub async fn names_of(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<Value>> {
    state.ledger.require(&address)?;
    let rows = state.names.names_of(&address)?;
    Ok(Json(json!({
        "ok": true,
        "count": rows.len(),
        "names": rows,
    })))
}

/// `POST /login` — check a private key and report the address it
/// controls.
pub async fn login(
    State(state): State<AppState>,
    connect: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let meta = request_meta(&connect, &headers);
    let private_key = body_str(&body, "privatekey")?;

    match state.ledger.authenticate(&meta, &private_key) {
        Ok(row) => Ok(Json(json!({
            "ok": true,
            "authed": true,
            "address": row.address,
        }))),
        Err(tessera_protocol::NodeError::AuthFailed) => {
            Ok(Json(json!({ "ok": true, "authed": false })))
        }
        Err(e) => Err(e.into()),
    }
}
