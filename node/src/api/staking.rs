//! Staking endpoints: stake listing and lookup, deposits, withdrawals,
//! the current validator, and outstanding penalties.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use tessera_protocol::staking::stake_json;

use super::{body_str, body_u64, request_meta, ApiResult, AppState, Pagination};

/// `GET /staking`
pub async fn list(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Value>> {
    let (limit, offset) = page.clamp();
    let (rows, total) = state.staking.list(limit, offset)?;
    Ok(Json(json!({
        "ok": true,
        "count": rows.len(),
        "total": total,
        "stakes": rows.iter().map(stake_json).collect::<Vec<_>>(),
    })))
}

/// `GET /staking/{address}`
pub async fn get_one(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<Value>> {
    let row = state.staking.get(&address)?;
    Ok(Json(json!({ "ok": true, "stake": stake_json(&row) })))
}

/// `POST /staking` — deposit.
pub async fn deposit(
    State(state): State<AppState>,
    connect: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let meta = request_meta(&connect, &headers);
    let private_key = body_str(&body, "privatekey")?;
    let amount = body_u64(&body, "amount")?;
    let row = state.staking.deposit(&meta, &private_key, amount)?;
    Ok(Json(json!({ "ok": true, "stake": stake_json(&row) })))
}

/// `POST /staking/withdraw`
pub async fn withdraw(
    State(state): State<AppState>,
    connect: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let meta = request_meta(&connect, &headers);
    let private_key = body_str(&body, "privatekey")?;
    let amount = body_u64(&body, "amount")?;
    let row = state.staking.withdraw(&meta, &private_key, amount)?;
    Ok(Json(json!({ "ok": true, "stake": stake_json(&row) })))
}

/// `GET /staking/validator`
pub async fn validator(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(json!({
        "ok": true,
        "validator": state.staking.validator(),
    })))
}

/// `GET /staking/penalties`
pub async fn penalties(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let rows = state.staking.penalties()?;
    let penalties: Vec<Value> = rows
        .iter()
        .map(|a| json!({ "address": a.address, "penalty": a.penalty }))
        .collect();
    Ok(Json(json!({
        "ok": true,
        "count": penalties.len(),
        "penalties": penalties,
    })))
}
