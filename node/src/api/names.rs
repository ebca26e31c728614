//! Name registry endpoints: queries plus the purchase / transfer /
//! A-record operations.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use super::{body_opt_str, body_str, request_meta, ApiResult, AppState, Pagination};

/// `GET /names`
pub async fn list(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Value>> {
    let (limit, offset) = page.clamp();
    let (rows, total) = state.names.list(limit, offset)?;
    Ok(Json(json!({
        "ok": true,
        "count": rows.len(),
        "total": total,
        "names": rows,
    })))
}

/// `GET /names/cost`
pub async fn cost(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(json!({ "ok": true, "name_cost": state.names.cost() })))
}

/// `GET /names/bonus` — how many names currently add to block rewards.
pub async fn bonus(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(json!({ "ok": true, "name_bonus": state.names.bonus()? })))
}

/// `GET /names/check/{name}`
pub async fn check(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    Ok(Json(json!({
        "ok": true,
        "available": state.names.is_available(&name)?,
    })))
}

/// `GET /names/{name}`
pub async fn get_one(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let row = state.names.get(&name)?;
    Ok(Json(json!({ "ok": true, "name": row })))
}

/// `POST /names/{name}` — purchase.
pub async fn purchase(
    State(state): State<AppState>,
    connect: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let meta = request_meta(&connect, &headers);
    let private_key = body_str(&body, "privatekey")?;
    let row = state.names.purchase(&meta, &private_key, &name)?;
    Ok(Json(json!({ "ok": true, "name": row })))
}

/// `POST /names/{name}/transfer`
pub async fn transfer(
    State(state): State<AppState>,
    connect: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let meta = request_meta(&connect, &headers);
    let private_key = body_str(&body, "privatekey")?;
    let to = body_str(&body, "address")?;
    let row = state.names.transfer(&meta, &private_key, &name, &to)?;
    Ok(Json(json!({ "ok": true, "name": row })))
}

/// `POST|PUT /names/{name}/update` — set or clear the A record.
pub async fn update(
    State(state): State<AppState>,
    connect: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let meta = request_meta(&connect, &headers);
    let private_key = body_str(&body, "privatekey")?;
    let a = body_opt_str(&body, "a");
    let row = state
        .names
        .update_a_record(&meta, &private_key, &name, a.as_deref())?;
    Ok(Json(json!({ "ok": true, "name": row })))
}
