//! Block endpoints: listing, tip, by-height lookup, and the submission
//! endpoint that feeds the block engine.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use super::{body_nonce, body_str, request_meta, ApiResult, AppState, Pagination};

/// `GET /blocks`
pub async fn list(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Value>> {
    let (limit, offset) = page.clamp();
    let (rows, total) = state.blocks.list_desc(limit, offset)?;
    Ok(Json(json!({
        "ok": true,
        "count": rows.len(),
        "total": total,
        "blocks": rows.iter().map(|b| b.to_json()).collect::<Vec<_>>(),
    })))
}

/// `GET /blocks/last`
pub async fn last(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let block = state.blocks.latest()?;
    Ok(Json(json!({ "ok": true, "block": block.to_json() })))
}

/// `GET /blocks/{height}`
pub async fn get_one(
    State(state): State<AppState>,
    Path(height): Path<u64>,
) -> ApiResult<Json<Value>> {
    let block = state.blocks.get(height)?;
    Ok(Json(json!({ "ok": true, "block": block.to_json() })))
}

/// `POST /submit_block`
pub async fn submit(
    State(state): State<AppState>,
    connect: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let meta = request_meta(&connect, &headers);
    let address = body_str(&body, "address")?;
    let nonce = body_nonce(&body)?;

    let accepted = state.blocks.submit(&meta, &address, &nonce)?;
    let miner = state.ledger.require(&address)?;
    Ok(Json(json!({
        "ok": true,
        "success": true,
        "work": accepted.new_work,
        "address": miner.to_json(),
        "block": accepted.block.to_json(),
    })))
}
