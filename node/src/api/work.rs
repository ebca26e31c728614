//! Work surface and the aggregated `/motd` status endpoint.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use super::{ApiResult, AppState};

/// `GET /work`
pub async fn current(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(json!({ "ok": true, "work": state.fast.work() })))
}

/// `GET /work/day` — the 24-hour sample ring, newest first.
pub async fn day(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(json!({
        "ok": true,
        "work": state.fast.work_over_time(),
    })))
}

/// `GET /work/detailed`
pub async fn detailed(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let detailed = state.blocks.work_detailed()?;
    Ok(Json(json!({
        "ok": true,
        "work": detailed.work,
        "unpaid": detailed.unpaid,
        "base_value": detailed.base_value,
        "block_value": detailed.block_value,
        "decrease": detailed.decrease,
    })))
}

/// `GET /motd` — aggregated node status and the protocol constants
/// wallets discover at startup.
pub async fn motd(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let (motd, motd_set) = state.fast.motd();
    let c = &state.constants;
    let last_block = state.blocks.latest().ok();

    Ok(Json(json!({
        "ok": true,
        "motd": motd,
        "set": motd_set.to_rfc3339(),
        "public_url": state.public_url,
        "debug_mode": !state.production,
        "server_time": Utc::now().to_rfc3339(),
        "started": state.started.to_rfc3339(),
        "mining_enabled": state.fast.mining_enabled(),
        "staking_enabled": state.fast.staking_enabled(),
        "genesis_genned": state.fast.genesis_genned(),
        "last_block": last_block.map(|b| b.to_json()),
        "work": state.fast.work(),
        "constants": {
            "wallet_version": c.wallet_version,
            "nonce_max_size": c.nonce_max_size,
            "name_cost": c.name_cost,
            "min_work": c.min_work,
            "max_work": c.max_work,
            "work_factor": c.work_factor,
            "seconds_per_block": c.seconds_per_block,
            "validator_penalty": c.validator_penalty,
        },
        "currency": {
            "address_prefix": c.address_prefix.to_string(),
            "name_suffix": c.name_suffix,
            "currency_name": "Tessera",
            "currency_symbol": "TST",
        },
    })))
}
