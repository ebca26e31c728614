//! # REST + WebSocket API
//!
//! Builds the axum router over the kernel engines. Handlers are thin:
//! parse parameters, call one engine operation, wrap the result in the
//! `{ok: true, ...}` envelope. All error mapping funnels through
//! [`ApiError`], which turns the kernel's taxonomy into the right HTTP
//! status and `{ok: false, error, ...}` body.
//!
//! ## Route map
//!
//! | Area      | Routes                                                        |
//! |-----------|---------------------------------------------------------------|
//! | addresses | `/addresses[/rich]`, `/addresses/{a}[/transactions|/names]`, `/login` |
//! | blocks    | `/blocks[/last]`, `/blocks/{height}`, `/submit_block`         |
//! | transfers | `/transactions[/latest]`, `/transactions/{id}`                |
//! | names     | `/names[/cost|/bonus|/check/{n}]`, `/names/{n}[/transfer|/update]` |
//! | staking   | `/staking[/validator|/penalties|/withdraw]`, `/staking/{a}`   |
//! | work      | `/work[/day|/detailed]`, `/motd`                              |
//! | lookup    | `/lookup/{addresses,blocks,transactions,names}`               |
//! | search    | `/search`, `/search/extended`                                 |
//! | ws        | `/ws/start`, `/ws/gateway/{token}`                            |

pub mod addresses;
pub mod blocks;
pub mod lookup;
pub mod names;
pub mod search;
pub mod staking;
pub mod transactions;
pub mod work;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tessera_protocol::blocks::BlockEngine;
use tessera_protocol::config::Constants;
use tessera_protocol::errors::NodeError;
use tessera_protocol::events::{MessageRouter, SessionRegistry};
use tessera_protocol::ledger::{AddressLedger, RequestMeta};
use tessera_protocol::names::NameRegistry;
use tessera_protocol::staking::StakingEngine;
use tessera_protocol::storage::{FastState, Store};
use tessera_protocol::transaction::TransactionEngine;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared handler state. Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub constants: Arc<Constants>,
    pub fast: Arc<FastState>,
    pub store: Arc<Store>,
    pub ledger: Arc<AddressLedger>,
    pub names: Arc<NameRegistry>,
    pub transactions: Arc<TransactionEngine>,
    pub blocks: Arc<BlockEngine>,
    pub staking: Arc<StakingEngine>,
    pub registry: Arc<SessionRegistry>,
    pub router: Arc<MessageRouter>,
    /// Externally reachable base URL, used to mint WebSocket URLs.
    pub public_url: String,
    /// `NODE_ENV` production flag; gates debug affordances.
    pub production: bool,
    pub started: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

/// Wraps [`NodeError`] so handlers can use `?` straight into the HTTP
/// error envelope.
pub struct ApiError(pub NodeError);

impl<E: Into<NodeError>> From<E> for ApiError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }

        let mut body = serde_json::json!({
            "ok": false,
            "error": err.error_string(),
            "message": err.to_string(),
        });
        if let Some(parameter) = err.parameter() {
            body["parameter"] = serde_json::json!(parameter);
        }
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// limit/offset query parameters, clamped to sane bounds.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Pagination {
    pub fn clamp(&self) -> (usize, usize) {
        (self.limit.unwrap_or(50).clamp(1, 1000), self.offset.unwrap_or(0))
    }
}

/// Client context for the auth log and provenance columns.
pub fn request_meta(ConnectInfo(addr): &ConnectInfo<SocketAddr>, headers: &HeaderMap) -> RequestMeta {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };
    RequestMeta {
        ip: addr.ip().to_string(),
        useragent: header("user-agent"),
        origin: header("origin"),
    }
}

pub fn body_str(body: &Value, name: &str) -> ApiResult<String> {
    body_opt_str(body, name).ok_or_else(|| ApiError(NodeError::MissingParameter(name.to_string())))
}

pub fn body_opt_str(body: &Value, name: &str) -> Option<String> {
    body.get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

pub fn body_u64(body: &Value, name: &str) -> ApiResult<u64> {
    match body.get(name) {
        None | Some(Value::Null) => Err(ApiError(NodeError::MissingParameter(name.to_string()))),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| ApiError(NodeError::InvalidParameter(name.to_string()))),
        Some(Value::String(s)) => s
            .parse::<u64>()
            .map_err(|_| ApiError(NodeError::InvalidParameter(name.to_string()))),
        Some(_) => Err(ApiError(NodeError::InvalidParameter(name.to_string()))),
    }
}

/// Nonces arrive as a string (UTF-8 bytes) or an array of byte values.
pub fn body_nonce(body: &Value) -> ApiResult<Vec<u8>> {
    match body.get("nonce") {
        None | Some(Value::Null) => Err(ApiError(NodeError::MissingParameter("nonce".into()))),
        Some(Value::String(s)) => Ok(s.as_bytes().to_vec()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| ApiError(NodeError::InvalidParameter("nonce".into()))),
        Some(_) => Err(ApiError(NodeError::InvalidParameter("nonce".into()))),
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// The full API router with CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/motd", get(work::motd))
        .route("/login", post(addresses::login))
        .route("/addresses", get(addresses::list))
        .route("/addresses/rich", get(addresses::rich))
        .route("/addresses/{address}", get(addresses::get_one))
        .route(
            "/addresses/{address}/transactions",
            get(addresses::transactions_of),
        )
        .route("/addresses/{address}/names", get(addresses::names_of))
        .route("/blocks", get(blocks::list))
        .route("/blocks/last", get(blocks::last))
        .route("/blocks/{height}", get(blocks::get_one))
        .route("/submit_block", post(blocks::submit))
        .route(
            "/transactions",
            get(transactions::list).post(transactions::create),
        )
        .route("/transactions/latest", get(transactions::latest))
        .route("/transactions/{id}", get(transactions::get_one))
        .route("/names", get(names::list))
        .route("/names/cost", get(names::cost))
        .route("/names/bonus", get(names::bonus))
        .route("/names/check/{name}", get(names::check))
        .route("/names/{name}", get(names::get_one).post(names::purchase))
        .route("/names/{name}/transfer", post(names::transfer))
        .route(
            "/names/{name}/update",
            post(names::update).put(names::update),
        )
        .route("/staking", get(staking::list).post(staking::deposit))
        .route("/staking/validator", get(staking::validator))
        .route("/staking/penalties", get(staking::penalties))
        .route("/staking/withdraw", post(staking::withdraw))
        .route("/staking/{address}", get(staking::get_one))
        .route("/work", get(work::current))
        .route("/work/day", get(work::day))
        .route("/work/detailed", get(work::detailed))
        .route("/lookup/addresses/{addresses}", get(lookup::addresses))
        .route("/lookup/blocks", get(lookup::blocks))
        .route("/lookup/transactions", get(lookup::transactions))
        .route("/lookup/names", get(lookup::names))
        .route("/search", get(search::search))
        .route("/search/extended", get(search::extended))
        .route("/ws/start", post(ws::start))
        .route("/ws/gateway/{token}", get(ws::gateway))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
