//! WebSocket transport: token issuance over HTTP, the gateway upgrade,
//! and the per-connection pump between the session outbox and the
//! socket.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use tessera_protocol::config::WS_TOKEN_TTL_SECS;
use tessera_protocol::ledger::RequestMeta;
use tessera_protocol::NodeError;

use super::{body_opt_str, request_meta, ApiError, ApiResult, AppState};

/// `POST /ws/start` — mint a single-use session URL. With a private
/// key the session starts authenticated; without one it is a guest.
pub async fn start(
    State(state): State<AppState>,
    connect: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> ApiResult<Json<Value>> {
    let meta = request_meta(&connect, &headers);
    let body = body.map(|Json(v)| v).unwrap_or(Value::Null);

    let address = match body_opt_str(&body, "privatekey") {
        Some(private_key) => Some(state.ledger.authenticate(&meta, &private_key)?.address),
        None => None,
    };

    let token = state.registry.issue_token(address);
    let base = state.public_url.trim_end_matches('/');
    let url = format!("{}/ws/gateway/{}", base, token);
    Ok(Json(json!({
        "ok": true,
        "url": url,
        "expires": WS_TOKEN_TTL_SECS,
    })))
}

/// `GET /ws/gateway/{token}` — upgrade and attach the session.
pub async fn gateway(
    State(state): State<AppState>,
    connect: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(token): Path<String>,
    upgrade: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let token = Uuid::parse_str(&token).map_err(|_| NodeError::InvalidToken)?;
    let address = state.registry.claim_token(&token)?;
    let meta = request_meta(&connect, &headers);

    Ok(upgrade.on_upgrade(move |socket| drive_session(socket, state, address, meta)))
}

/// Pump one connection: greet, then interleave outbox delivery with
/// inbound message handling until either side closes.
async fn drive_session(
    mut socket: WebSocket,
    state: AppState,
    address: Option<String>,
    meta: RequestMeta,
) {
    let (session, mut outbox) = state.registry.connect(address, meta);

    let hello = state.router.hello().to_string();
    if socket.send(Message::Text(hello.into())).await.is_err() {
        state.registry.disconnect(&session.id);
        return;
    }

    loop {
        tokio::select! {
            queued = outbox.recv() => {
                match queued {
                    Some(payload) => {
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let response = state.router.handle(&session, text.as_str()).to_string();
                        if socket.send(Message::Text(response.into())).await.is_err() {
                            break;
                        }
                    }
                    // Ping/pong is handled by the protocol layer; binary
                    // frames are ignored.
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => {}
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                }
            }
        }
    }

    debug!(session = %session.id, "websocket closed");
    state.registry.disconnect(&session.id);
}
