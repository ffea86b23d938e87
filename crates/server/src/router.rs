//! HTTP transport: the JSON-RPC endpoint and the health probe.
//!
//! `POST /` always answers HTTP 200 with a JSON-RPC body; protocol
//! and handler failures live inside that body. Only transport-level
//! problems (oversized bodies, wrong method) surface as HTTP errors.

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use gateway_core::{chain::ChainStatus, rpc::Dispatcher, store::BlockReader};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer};

#[derive(Clone)]
pub struct HttpState {
    pub dispatcher: Arc<Dispatcher>,
    pub blocks: Arc<BlockReader>,
    pub chain: Arc<ChainStatus>,
    pub stale_after: Duration,
}

pub fn http_router(state: HttpState, max_body_bytes: usize, max_concurrent: usize) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .route("/health", get(handle_health))
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Peer identity for rate limiting: `X-Forwarded-For`, then
/// `X-Real-IP`, then the remote address.
pub fn extract_peer(headers: &HeaderMap, remote: SocketAddr) -> String {
    for header in ["x-forwarded-for", "x-real-ip"] {
        if let Some(value) = headers.get(header).and_then(|v| v.to_str().ok()) {
            let value = value.trim();
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }
    remote.to_string()
}

async fn handle_rpc(
    State(state): State<HttpState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let peer = extract_peer(&headers, remote);
    let response = state.dispatcher.dispatch_raw(&body, &peer).await;
    (StatusCode::OK, Json(response))
}

async fn handle_health(State(state): State<HttpState>) -> impl IntoResponse {
    let body = match state.blocks.latest_height().await {
        Ok(height) => {
            state.chain.observe(height);
            let syncing = state.chain.seconds_since_advance() > state.stale_after.as_secs();
            json!({
                "status": "ok",
                "latestBlock": height,
                "syncing": syncing,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            })
        }
        Err(err) => json!({
            "status": "degraded",
            "error": err.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    };
    (StatusCode::OK, Json(body))
}
