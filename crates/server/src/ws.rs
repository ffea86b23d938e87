//! WebSocket transport.
//!
//! Each accepted connection runs one reader task (this handler) and
//! one writer task draining the connection's bounded queue. Requests
//! share the HTTP dispatcher; `eth_subscribe` and `eth_unsubscribe`
//! are intercepted here because their lifetime is tied to the
//! connection. Closing the connection drops all of its subscriptions.

use crate::router::extract_peer;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use gateway_core::{
    rpc::{Dispatcher, Params, RpcError, RpcRequest, RpcResponse, JSONRPC_VERSION},
    sub::{ConnectionHandle, LogFilter, SubscriptionKind, SubscriptionManager},
};
use serde_json::Value;
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct WsState {
    pub dispatcher: Arc<Dispatcher>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub shutdown: broadcast::Sender<()>,
    pub max_connections: usize,
    pub send_queue_size: usize,
    pub ping_interval: Duration,
    pub active: Arc<AtomicUsize>,
    conn_ids: Arc<AtomicU64>,
}

impl WsState {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        subscriptions: Arc<SubscriptionManager>,
        shutdown: broadcast::Sender<()>,
        max_connections: usize,
        send_queue_size: usize,
        ping_interval: Duration,
    ) -> Self {
        Self {
            dispatcher,
            subscriptions,
            shutdown,
            max_connections,
            send_queue_size,
            ping_interval,
            active: Arc::new(AtomicUsize::new(0)),
            conn_ids: Arc::new(AtomicU64::new(0)),
        }
    }
}

pub fn ws_router(state: WsState) -> Router {
    Router::new().route("/", get(handle_upgrade)).with_state(state)
}

async fn handle_upgrade(
    State(state): State<WsState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if state.max_connections > 0 && state.active.load(Ordering::Acquire) >= state.max_connections {
        return (StatusCode::SERVICE_UNAVAILABLE, "max connections reached").into_response();
    }

    let peer = extract_peer(&headers, remote);
    ws.on_upgrade(move |socket| handle_connection(state, socket, peer))
}

async fn handle_connection(state: WsState, socket: WebSocket, peer: String) {
    let conn_id = state.conn_ids.fetch_add(1, Ordering::Relaxed) + 1;
    state.active.fetch_add(1, Ordering::AcqRel);
    info!(conn = conn_id, peer = %peer, "websocket connection established");

    let (mut sink, mut incoming) = socket.split();
    let (sender, mut outgoing) = mpsc::channel::<Value>(state.send_queue_size);
    let handle = ConnectionHandle::new(conn_id, sender);

    // Writer: drains the bounded queue and keeps the connection alive
    // with periodic pings.
    let ping_interval = state.ping_interval;
    let writer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                message = outgoing.recv() => match message {
                    Some(value) => {
                        if sink.send(Message::Text(value.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut shutdown = state.shutdown.subscribe();
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            frame = incoming.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    handle_payload(&state, &handle, &peer, text.as_bytes()).await;
                }
                Some(Ok(Message::Binary(data))) => {
                    handle_payload(&state, &handle, &peer, &data).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(conn = conn_id, error = %err, "websocket read error");
                    break;
                }
            }
        }
    }

    state.subscriptions.drop_connection(conn_id);
    state.active.fetch_sub(1, Ordering::AcqRel);
    writer.abort();
    info!(conn = conn_id, peer = %peer, "websocket connection closed");
}

async fn handle_payload(state: &WsState, handle: &ConnectionHandle, peer: &str, raw: &[u8]) {
    let Ok(payload) = serde_json::from_slice::<Value>(raw) else {
        enqueue(
            handle,
            RpcResponse::failure(
                RpcError::parse_error("parse error"),
                Arc::new(Value::Null),
            )
            .into_value(),
        );
        return;
    };

    let method = payload.get("method").and_then(Value::as_str).unwrap_or_default();
    let response = match method {
        "eth_subscribe" => handle_subscribe(&state.subscriptions, handle, payload),
        "eth_unsubscribe" => handle_unsubscribe(&state.subscriptions, payload),
        _ => state.dispatcher.dispatch_value(payload, peer).await,
    };
    enqueue(handle, response);
}

fn enqueue(handle: &ConnectionHandle, response: Value) {
    if !handle.try_send(response) {
        warn!(conn = handle.id, "send queue full, dropping response");
    }
}

pub(crate) fn handle_subscribe(
    subscriptions: &Arc<SubscriptionManager>,
    handle: &ConnectionHandle,
    payload: Value,
) -> Value {
    let (id, params) = match decode_envelope(payload) {
        Ok(parts) => parts,
        Err(response) => return response,
    };

    let kind_name: String = match params.bind_required(0) {
        Ok(kind) => kind,
        Err(err) => return RpcResponse::failure(err, id).into_value(),
    };
    let Some(kind) = SubscriptionKind::parse(&kind_name) else {
        return RpcResponse::failure(
            RpcError::invalid_params(format!("unknown subscription type: {kind_name}")),
            id,
        )
        .into_value();
    };

    let filter = if kind == SubscriptionKind::Logs {
        match params.bind::<Option<LogFilter>>(1) {
            Ok(filter) => filter,
            Err(err) => return RpcResponse::failure(err, id).into_value(),
        }
    } else {
        None
    };

    let subscription = subscriptions.subscribe(handle.clone(), kind, filter);
    RpcResponse::success(Value::String(subscription), id).into_value()
}

pub(crate) fn handle_unsubscribe(
    subscriptions: &Arc<SubscriptionManager>,
    payload: Value,
) -> Value {
    let (id, params) = match decode_envelope(payload) {
        Ok(parts) => parts,
        Err(response) => return response,
    };

    let subscription: String = match params.bind_required(0) {
        Ok(subscription) => subscription,
        Err(err) => return RpcResponse::failure(err, id).into_value(),
    };
    RpcResponse::success(Value::Bool(subscriptions.unsubscribe(&subscription)), id).into_value()
}

fn decode_envelope(payload: Value) -> Result<(Arc<Value>, Params), Value> {
    let request: RpcRequest = serde_json::from_value(payload).map_err(|_| {
        RpcResponse::failure(RpcError::invalid_request("invalid request"), Arc::new(Value::Null))
            .into_value()
    })?;

    if request.jsonrpc != JSONRPC_VERSION {
        return Err(RpcResponse::failure(
            RpcError::invalid_request("invalid jsonrpc version"),
            request.id,
        )
        .into_value());
    }
    Ok((request.id, Params::new(request.params)))
}
