//! JSON-RPC 2.0 dispatch.
//!
//! Methods are registered per namespace in an explicit table; the
//! public name is `"{namespace}_{method}"`. Each entry is an adapter
//! closure that binds the positional [`Params`] to typed arguments and
//! awaits the handler. The dispatcher owns protocol validation, rate
//! limiting, batch semantics, per-request timeouts and slow-query
//! accounting.

mod error;
mod params;
mod types;

pub use error::{code, RpcError};
pub use params::Params;
pub use types::{RpcRequest, RpcResponse, JSONRPC_VERSION, JSONRPC_VERSION_COW};

use crate::ratelimit::RateLimiter;
use ahash::RandomState;
use serde_json::Value;
use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

/// Per-request call context handed to every handler.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Extracted peer identifier (forwarded-for, real-ip or remote
    /// address).
    pub peer: Arc<str>,
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, RpcError>> + Send>>;
type Handler = Arc<dyn Fn(CallContext, Params) -> HandlerFuture + Send + Sync>;

/// Explicit method table keyed by the public method name.
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Handler, RandomState>,
}

impl MethodRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `{namespace}_{method}`. Re-registration replaces the
    /// previous handler.
    pub fn register<F, Fut>(&mut self, namespace: &str, method: &str, handler: F)
    where
        F: Fn(CallContext, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
    {
        let name = format!("{namespace}_{method}");
        debug!(method = %name, "registered rpc method");
        self.methods.insert(name, Arc::new(move |ctx, params| Box::pin(handler(ctx, params))));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.methods.get(name)
    }

    #[must_use]
    pub fn method_names(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }
}

/// Dispatcher configuration knobs.
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Upper bound on a single handler invocation.
    pub request_timeout: Duration,
    /// Requests slower than this log at `warn`.
    pub slow_query_threshold: Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            slow_query_threshold: Duration::from_millis(500),
        }
    }
}

pub struct Dispatcher {
    registry: MethodRegistry,
    limiter: Option<Arc<RateLimiter>>,
    opts: DispatcherOptions,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        registry: MethodRegistry,
        limiter: Option<Arc<RateLimiter>>,
        opts: DispatcherOptions,
    ) -> Self {
        Self { registry, limiter, opts }
    }

    /// Entry point for a raw request body: parses it and dispatches a
    /// single request or a batch. Always yields a JSON value to send
    /// back; transport-level failures are the caller's concern.
    pub async fn dispatch_raw(&self, body: &[u8], peer: &str) -> Value {
        match serde_json::from_slice::<Value>(body) {
            Ok(payload) => self.dispatch_value(payload, peer).await,
            Err(err) => RpcResponse::failure(
                RpcError::parse_error(format!("parse error: {err}")),
                Arc::new(Value::Null),
            )
            .into_value(),
        }
    }

    /// Dispatches an already-parsed payload. A non-empty JSON array is
    /// a batch; entries run sequentially in submission order and the
    /// responses come back in the same order.
    pub async fn dispatch_value(&self, payload: Value, peer: &str) -> Value {
        match payload {
            Value::Array(entries) => {
                if entries.is_empty() {
                    return RpcResponse::failure(
                        RpcError::invalid_request("empty batch request"),
                        Arc::new(Value::Null),
                    )
                    .into_value();
                }
                let mut responses = Vec::with_capacity(entries.len());
                for entry in entries {
                    responses.push(self.handle_single(entry, peer).await);
                }
                Value::Array(responses)
            }
            single => self.handle_single(single, peer).await,
        }
    }

    async fn handle_single(&self, payload: Value, peer: &str) -> Value {
        let request: RpcRequest = match serde_json::from_value(payload) {
            Ok(req) => req,
            Err(_) => {
                return RpcResponse::failure(
                    RpcError::invalid_request("invalid request"),
                    Arc::new(Value::Null),
                )
                .into_value();
            }
        };

        let id = Arc::clone(&request.id);

        if request.jsonrpc != JSONRPC_VERSION {
            return RpcResponse::failure(
                RpcError::invalid_request("invalid jsonrpc version"),
                id,
            )
            .into_value();
        }
        if request.method.is_empty() {
            return RpcResponse::failure(RpcError::invalid_request("missing method"), id)
                .into_value();
        }

        if let Some(limiter) = &self.limiter {
            if let Err(scope) = limiter.check(peer, &request.method) {
                return RpcResponse::failure(
                    RpcError::limit_exceeded(format!("rate limit exceeded: {}", scope.as_str())),
                    id,
                )
                .into_value();
            }
        }

        let Some(handler) = self.registry.get(&request.method) else {
            return RpcResponse::failure(RpcError::method_not_found(&request.method), id)
                .into_value();
        };

        let ctx = CallContext { peer: Arc::from(peer) };
        let params = Params::new(request.params);

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.opts.request_timeout, handler(ctx, params)).await;
        let elapsed = started.elapsed();

        if elapsed > self.opts.slow_query_threshold {
            warn!(method = %request.method, elapsed_ms = elapsed.as_millis() as u64, "slow rpc request");
        } else {
            debug!(method = %request.method, elapsed_ms = elapsed.as_millis() as u64, "rpc request");
        }

        match outcome {
            Ok(Ok(result)) => RpcResponse::success(result, id).into_value(),
            Ok(Err(err)) => RpcResponse::failure(err, id).into_value(),
            Err(_) => {
                RpcResponse::failure(RpcError::internal("request timed out"), id).into_value()
            }
        }
    }
}
