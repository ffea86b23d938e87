//! JSON-RPC 2.0 request and response envelopes.
//!
//! The request `id` is wrapped in an `Arc` so echoing it into the
//! response (including error responses built before the handler runs)
//! is a pointer copy rather than a deep clone of an arbitrary JSON
//! value.

use super::error::RpcError;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, sync::Arc};

pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated version string for constructing responses without
/// allocation.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// Incoming request envelope. All fields default so malformed shapes
/// reach the protocol checks instead of failing JSON decoding with an
/// unhelpful message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    #[serde(default = "null_id")]
    pub id: Arc<serde_json::Value>,
}

fn null_id() -> Arc<serde_json::Value> {
    Arc::new(serde_json::Value::Null)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Arc<serde_json::Value>,
}

impl RpcResponse {
    #[must_use]
    pub fn success(result: serde_json::Value, id: Arc<serde_json::Value>) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, result: Some(result), error: None, id }
    }

    #[must_use]
    pub fn failure(error: RpcError, id: Arc<serde_json::Value>) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, result: None, error: Some(error), id }
    }

    #[must_use]
    pub fn into_value(self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
