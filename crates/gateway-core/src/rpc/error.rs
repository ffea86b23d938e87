//! JSON-RPC error object and the numeric code space.

use serde::{Deserialize, Serialize};

/// Standard JSON-RPC 2.0 codes.
pub mod code {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // Ethereum-specific codes.
    pub const UNKNOWN_BLOCK: i32 = -32000;
    pub const INVALID_INPUT: i32 = -32001;
    pub const RESOURCE_NOT_FOUND: i32 = -32002;
    pub const RESOURCE_UNAVAILABLE: i32 = -32003;
    pub const TRANSACTION_REJECTED: i32 = -32004;
    pub const METHOD_NOT_SUPPORTED: i32 = -32005;
    pub const LIMIT_EXCEEDED: i32 = -32006;
    pub const VERSION_NOT_SUPPORTED: i32 = -32007;
}

/// Error object carried in a JSON-RPC response.
///
/// Handlers return this type directly when they want a specific code;
/// anything else that escapes a handler is wrapped as an internal
/// error by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(code::PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(code::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(code::METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(code::INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(code::INTERNAL_ERROR, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(code::INVALID_INPUT, message)
    }

    pub fn resource_not_found(message: impl Into<String>) -> Self {
        Self::new(code::RESOURCE_NOT_FOUND, message)
    }

    pub fn transaction_rejected(message: impl Into<String>) -> Self {
        Self::new(code::TRANSACTION_REJECTED, message)
    }

    pub fn limit_exceeded(message: impl Into<String>) -> Self {
        Self::new(code::LIMIT_EXCEEDED, message)
    }
}

impl From<crate::store::StoreError> for RpcError {
    fn from(err: crate::store::StoreError) -> Self {
        match err {
            crate::store::StoreError::NotFound => Self::resource_not_found("not found"),
            other => Self::internal(other.to_string()),
        }
    }
}
