//! The `web3` namespace.

use crate::rpc::{MethodRegistry, RpcError};
use alloy_primitives::{keccak256, Bytes};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct Web3Api {
    client_version: String,
}

impl Web3Api {
    pub fn new(version: &str) -> Self {
        let version = if version.is_empty() { "1.0.0" } else { version };
        Self { client_version: format!("evm-rpc/{version}") }
    }

    pub async fn client_version(&self) -> Result<Value, RpcError> {
        Ok(json!(self.client_version))
    }

    pub async fn sha3(&self, input: Bytes) -> Result<Value, RpcError> {
        serde_json::to_value(keccak256(&input))
            .map_err(|e| RpcError::internal(format!("encoding failed: {e}")))
    }
}

pub fn register(registry: &mut MethodRegistry, api: &Arc<Web3Api>) {
    registry.register("web3", "clientVersion", {
        let api = Arc::clone(api);
        move |_ctx, _params| {
            let api = Arc::clone(&api);
            async move { api.client_version().await }
        }
    });

    registry.register("web3", "sha3", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let input: Bytes = params.bind_required(0)?;
                api.sha3(input).await
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn client_version_format() {
        let api = Web3Api::new("0.1.0");
        assert_eq!(api.client_version().await.unwrap(), json!("evm-rpc/0.1.0"));
    }

    #[tokio::test]
    async fn sha3_of_empty_input() {
        let api = Web3Api::new("0.1.0");
        let digest = api.sha3(Bytes::new()).await.unwrap();
        assert_eq!(
            digest,
            json!("0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
        );
    }

    #[tokio::test]
    async fn sha3_of_known_vector() {
        let api = Web3Api::new("0.1.0");
        let digest = api.sha3(Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(
            digest,
            json!("0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8")
        );
    }
}
