//! The `net` namespace. The gateway holds no peer connections of its
//! own, so the answers are static.

use crate::rpc::{MethodRegistry, RpcError};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct NetApi {
    network_id: u64,
}

impl NetApi {
    pub fn new(network_id: u64) -> Self {
        Self { network_id }
    }

    pub async fn version(&self) -> Result<Value, RpcError> {
        Ok(json!(self.network_id.to_string()))
    }

    pub async fn listening(&self) -> Result<Value, RpcError> {
        Ok(json!(true))
    }

    pub async fn peer_count(&self) -> Result<Value, RpcError> {
        Ok(json!("0x0"))
    }
}

pub fn register(registry: &mut MethodRegistry, api: &Arc<NetApi>) {
    registry.register("net", "version", {
        let api = Arc::clone(api);
        move |_ctx, _params| {
            let api = Arc::clone(&api);
            async move { api.version().await }
        }
    });

    registry.register("net", "listening", {
        let api = Arc::clone(api);
        move |_ctx, _params| {
            let api = Arc::clone(&api);
            async move { api.listening().await }
        }
    });

    registry.register("net", "peerCount", {
        let api = Arc::clone(api);
        move |_ctx, _params| {
            let api = Arc::clone(&api);
            async move { api.peer_count().await }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn version_is_decimal_string() {
        let api = NetApi::new(56);
        assert_eq!(api.version().await.unwrap(), json!("56"));
    }

    #[tokio::test]
    async fn static_answers() {
        let api = NetApi::new(1);
        assert_eq!(api.listening().await.unwrap(), json!(true));
        assert_eq!(api.peer_count().await.unwrap(), json!("0x0"));
    }
}
