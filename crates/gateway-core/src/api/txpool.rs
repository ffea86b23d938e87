//! The `txpool` namespace: pool inspection.
//!
//! The schema keeps a `queued` bucket alongside `pending`; nothing
//! populates it, so it is always empty.

use crate::{
    api::types::{hex_u64, RpcTransaction},
    rpc::{MethodRegistry, RpcError},
    store::{effective_gas_price, PoolStore},
};
use alloy_consensus::{Transaction, TxEnvelope};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub struct TxPoolApi {
    pool: Arc<PoolStore>,
}

impl TxPoolApi {
    pub fn new(pool: Arc<PoolStore>) -> Self {
        Self { pool }
    }

    pub async fn status(&self) -> Result<Value, RpcError> {
        let pending = self
            .pool
            .pending_count()
            .await
            .map_err(|e| RpcError::internal(format!("failed to get pool status: {e}")))?;
        Ok(json!({ "pending": hex_u64(pending), "queued": "0x0" }))
    }

    pub async fn content(&self) -> Result<Value, RpcError> {
        self.grouped(|tx| {
            serde_json::to_value(RpcTransaction::pending(tx)).unwrap_or(Value::Null)
        })
        .await
    }

    pub async fn inspect(&self) -> Result<Value, RpcError> {
        self.grouped(|tx| Value::String(summarize(tx))).await
    }

    async fn grouped(
        &self,
        project: impl Fn(&TxEnvelope) -> Value,
    ) -> Result<Value, RpcError> {
        let content = self
            .pool
            .content()
            .await
            .map_err(|e| RpcError::internal(format!("failed to get pool content: {e}")))?;

        let mut pending = Map::new();
        for (sender, by_nonce) in content {
            let mut nonces = Map::new();
            for (nonce, tx) in by_nonce {
                nonces.insert(nonce, project(&tx));
            }
            pending.insert(sender, Value::Object(nonces));
        }

        Ok(json!({ "pending": pending, "queued": {} }))
    }
}

/// One-line transaction summary used by `txpool_inspect`.
fn summarize(tx: &TxEnvelope) -> String {
    let to = match tx.to() {
        Some(address) => crate::store::address_hex(&address),
        None => "contract creation".to_string(),
    };
    format!(
        "{to}: {} wei + {} gas × {} wei",
        tx.value(),
        tx.gas_limit(),
        effective_gas_price(tx)
    )
}

pub fn register(registry: &mut MethodRegistry, api: &Arc<TxPoolApi>) {
    registry.register("txpool", "status", {
        let api = Arc::clone(api);
        move |_ctx, _params| {
            let api = Arc::clone(&api);
            async move { api.status().await }
        }
    });

    registry.register("txpool", "content", {
        let api = Arc::clone(api);
        move |_ctx, _params| {
            let api = Arc::clone(&api);
            async move { api.content().await }
        }
    });

    registry.register("txpool", "inspect", {
        let api = Arc::clone(api);
        move |_ctx, _params| {
            let api = Arc::clone(&api);
            async move { api.inspect().await }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKv;
    use crate::store::txpool::tests::signed_legacy;
    use alloy_signer_local::PrivateKeySigner;

    fn api(kv: Arc<MemoryKv>) -> TxPoolApi {
        TxPoolApi::new(Arc::new(PoolStore::new(kv)))
    }

    #[tokio::test]
    async fn empty_pool_status() {
        let api = api(Arc::new(MemoryKv::new()));
        assert_eq!(api.status().await.unwrap(), json!({"pending": "0x0", "queued": "0x0"}));
    }

    #[tokio::test]
    async fn content_has_empty_queued_bucket() {
        let kv = Arc::new(MemoryKv::new());
        let signer = PrivateKeySigner::random();
        let pool = PoolStore::new(kv.clone());
        pool.insert(&signed_legacy(&signer, 3, 10, Some(1337)), signer.address()).await.unwrap();

        let api = api(kv);
        let content = api.content().await.unwrap();
        assert_eq!(content["queued"], json!({}));

        let sender = crate::store::address_hex(&signer.address());
        assert!(content["pending"][&sender]["3"].is_object());
        assert!(content["pending"][&sender]["3"]["blockHash"].is_null());
    }

    #[tokio::test]
    async fn inspect_formats_summary_line() {
        let kv = Arc::new(MemoryKv::new());
        let signer = PrivateKeySigner::random();
        let pool = PoolStore::new(kv.clone());
        let tx = signed_legacy(&signer, 0, 7, Some(1337));
        pool.insert(&tx, signer.address()).await.unwrap();

        let api = api(kv);
        let inspected = api.inspect().await.unwrap();
        let sender = crate::store::address_hex(&signer.address());
        let line = inspected["pending"][&sender]["0"].as_str().unwrap();
        assert!(line.ends_with("1 wei + 21000 gas × 7 wei"), "line: {line}");
    }
}
