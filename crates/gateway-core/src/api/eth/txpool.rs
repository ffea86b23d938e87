//! Write path of the `eth` namespace: raw transaction submission and
//! the pending list.

use super::{to_value, EthApi};
use crate::{
    api::types::RpcTransaction,
    rpc::{MethodRegistry, RpcError},
};
use alloy_primitives::Bytes;
use serde_json::Value;
use std::sync::Arc;

impl EthApi {
    pub async fn send_raw_transaction(&self, raw: Bytes) -> Result<Value, RpcError> {
        let hash = self.admission.admit(&raw).await?;
        to_value(&hash)
    }

    pub async fn pending_transactions(&self) -> Result<Value, RpcError> {
        let txs = self
            .pool
            .pending_by_price()
            .await
            .map_err(|e| RpcError::internal(format!("failed to get pending transactions: {e}")))?;
        let projected: Vec<RpcTransaction> = txs.iter().map(RpcTransaction::pending).collect();
        to_value(&projected)
    }
}

pub(super) fn register(registry: &mut MethodRegistry, api: &Arc<EthApi>) {
    registry.register("eth", "sendRawTransaction", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let raw: Bytes = params.bind_required(0)?;
                api.send_raw_transaction(raw).await
            }
        }
    });

    registry.register("eth", "pendingTransactions", {
        let api = Arc::clone(api);
        move |_ctx, _params| {
            let api = Arc::clone(&api);
            async move { api.pending_transactions().await }
        }
    });
}
