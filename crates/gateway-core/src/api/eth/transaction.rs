//! Transaction and receipt queries.

use super::{to_value, EthApi};
use crate::{
    api::{
        types::{RpcReceipt, RpcTransaction},
        BlockTag,
    },
    rpc::{MethodRegistry, RpcError},
    store::StoreError,
};
use alloy_primitives::{B256, U64};
use serde_json::Value;
use std::sync::Arc;

impl EthApi {
    /// A transaction that is indexed resolves with its block
    /// coordinates; one that only exists in the pool resolves as a
    /// pending representation with null coordinates; anything else is
    /// `null`.
    pub async fn get_transaction_by_hash(&self, hash: B256) -> Result<Value, RpcError> {
        let tx = match self.txs.transaction(&hash).await {
            Ok(tx) => tx,
            Err(StoreError::NotFound) => {
                return match self.pool.get(&hash).await {
                    Ok(pool_tx) => to_value(&RpcTransaction::pending(&pool_tx)),
                    Err(StoreError::NotFound) => Ok(Value::Null),
                    Err(err) => {
                        Err(RpcError::internal(format!("failed to get transaction: {err}")))
                    }
                };
            }
            Err(err) => return Err(RpcError::internal(format!("failed to get transaction: {err}"))),
        };

        match self.txs.lookup(&hash).await {
            Ok(lookup) => to_value(&RpcTransaction::from_envelope(
                &tx,
                Some((lookup.block_hash, lookup.block_number, lookup.index)),
            )),
            Err(StoreError::NotFound) => to_value(&RpcTransaction::pending(&tx)),
            Err(err) => Err(RpcError::internal(format!("failed to get transaction lookup: {err}"))),
        }
    }

    pub async fn get_transaction_by_block_hash_and_index(
        &self,
        block_hash: B256,
        index: u64,
    ) -> Result<Value, RpcError> {
        let tx = match self.txs.by_block_hash_and_index(&block_hash, index).await {
            Ok(tx) => tx,
            Err(StoreError::NotFound) => return Ok(Value::Null),
            Err(err) => return Err(RpcError::internal(format!("failed to get transaction: {err}"))),
        };

        let number = self
            .blocks
            .height_by_hash(&block_hash)
            .await
            .map_err(|e| RpcError::internal(format!("failed to get block number: {e}")))?;
        to_value(&RpcTransaction::from_envelope(&tx, Some((block_hash, number, index))))
    }

    pub async fn get_transaction_by_block_number_and_index(
        &self,
        tag: &str,
        index: u64,
    ) -> Result<Value, RpcError> {
        let height = self.resolve_height(BlockTag::parse(tag)?).await?;

        let tx = match self.txs.by_block_number_and_index(height, index).await {
            Ok(tx) => tx,
            Err(StoreError::NotFound) => return Ok(Value::Null),
            Err(err) => return Err(RpcError::internal(format!("failed to get transaction: {err}"))),
        };

        let header = self
            .blocks
            .header(height)
            .await
            .map_err(|e| RpcError::internal(format!("failed to get block header: {e}")))?;
        to_value(&RpcTransaction::from_envelope(
            &tx,
            Some((header.hash_slow(), height, index)),
        ))
    }

    pub async fn get_transaction_receipt(&self, hash: B256) -> Result<Value, RpcError> {
        let entry = match self.txs.receipt(&hash).await {
            Ok(entry) => entry,
            Err(StoreError::NotFound) => return Ok(Value::Null),
            Err(err) => return Err(RpcError::internal(format!("failed to get receipt: {err}"))),
        };

        let tx = self
            .txs
            .transaction(&hash)
            .await
            .map_err(|e| RpcError::internal(format!("failed to get transaction: {e}")))?;
        to_value(&RpcReceipt::new(&entry, &tx))
    }
}

pub(super) fn register(registry: &mut MethodRegistry, api: &Arc<EthApi>) {
    registry.register("eth", "getTransactionByHash", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let hash: B256 = params.bind_required(0)?;
                api.get_transaction_by_hash(hash).await
            }
        }
    });

    registry.register("eth", "getTransactionByBlockHashAndIndex", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let hash: B256 = params.bind_required(0)?;
                let index: U64 = params.bind(1)?;
                api.get_transaction_by_block_hash_and_index(hash, index.to::<u64>()).await
            }
        }
    });

    registry.register("eth", "getTransactionByBlockNumberAndIndex", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let tag: String = params.bind_required(0)?;
                let index: U64 = params.bind(1)?;
                api.get_transaction_by_block_number_and_index(&tag, index.to::<u64>()).await
            }
        }
    });

    registry.register("eth", "getTransactionReceipt", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let hash: B256 = params.bind_required(0)?;
                api.get_transaction_receipt(hash).await
            }
        }
    });
}
