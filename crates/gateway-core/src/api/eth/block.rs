//! Block queries.

use super::{to_value, EthApi};
use crate::{
    api::{
        types::{hex_u64, RpcBlock},
        BlockTag,
    },
    rpc::{MethodRegistry, RpcError},
    store::StoreError,
};
use alloy_primitives::B256;
use serde_json::Value;
use std::sync::Arc;

impl EthApi {
    pub async fn block_number(&self) -> Result<Value, RpcError> {
        Ok(Value::String(hex_u64(self.latest_height().await?)))
    }

    pub async fn chain_id(&self) -> Result<Value, RpcError> {
        Ok(Value::String(hex_u64(self.chain_id)))
    }

    pub async fn get_block_by_number(&self, tag: &str, full: bool) -> Result<Value, RpcError> {
        let height = self.resolve_height(BlockTag::parse(tag)?).await?;
        match self.blocks.block(height).await {
            Ok(block) => to_value(&RpcBlock::from_block(&block, full)),
            Err(StoreError::NotFound) => Ok(Value::Null),
            Err(err) => Err(RpcError::internal(format!("failed to get block: {err}"))),
        }
    }

    pub async fn get_block_by_hash(&self, hash: B256, full: bool) -> Result<Value, RpcError> {
        match self.blocks.block_by_hash(&hash).await {
            Ok(block) => to_value(&RpcBlock::from_block(&block, full)),
            Err(StoreError::NotFound) => Ok(Value::Null),
            Err(err) => Err(RpcError::internal(format!("failed to get block: {err}"))),
        }
    }

    pub async fn get_block_transaction_count_by_number(
        &self,
        tag: &str,
    ) -> Result<Value, RpcError> {
        let height = self.resolve_height(BlockTag::parse(tag)?).await?;
        match self.blocks.transaction_count(height).await {
            Ok(count) => Ok(Value::String(hex_u64(count))),
            Err(StoreError::NotFound) => Ok(Value::Null),
            Err(err) => {
                Err(RpcError::internal(format!("failed to get transaction count: {err}")))
            }
        }
    }

    pub async fn get_block_transaction_count_by_hash(
        &self,
        hash: B256,
    ) -> Result<Value, RpcError> {
        match self.blocks.transaction_count_by_hash(&hash).await {
            Ok(count) => Ok(Value::String(hex_u64(count))),
            Err(StoreError::NotFound) => Ok(Value::Null),
            Err(err) => {
                Err(RpcError::internal(format!("failed to get transaction count: {err}")))
            }
        }
    }

    /// Uncles do not exist post-merge; the count is always zero for
    /// blocks the store knows about.
    pub async fn get_uncle_count_by_block_number(&self, tag: &str) -> Result<Value, RpcError> {
        let height = self.resolve_height(BlockTag::parse(tag)?).await?;
        match self.blocks.header(height).await {
            Ok(_) | Err(StoreError::NotFound) => Ok(Value::String(hex_u64(0))),
            Err(err) => Err(RpcError::internal(format!("failed to get block: {err}"))),
        }
    }

    pub async fn get_uncle_count_by_block_hash(&self, hash: B256) -> Result<Value, RpcError> {
        match self.blocks.height_by_hash(&hash).await {
            Ok(_) | Err(StoreError::NotFound) => Ok(Value::String(hex_u64(0))),
            Err(err) => Err(RpcError::internal(format!("failed to get block: {err}"))),
        }
    }
}

pub(super) fn register(registry: &mut MethodRegistry, api: &Arc<EthApi>) {
    registry.register("eth", "blockNumber", {
        let api = Arc::clone(api);
        move |_ctx, _params| {
            let api = Arc::clone(&api);
            async move { api.block_number().await }
        }
    });

    registry.register("eth", "chainId", {
        let api = Arc::clone(api);
        move |_ctx, _params| {
            let api = Arc::clone(&api);
            async move { api.chain_id().await }
        }
    });

    registry.register("eth", "getBlockByNumber", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let tag: String = params.bind_required(0)?;
                let full: bool = params.bind(1)?;
                api.get_block_by_number(&tag, full).await
            }
        }
    });

    registry.register("eth", "getBlockByHash", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let hash: B256 = params.bind_required(0)?;
                let full: bool = params.bind(1)?;
                api.get_block_by_hash(hash, full).await
            }
        }
    });

    registry.register("eth", "getBlockTransactionCountByNumber", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let tag: String = params.bind_required(0)?;
                api.get_block_transaction_count_by_number(&tag).await
            }
        }
    });

    registry.register("eth", "getBlockTransactionCountByHash", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let hash: B256 = params.bind_required(0)?;
                api.get_block_transaction_count_by_hash(hash).await
            }
        }
    });

    registry.register("eth", "getUncleCountByBlockNumber", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let tag: String = params.bind_required(0)?;
                api.get_uncle_count_by_block_number(&tag).await
            }
        }
    });

    registry.register("eth", "getUncleCountByBlockHash", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let hash: B256 = params.bind_required(0)?;
                api.get_uncle_count_by_block_hash(hash).await
            }
        }
    });
}
