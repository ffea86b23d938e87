//! Account state queries.

use super::{to_value, EthApi};
use crate::{
    api::{
        types::{hex_u256, hex_u64},
        BlockTag,
    },
    rpc::{MethodRegistry, RpcError},
};
use alloy_primitives::{Address, B256};
use serde_json::Value;
use std::sync::Arc;

impl EthApi {
    pub async fn get_balance(&self, address: Address, tag: &str) -> Result<Value, RpcError> {
        let height = BlockTag::parse(tag)?.state_key();
        let balance = self
            .state
            .balance(&address, &height)
            .await
            .map_err(|e| RpcError::internal(format!("failed to get balance: {e}")))?;
        Ok(Value::String(hex_u256(&balance)))
    }

    pub async fn get_code(&self, address: Address, tag: &str) -> Result<Value, RpcError> {
        let height = BlockTag::parse(tag)?.state_key();
        let code = self
            .state
            .code(&address, &height)
            .await
            .map_err(|e| RpcError::internal(format!("failed to get code: {e}")))?;
        to_value(&code)
    }

    pub async fn get_storage_at(
        &self,
        address: Address,
        slot: B256,
        tag: &str,
    ) -> Result<Value, RpcError> {
        let height = BlockTag::parse(tag)?.state_key();
        let word = self
            .state
            .storage(&address, &slot, &height)
            .await
            .map_err(|e| RpcError::internal(format!("failed to get storage: {e}")))?;
        to_value(&word)
    }

    pub async fn get_transaction_count(
        &self,
        address: Address,
        tag: &str,
    ) -> Result<Value, RpcError> {
        let height = BlockTag::parse(tag)?.state_key();
        let nonce = self
            .state
            .nonce(&address, &height)
            .await
            .map_err(|e| RpcError::internal(format!("failed to get nonce: {e}")))?;
        Ok(Value::String(hex_u64(nonce)))
    }
}

pub(super) fn register(registry: &mut MethodRegistry, api: &Arc<EthApi>) {
    registry.register("eth", "getBalance", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let address: Address = params.bind_required(0)?;
                let tag: String = params.bind_required(1)?;
                api.get_balance(address, &tag).await
            }
        }
    });

    registry.register("eth", "getCode", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let address: Address = params.bind_required(0)?;
                let tag: String = params.bind_required(1)?;
                api.get_code(address, &tag).await
            }
        }
    });

    registry.register("eth", "getStorageAt", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let address: Address = params.bind_required(0)?;
                let slot: B256 = params.bind_required(1)?;
                let tag: String = params.bind_required(2)?;
                api.get_storage_at(address, slot, &tag).await
            }
        }
    });

    registry.register("eth", "getTransactionCount", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let address: Address = params.bind_required(0)?;
                let tag: String = params.bind_required(1)?;
                api.get_transaction_count(address, &tag).await
            }
        }
    });
}
