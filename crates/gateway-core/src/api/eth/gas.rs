//! Gas pricing. The chain this gateway fronts runs a fixed fee
//! policy, so prices and the fee history are constant; gas estimation
//! does not execute bytecode and answers with the transfer floor or a
//! flat contract-call figure.

use super::{to_value, EthApi};
use crate::{
    api::{
        types::{hex_u128, hex_u64, CallArgs, FeeHistoryResult},
        BlockTag,
    },
    rpc::{MethodRegistry, RpcError},
};
use alloy_primitives::U64;
use serde_json::Value;
use std::sync::Arc;

/// Fixed gas price: 5 gwei.
pub const GAS_PRICE_WEI: u128 = 5_000_000_000;
/// Fixed priority fee: 1 gwei.
pub const PRIORITY_FEE_WEI: u128 = 1_000_000_000;

const MAX_FEE_HISTORY_BLOCKS: u64 = 1024;
const TRANSFER_GAS: u64 = 21_000;
const CONTRACT_CALL_GAS: u64 = 50_000;

impl EthApi {
    pub async fn gas_price(&self) -> Result<Value, RpcError> {
        Ok(Value::String(hex_u128(GAS_PRICE_WEI)))
    }

    pub async fn max_priority_fee_per_gas(&self) -> Result<Value, RpcError> {
        Ok(Value::String(hex_u128(PRIORITY_FEE_WEI)))
    }

    pub async fn fee_history(
        &self,
        block_count: u64,
        last_block: &str,
        percentiles: Vec<f64>,
    ) -> Result<Value, RpcError> {
        let end = self.resolve_height(BlockTag::parse(last_block)?).await?;

        let mut count = block_count.max(1);
        if count > MAX_FEE_HISTORY_BLOCKS {
            return Err(RpcError::invalid_params(format!(
                "block count too large (max {MAX_FEE_HISTORY_BLOCKS})"
            )));
        }
        let oldest = if end >= count - 1 {
            end - count + 1
        } else {
            count = end + 1;
            0
        };

        let reward = (!percentiles.is_empty()).then(|| {
            vec![vec![hex_u128(PRIORITY_FEE_WEI); percentiles.len()]; count as usize]
        });

        to_value(&FeeHistoryResult {
            oldest_block: hex_u64(oldest),
            base_fee_per_gas: vec![hex_u128(GAS_PRICE_WEI); count as usize + 1],
            gas_used_ratio: vec![0.5; count as usize],
            reward,
        })
    }

    pub async fn estimate_gas(&self, args: CallArgs) -> Result<Value, RpcError> {
        let gas = match args.payload() {
            Some(data) if !data.is_empty() => CONTRACT_CALL_GAS,
            _ => TRANSFER_GAS,
        };
        Ok(Value::String(hex_u64(gas)))
    }
}

pub(super) fn register(registry: &mut MethodRegistry, api: &Arc<EthApi>) {
    registry.register("eth", "gasPrice", {
        let api = Arc::clone(api);
        move |_ctx, _params| {
            let api = Arc::clone(&api);
            async move { api.gas_price().await }
        }
    });

    registry.register("eth", "maxPriorityFeePerGas", {
        let api = Arc::clone(api);
        move |_ctx, _params| {
            let api = Arc::clone(&api);
            async move { api.max_priority_fee_per_gas().await }
        }
    });

    registry.register("eth", "feeHistory", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let count: U64 = params.bind(0)?;
                let last_block: String = params.bind_required(1)?;
                let percentiles: Vec<f64> = params.bind(2)?;
                api.fee_history(count.to::<u64>(), &last_block, percentiles).await
            }
        }
    });

    registry.register("eth", "estimateGas", {
        let api = Arc::clone(api);
        move |_ctx, params| {
            let api = Arc::clone(&api);
            async move {
                let args: CallArgs = params.bind(0)?;
                api.estimate_gas(args).await
            }
        }
    });
}
