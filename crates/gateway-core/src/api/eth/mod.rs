//! The `eth` namespace.

mod block;
mod gas;
mod state;
mod transaction;
mod txpool;

use crate::{
    admission::AdmissionEngine,
    api::BlockTag,
    rpc::{code, MethodRegistry, RpcError},
    store::{BlockReader, PoolStore, StateReader, StoreError, TransactionReader},
};
use serde::Serialize;
use std::sync::Arc;

pub struct EthApi {
    blocks: Arc<BlockReader>,
    txs: Arc<TransactionReader>,
    state: Arc<StateReader>,
    pool: Arc<PoolStore>,
    admission: Arc<AdmissionEngine>,
    chain_id: u64,
}

impl EthApi {
    pub fn new(
        blocks: Arc<BlockReader>,
        txs: Arc<TransactionReader>,
        state: Arc<StateReader>,
        pool: Arc<PoolStore>,
        admission: Arc<AdmissionEngine>,
        chain_id: u64,
    ) -> Self {
        Self { blocks, txs, state, pool, admission, chain_id }
    }

    async fn latest_height(&self) -> Result<u64, RpcError> {
        self.blocks.latest_height().await.map_err(|e| match e {
            StoreError::NotFound => RpcError::new(code::UNKNOWN_BLOCK, "latest block not indexed"),
            other => RpcError::internal(other.to_string()),
        })
    }

    /// `latest` and `pending` resolve through `idx:latest`, `earliest`
    /// is height zero, explicit heights pass through.
    async fn resolve_height(&self, tag: BlockTag) -> Result<u64, RpcError> {
        match tag {
            BlockTag::Latest | BlockTag::Pending => self.latest_height().await,
            BlockTag::Earliest => Ok(0),
            BlockTag::Number(number) => Ok(number),
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal(format!("encoding failed: {e}")))
}

pub fn register(registry: &mut MethodRegistry, api: &Arc<EthApi>) {
    block::register(registry, api);
    state::register(registry, api);
    transaction::register(registry, api);
    gas::register(registry, api);
    txpool::register(registry, api);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::types::CallArgs,
        kv::{memory::MemoryKv, Kv},
        rpc::code,
        store::{keys, txpool::tests::signed_legacy, TxLookup},
    };
    use alloy_consensus::Header;
    use alloy_eips::eip2718::Encodable2718;
    use alloy_primitives::{Bytes, B256};
    use alloy_signer_local::PrivateKeySigner;
    use serde_json::Value;
    use std::time::Duration;

    const CHAIN_ID: u64 = 1337;

    fn api(kv: Arc<MemoryKv>) -> EthApi {
        let kv: Arc<dyn Kv> = kv;
        let pool = Arc::new(PoolStore::new(kv.clone()));
        EthApi::new(
            Arc::new(BlockReader::new(kv.clone(), None)),
            Arc::new(TransactionReader::new(kv.clone(), None)),
            Arc::new(StateReader::new(kv.clone(), None)),
            pool.clone(),
            Arc::new(AdmissionEngine::new(
                Arc::new(StateReader::new(kv, None)),
                pool,
                CHAIN_ID,
            )),
            CHAIN_ID,
        )
    }

    async fn set_latest(kv: &MemoryKv, height: u64) {
        kv.set(keys::IDX_LATEST, height.to_string().as_bytes(), Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_block_is_null() {
        let api = api(Arc::new(MemoryKv::new()));
        assert_eq!(api.get_block_by_number("0x5", false).await.unwrap(), Value::Null);
        assert_eq!(api.get_block_by_hash(B256::ZERO, false).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn invalid_tag_is_invalid_params() {
        let api = api(Arc::new(MemoryKv::new()));
        let err = api.get_block_by_number("100", false).await.unwrap_err();
        assert_eq!(err.code, code::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn latest_tag_resolves_through_index() {
        let kv = Arc::new(MemoryKv::new());
        set_latest(&kv, 12).await;
        let header = Header { number: 12, ..Default::default() };
        kv.set(&keys::header(12), &alloy_rlp::encode(&header), Duration::ZERO).await.unwrap();
        kv.set(
            &keys::body(12),
            &alloy_rlp::encode(&crate::store::BlockBody::default()),
            Duration::ZERO,
        )
        .await
        .unwrap();

        let api = api(kv);
        let block = api.get_block_by_number("latest", false).await.unwrap();
        assert_eq!(block["number"], "0xc");
    }

    #[tokio::test]
    async fn pool_only_transaction_reads_as_pending() {
        let kv = Arc::new(MemoryKv::new());
        let api = api(kv.clone());

        let signer = PrivateKeySigner::random();
        let tx = signed_legacy(&signer, 0, 10, Some(CHAIN_ID));
        let hash = *tx.tx_hash();
        PoolStore::new(kv).insert(&tx, signer.address()).await.unwrap();

        let found = api.get_transaction_by_hash(hash).await.unwrap();
        assert!(found["blockHash"].is_null());
        assert!(found["blockNumber"].is_null());
        assert!(found["transactionIndex"].is_null());
        assert_eq!(found["hash"], crate::store::hash_hex(&hash));
    }

    #[tokio::test]
    async fn mined_transaction_carries_block_coordinates() {
        let kv = Arc::new(MemoryKv::new());
        let signer = PrivateKeySigner::random();
        let tx = signed_legacy(&signer, 0, 10, Some(CHAIN_ID));
        let hash = *tx.tx_hash();
        let block_hash = B256::repeat_byte(0x0b);

        kv.set(&keys::transaction(&hash), &alloy_rlp::encode(&tx), Duration::ZERO)
            .await
            .unwrap();
        kv.set(
            &keys::tx_lookup(&hash),
            &serde_json::to_vec(&TxLookup { block_number: 8, block_hash, index: 0 }).unwrap(),
            Duration::ZERO,
        )
        .await
        .unwrap();

        let api = api(kv);
        let found = api.get_transaction_by_hash(hash).await.unwrap();
        assert_eq!(found["blockNumber"], "0x8");
        assert_eq!(found["transactionIndex"], "0x0");
    }

    #[tokio::test]
    async fn missing_transaction_is_null() {
        let api = api(Arc::new(MemoryKv::new()));
        assert_eq!(api.get_transaction_by_hash(B256::ZERO).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn fee_history_result_shape() {
        let kv = Arc::new(MemoryKv::new());
        set_latest(&kv, 100).await;

        let api = api(kv);
        let result = api.fee_history(3, "latest", vec![25.0, 75.0]).await.unwrap();
        assert_eq!(result["oldestBlock"], "0x62");
        assert_eq!(result["baseFeePerGas"].as_array().unwrap().len(), 4);
        assert_eq!(result["gasUsedRatio"].as_array().unwrap().len(), 3);

        let reward = result["reward"].as_array().unwrap();
        assert_eq!(reward.len(), 3);
        assert_eq!(reward[0].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn fee_history_without_percentiles_omits_reward() {
        let kv = Arc::new(MemoryKv::new());
        set_latest(&kv, 100).await;

        let api = api(kv);
        let result = api.fee_history(2, "latest", Vec::new()).await.unwrap();
        assert!(result.get("reward").is_none());
    }

    #[tokio::test]
    async fn fee_history_rejects_oversized_count() {
        let kv = Arc::new(MemoryKv::new());
        set_latest(&kv, 100).await;

        let api = api(kv);
        let err = api.fee_history(1025, "latest", Vec::new()).await.unwrap_err();
        assert_eq!(err.code, code::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn estimate_gas_stub_values() {
        let api = api(Arc::new(MemoryKv::new()));

        let transfer = api.estimate_gas(CallArgs::default()).await.unwrap();
        assert_eq!(transfer, "0x5208");

        let call = api
            .estimate_gas(CallArgs {
                input: Some(Bytes::from_static(&[0x01])),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(call, "0xc350");
    }

    #[tokio::test]
    async fn send_raw_transaction_rejects_wrong_chain_id() {
        let kv = Arc::new(MemoryKv::new());
        let signer = PrivateKeySigner::random();
        let record = br#"{"nonce":0,"balance":"1000000000000000000","codeHash":""}"#;
        kv.set(&keys::account("latest", &signer.address()), record, Duration::ZERO)
            .await
            .unwrap();

        let api = api(kv);
        let raw = signed_legacy(&signer, 0, 10, Some(999)).encoded_2718();
        let err = api.send_raw_transaction(Bytes::from(raw)).await.unwrap_err();
        assert_eq!(err.code, code::INVALID_INPUT);
        assert!(err.message.contains("invalid chain id"));
    }

    #[tokio::test]
    async fn uncle_counts_are_zero() {
        let kv = Arc::new(MemoryKv::new());
        set_latest(&kv, 1).await;

        let api = api(kv);
        assert_eq!(api.get_uncle_count_by_block_number("latest").await.unwrap(), "0x0");
        assert_eq!(api.get_uncle_count_by_block_hash(B256::ZERO).await.unwrap(), "0x0");
    }
}
