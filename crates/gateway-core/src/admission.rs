//! Pre-pool validation of raw signed transactions.
//!
//! Order of checks: decode, signature recovery, chain id, nonce,
//! balance, gas floor. Decode, signature, chain-id and gas-floor
//! failures are `invalid input`; nonce and balance failures are
//! `transaction rejected`. A transaction that passes everything is
//! indexed in the pool and its hash published on `pool:new`.
//!
//! Nonce and balance are read at `latest` through an uncached state
//! reader; serving them from the read cache would let a stale value
//! admit a transaction the chain has already invalidated.

use crate::{
    rpc::RpcError,
    store::{effective_gas_price, PoolStore, StateReader},
};
use alloy_consensus::{transaction::SignerRecoverable, Transaction, TxEnvelope};
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{B256, U256};
use std::sync::Arc;
use tracing::info;

/// Minimum gas a plain transfer needs; anything below cannot execute.
pub const MIN_TX_GAS: u64 = 21_000;

pub struct AdmissionEngine {
    state: Arc<StateReader>,
    pool: Arc<PoolStore>,
    chain_id: u64,
}

impl AdmissionEngine {
    pub fn new(state: Arc<StateReader>, pool: Arc<PoolStore>, chain_id: u64) -> Self {
        Self { state, pool, chain_id }
    }

    /// Validates `raw` and, on success, writes it into the pool and
    /// returns its hash.
    pub async fn admit(&self, raw: &[u8]) -> Result<B256, RpcError> {
        if raw.is_empty() {
            return Err(RpcError::invalid_input("empty transaction data"));
        }

        let tx = TxEnvelope::decode_2718(&mut &raw[..])
            .map_err(|e| RpcError::invalid_input(format!("invalid transaction: {e}")))?;

        let sender = tx
            .recover_signer()
            .map_err(|e| RpcError::invalid_input(format!("invalid signature: {e}")))?;

        if let Some(chain_id) = tx.chain_id() {
            if chain_id != self.chain_id {
                return Err(RpcError::invalid_input(format!(
                    "invalid chain id: got {chain_id}, expected {}",
                    self.chain_id
                )));
            }
        }

        let current_nonce = self
            .state
            .nonce(&sender, "latest")
            .await
            .map_err(|e| RpcError::internal(format!("failed to read nonce: {e}")))?;
        if tx.nonce() < current_nonce {
            return Err(RpcError::transaction_rejected(format!(
                "nonce too low: got {}, expected >= {current_nonce}",
                tx.nonce()
            )));
        }

        let balance = self
            .state
            .balance(&sender, "latest")
            .await
            .map_err(|e| RpcError::internal(format!("failed to read balance: {e}")))?;
        let gas_cost =
            U256::from(effective_gas_price(&tx)) * U256::from(tx.gas_limit());
        let required = tx.value().saturating_add(gas_cost);
        if balance < required {
            return Err(RpcError::transaction_rejected(format!(
                "insufficient funds: balance={balance}, required={required}"
            )));
        }

        if tx.gas_limit() < MIN_TX_GAS {
            return Err(RpcError::invalid_input(format!(
                "gas limit too low: got {}, minimum {MIN_TX_GAS}",
                tx.gas_limit()
            )));
        }

        let hash = self
            .pool
            .insert(&tx, sender)
            .await
            .map_err(|e| RpcError::internal(format!("failed to add transaction: {e}")))?;

        info!(tx = %crate::store::hash_hex(&hash), sender = %sender, "transaction accepted");
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        kv::{memory::MemoryKv, Kv},
        rpc::code,
        store::keys,
    };
    use alloy_consensus::{SignableTransaction, TxLegacy};
    use alloy_eips::eip2718::Encodable2718;
    use alloy_primitives::{Address, Bytes, TxKind};
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use std::time::Duration;

    const CHAIN_ID: u64 = 1337;

    fn engine(kv: Arc<MemoryKv>) -> AdmissionEngine {
        AdmissionEngine::new(
            Arc::new(StateReader::new(kv.clone(), None)),
            Arc::new(PoolStore::new(kv)),
            CHAIN_ID,
        )
    }

    fn raw_tx(signer: &PrivateKeySigner, nonce: u64, gas_limit: u64, chain_id: u64) -> Vec<u8> {
        let tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price: 5_000_000_000,
            gas_limit,
            to: TxKind::Call(Address::repeat_byte(0x42)),
            value: U256::from(1_000u64),
            input: Bytes::new(),
        };
        let signature = signer.sign_hash_sync(&tx.signature_hash()).unwrap();
        TxEnvelope::Legacy(tx.into_signed(signature)).encoded_2718()
    }

    async fn fund(kv: &MemoryKv, address: Address, nonce: u64, balance: &str) {
        let record = format!(r#"{{"nonce":{nonce},"balance":"{balance}","codeHash":""}}"#);
        kv.set(&keys::account("latest", &address), record.as_bytes(), Duration::ZERO)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn valid_transaction_is_admitted_and_published() {
        let kv = Arc::new(MemoryKv::new());
        let signer = PrivateKeySigner::random();
        fund(&kv, signer.address(), 0, "1000000000000000000").await;

        let mut updates = kv.subscribe(&[keys::CHANNEL_POOL_NEW.to_string()]).await.unwrap();

        let engine = engine(kv.clone());
        let hash = engine.admit(&raw_tx(&signer, 0, 21_000, CHAIN_ID)).await.unwrap();

        use futures::StreamExt;
        let event = updates.next().await.unwrap();
        assert_eq!(event.payload, crate::store::hash_hex(&hash));
        assert!(kv.exists(&keys::pool_pending(&hash)).await.unwrap());
    }

    #[tokio::test]
    async fn garbage_bytes_are_invalid_input() {
        let engine = engine(Arc::new(MemoryKv::new()));
        let err = engine.admit(&[0xde, 0xad, 0xbe, 0xef]).await.unwrap_err();
        assert_eq!(err.code, code::INVALID_INPUT);
    }

    #[tokio::test]
    async fn wrong_chain_id_is_invalid_input() {
        let kv = Arc::new(MemoryKv::new());
        let signer = PrivateKeySigner::random();
        fund(&kv, signer.address(), 0, "1000000000000000000").await;

        let err = engine(kv).admit(&raw_tx(&signer, 0, 21_000, 999)).await.unwrap_err();
        assert_eq!(err.code, code::INVALID_INPUT);
        assert!(err.message.contains("invalid chain id"), "message: {}", err.message);
    }

    #[tokio::test]
    async fn stale_nonce_is_rejected() {
        let kv = Arc::new(MemoryKv::new());
        let signer = PrivateKeySigner::random();
        fund(&kv, signer.address(), 5, "1000000000000000000").await;

        let err = engine(kv).admit(&raw_tx(&signer, 4, 21_000, CHAIN_ID)).await.unwrap_err();
        assert_eq!(err.code, code::TRANSACTION_REJECTED);
        assert!(err.message.contains("nonce too low"));
    }

    #[tokio::test]
    async fn nonce_equal_or_above_current_is_accepted() {
        let kv = Arc::new(MemoryKv::new());
        let signer = PrivateKeySigner::random();
        fund(&kv, signer.address(), 5, "1000000000000000000").await;

        let engine = engine(kv);
        engine.admit(&raw_tx(&signer, 5, 21_000, CHAIN_ID)).await.unwrap();
        engine.admit(&raw_tx(&signer, 9, 21_000, CHAIN_ID)).await.unwrap();
    }

    #[tokio::test]
    async fn insufficient_balance_is_rejected() {
        let kv = Arc::new(MemoryKv::new());
        let signer = PrivateKeySigner::random();
        // Covers the value but not value + gas.
        fund(&kv, signer.address(), 0, "2000").await;

        let err = engine(kv).admit(&raw_tx(&signer, 0, 21_000, CHAIN_ID)).await.unwrap_err();
        assert_eq!(err.code, code::TRANSACTION_REJECTED);
        assert!(err.message.contains("insufficient funds"));
    }

    #[tokio::test]
    async fn gas_floor_is_enforced() {
        let kv = Arc::new(MemoryKv::new());
        let signer = PrivateKeySigner::random();
        fund(&kv, signer.address(), 0, "100000000000000000000").await;

        let err = engine(kv).admit(&raw_tx(&signer, 0, 20_999, CHAIN_ID)).await.unwrap_err();
        assert_eq!(err.code, code::INVALID_INPUT);
        assert!(err.message.contains("gas limit too low"));
    }

    #[tokio::test]
    async fn absent_account_cannot_fund_a_transfer() {
        let kv = Arc::new(MemoryKv::new());
        let signer = PrivateKeySigner::random();

        let err = engine(kv).admit(&raw_tx(&signer, 0, 21_000, CHAIN_ID)).await.unwrap_err();
        assert_eq!(err.code, code::TRANSACTION_REJECTED);
    }
}
