//! Pending-transaction pool over the KV store.
//!
//! An admitted transaction is written as three records: the RLP blob
//! under `pool:pending:{hash}`, a per-sender sorted-set entry scored
//! by nonce, and a global sorted-set entry scored by gas price. The
//! writes are best-effort; no cross-key transaction is required
//! because the blob encoding is deterministic and re-admission of the
//! same hash rewrites identical bytes. Admission ends by publishing
//! the hash on `pool:new`.

use super::{hash_hex, keys, StoreError};
use crate::kv::Kv;
use alloy_consensus::{transaction::SignerRecoverable, Transaction, TxEnvelope};
use alloy_primitives::{Address, B256};
use alloy_rlp::Decodable;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tracing::debug;

/// Fee used for balance accounting: the gas price for legacy
/// transactions, the fee cap for dynamic-fee ones.
pub fn effective_gas_price(tx: &TxEnvelope) -> u128 {
    tx.gas_price().unwrap_or_else(|| tx.max_fee_per_gas())
}

/// Pool content grouped sender -> nonce (as decimal string) -> tx.
pub type PoolContent = BTreeMap<String, BTreeMap<String, TxEnvelope>>;

pub struct PoolStore {
    kv: Arc<dyn Kv>,
}

impl PoolStore {
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        Self { kv }
    }

    /// Indexes an admitted transaction and publishes `pool:new`.
    pub async fn insert(&self, tx: &TxEnvelope, sender: Address) -> Result<B256, StoreError> {
        let hash = *tx.tx_hash();
        let member = hash_hex(&hash);
        let blob = alloy_rlp::encode(tx);

        self.kv.set(&keys::pool_pending(&hash), &blob, Duration::ZERO).await?;
        self.kv.zadd(&keys::pool_address(&sender), &member, tx.nonce() as f64).await?;
        self.kv.zadd(keys::POOL_BY_PRICE, &member, effective_gas_price(tx) as f64).await?;
        self.kv.publish(keys::CHANNEL_POOL_NEW, &member).await?;

        debug!(tx = %member, nonce = tx.nonce(), "transaction admitted to pool");
        Ok(hash)
    }

    pub async fn get(&self, hash: &B256) -> Result<TxEnvelope, StoreError> {
        let data = self.kv.get(&keys::pool_pending(hash)).await?;
        Ok(TxEnvelope::decode(&mut data.as_slice())?)
    }

    /// Reverses the three admission writes.
    pub async fn remove(&self, hash: &B256) -> Result<(), StoreError> {
        let tx = self.get(hash).await?;
        let sender = tx
            .recover_signer()
            .map_err(|e| StoreError::InvalidData(format!("unrecoverable pool entry: {e}")))?;

        let member = hash_hex(hash);
        self.kv.del(&keys::pool_pending(hash)).await?;
        self.kv.zrem(&keys::pool_address(&sender), &member).await?;
        self.kv.zrem(keys::POOL_BY_PRICE, &member).await?;
        Ok(())
    }

    pub async fn pending_count(&self) -> Result<u64, StoreError> {
        Ok(self.kv.zcard(keys::POOL_BY_PRICE).await?)
    }

    /// All pending transactions, highest gas price first. Hashes that
    /// no longer resolve to a blob are skipped.
    pub async fn pending_by_price(&self) -> Result<Vec<TxEnvelope>, StoreError> {
        let members = self.kv.zrevrange(keys::POOL_BY_PRICE, 0, -1).await?;
        self.resolve(&members).await
    }

    /// Pending transactions for one sender, ascending by nonce.
    pub async fn pending_for_sender(&self, sender: &Address) -> Result<Vec<TxEnvelope>, StoreError> {
        let members = self.kv.zrange(&keys::pool_address(sender), 0, -1).await?;
        self.resolve(&members).await
    }

    /// Grouped pool content. The `queued` bucket of the RPC schema is
    /// produced by the API layer and is always empty.
    pub async fn content(&self) -> Result<PoolContent, StoreError> {
        let mut grouped: PoolContent = BTreeMap::new();
        for tx in self.pending_by_price().await? {
            let Ok(sender) = tx.recover_signer() else {
                continue;
            };
            grouped
                .entry(super::address_hex(&sender))
                .or_default()
                .insert(tx.nonce().to_string(), tx);
        }
        Ok(grouped)
    }

    async fn resolve(&self, members: &[String]) -> Result<Vec<TxEnvelope>, StoreError> {
        let pool_keys: Vec<String> = members
            .iter()
            .filter_map(|m| {
                let hash: B256 = m.parse().ok()?;
                Some(keys::pool_pending(&hash))
            })
            .collect();

        let blobs = self.kv.mget(&pool_keys).await?;
        let mut txs = Vec::with_capacity(blobs.len());
        for blob in blobs.into_iter().flatten() {
            match TxEnvelope::decode(&mut blob.as_slice()) {
                Ok(tx) => txs.push(tx),
                Err(err) => debug!(error = %err, "skipping undecodable pool entry"),
            }
        }
        Ok(txs)
    }
}
