//! Transaction read path: blobs, lookup records and receipts.

use super::{keys, BlockBody, ReceiptEntry, StoreError, StoredReceipt, TxLookup};
use crate::{cache::CacheManager, kv::Kv};
use alloy_consensus::TxEnvelope;
use alloy_primitives::B256;
use alloy_rlp::Decodable;
use std::sync::Arc;

pub struct TransactionReader {
    kv: Arc<dyn Kv>,
    cache: Option<Arc<CacheManager>>,
}

impl TransactionReader {
    pub fn new(kv: Arc<dyn Kv>, cache: Option<Arc<CacheManager>>) -> Self {
        Self { kv, cache }
    }

    pub async fn transaction(&self, hash: &B256) -> Result<Arc<TxEnvelope>, StoreError> {
        if let Some(cache) = &self.cache {
            if let Some(tx) = cache.transaction(hash) {
                return Ok(tx);
            }
        }

        let data = self.kv.get(&keys::transaction(hash)).await?;
        let tx = Arc::new(TxEnvelope::decode(&mut data.as_slice())?);

        if let Some(cache) = &self.cache {
            cache.put_transaction(*hash, Arc::clone(&tx));
        }
        Ok(tx)
    }

    /// Where the transaction was mined. Missing for transactions that
    /// are only in the pool.
    pub async fn lookup(&self, hash: &B256) -> Result<TxLookup, StoreError> {
        let data = self.kv.get(&keys::tx_lookup(hash)).await?;
        serde_json::from_slice(&data)
            .map_err(|e| StoreError::InvalidData(format!("tx lookup: {e}")))
    }

    /// Receipt for a mined transaction, resolved through the lookup
    /// record and the block's positional receipts array. An index past
    /// the end of the array is `NotFound`.
    pub async fn receipt(&self, hash: &B256) -> Result<Arc<ReceiptEntry>, StoreError> {
        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.receipt(hash) {
                return Ok(entry);
            }
        }

        let lookup = self.lookup(hash).await?;
        let data = self.kv.get(&keys::receipts(lookup.block_number)).await?;
        let mut receipts = Vec::<StoredReceipt>::decode(&mut data.as_slice())?;

        let index = usize::try_from(lookup.index).map_err(|_| StoreError::NotFound)?;
        if index >= receipts.len() {
            return Err(StoreError::NotFound);
        }
        let first_log_index =
            receipts[..index].iter().map(|r| r.logs.len() as u64).sum::<u64>();
        let entry = Arc::new(ReceiptEntry {
            receipt: receipts.swap_remove(index),
            lookup,
            first_log_index,
        });

        if let Some(cache) = &self.cache {
            cache.put_receipt(*hash, Arc::clone(&entry));
        }
        Ok(entry)
    }

    pub async fn by_block_number_and_index(
        &self,
        number: u64,
        index: u64,
    ) -> Result<TxEnvelope, StoreError> {
        let data = self.kv.get(&keys::body(number)).await?;
        let body = BlockBody::decode(&mut data.as_slice())?;

        let index = usize::try_from(index).map_err(|_| StoreError::NotFound)?;
        body.transactions.into_iter().nth(index).ok_or(StoreError::NotFound)
    }

    pub async fn by_block_hash_and_index(
        &self,
        block_hash: &B256,
        index: u64,
    ) -> Result<TxEnvelope, StoreError> {
        let data = self.kv.get(&keys::block_hash_index(block_hash)).await?;
        let number = std::str::from_utf8(&data)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or_else(|| StoreError::InvalidData("invalid block number index".to_string()))?;
        self.by_block_number_and_index(number, index).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKv;
    use alloy_primitives::Bloom;
    use std::time::Duration;

    fn lookup_json(number: u64, block_hash: B256, index: u64) -> Vec<u8> {
        serde_json::to_vec(&TxLookup { block_number: number, block_hash, index }).unwrap()
    }

    #[tokio::test]
    async fn lookup_round_trips() {
        let kv = Arc::new(MemoryKv::new());
        let tx_hash = B256::repeat_byte(0xaa);
        let block_hash = B256::repeat_byte(0xbb);
        kv.set(&keys::tx_lookup(&tx_hash), &lookup_json(9, block_hash, 2), Duration::ZERO)
            .await
            .unwrap();

        let reader = TransactionReader::new(kv, None);
        let lookup = reader.lookup(&tx_hash).await.unwrap();
        assert_eq!(lookup.block_number, 9);
        assert_eq!(lookup.block_hash, block_hash);
        assert_eq!(lookup.index, 2);
    }

    #[tokio::test]
    async fn receipt_index_out_of_range_is_not_found() {
        let kv = Arc::new(MemoryKv::new());
        let tx_hash = B256::repeat_byte(0x01);
        kv.set(&keys::tx_lookup(&tx_hash), &lookup_json(5, B256::ZERO, 3), Duration::ZERO)
            .await
            .unwrap();

        let receipts = vec![StoredReceipt {
            status: 1,
            logs_bloom: Bloom::ZERO,
            ..Default::default()
        }];
        kv.set(&keys::receipts(5), &alloy_rlp::encode(&receipts), Duration::ZERO).await.unwrap();

        let reader = TransactionReader::new(kv, None);
        assert!(matches!(reader.receipt(&tx_hash).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn receipt_resolves_positional_entry() {
        let kv = Arc::new(MemoryKv::new());
        let tx_hash = B256::repeat_byte(0x02);
        kv.set(&keys::tx_lookup(&tx_hash), &lookup_json(5, B256::ZERO, 1), Duration::ZERO)
            .await
            .unwrap();

        let receipts = vec![
            StoredReceipt { gas_used: 100, ..Default::default() },
            StoredReceipt { gas_used: 200, ..Default::default() },
        ];
        kv.set(&keys::receipts(5), &alloy_rlp::encode(&receipts), Duration::ZERO).await.unwrap();

        let reader = TransactionReader::new(kv, None);
        let entry = reader.receipt(&tx_hash).await.unwrap();
        assert_eq!(entry.receipt.gas_used, 200);
        assert_eq!(entry.lookup.index, 1);
    }

    #[tokio::test]
    async fn receipt_counts_preceding_logs() {
        use alloy_primitives::{Address, Log, LogData};

        let kv = Arc::new(MemoryKv::new());
        let tx_hash = B256::repeat_byte(0x03);
        kv.set(&keys::tx_lookup(&tx_hash), &lookup_json(6, B256::ZERO, 1), Duration::ZERO)
            .await
            .unwrap();

        let log = Log {
            address: Address::ZERO,
            data: LogData::new_unchecked(vec![B256::ZERO], Default::default()),
        };
        let receipts = vec![
            StoredReceipt { logs: vec![log.clone(), log.clone()], ..Default::default() },
            StoredReceipt { logs: vec![log], ..Default::default() },
        ];
        kv.set(&keys::receipts(6), &alloy_rlp::encode(&receipts), Duration::ZERO).await.unwrap();

        let reader = TransactionReader::new(kv, None);
        let entry = reader.receipt(&tx_hash).await.unwrap();
        assert_eq!(entry.first_log_index, 2);
    }

    #[tokio::test]
    async fn missing_transaction_is_not_found() {
        let reader = TransactionReader::new(Arc::new(MemoryKv::new()), None);
        let result = reader.transaction(&B256::ZERO).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }
}
