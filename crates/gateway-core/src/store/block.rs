//! Block read path: height index, headers, bodies and receipts.

use super::{keys, BlockBody, SealedBlock, StoreError, StoredReceipt};
use crate::{
    cache::{BlockKey, CacheManager},
    kv::Kv,
};
use alloy_consensus::Header;
use alloy_primitives::B256;
use alloy_rlp::Decodable;
use std::sync::Arc;

pub struct BlockReader {
    kv: Arc<dyn Kv>,
    cache: Option<Arc<CacheManager>>,
}

fn parse_decimal(data: &[u8]) -> Result<u64, StoreError> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| StoreError::InvalidData(format!("invalid decimal index value: {data:?}")))
}

impl BlockReader {
    pub fn new(kv: Arc<dyn Kv>, cache: Option<Arc<CacheManager>>) -> Self {
        Self { kv, cache }
    }

    /// Height of the most recent indexed block, from `idx:latest`.
    pub async fn latest_height(&self) -> Result<u64, StoreError> {
        let data = self.kv.get(keys::IDX_LATEST).await?;
        parse_decimal(&data)
    }

    pub async fn height_by_hash(&self, hash: &B256) -> Result<u64, StoreError> {
        let data = self.kv.get(&keys::block_hash_index(hash)).await?;
        parse_decimal(&data)
    }

    pub async fn header(&self, number: u64) -> Result<Header, StoreError> {
        let data = self.kv.get(&keys::header(number)).await?;
        Ok(Header::decode(&mut data.as_slice())?)
    }

    pub async fn body(&self, number: u64) -> Result<BlockBody, StoreError> {
        let data = self.kv.get(&keys::body(number)).await?;
        Ok(BlockBody::decode(&mut data.as_slice())?)
    }

    /// Full block: header rehydrated with the body's transactions.
    pub async fn block(&self, number: u64) -> Result<Arc<SealedBlock>, StoreError> {
        if let Some(cache) = &self.cache {
            if let Some(block) = cache.block(BlockKey::Height(number)) {
                return Ok(block);
            }
        }

        let header = self.header(number).await?;
        let body = self.body(number).await?;
        let block = Arc::new(SealedBlock::new(header, body));

        if let Some(cache) = &self.cache {
            cache.put_block(Arc::clone(&block));
        }
        Ok(block)
    }

    pub async fn block_by_hash(&self, hash: &B256) -> Result<Arc<SealedBlock>, StoreError> {
        if let Some(cache) = &self.cache {
            if let Some(block) = cache.block(BlockKey::Hash(*hash)) {
                return Ok(block);
            }
        }

        let number = self.height_by_hash(hash).await?;
        self.block(number).await
    }

    pub async fn receipts(&self, number: u64) -> Result<Vec<StoredReceipt>, StoreError> {
        let data = self.kv.get(&keys::receipts(number)).await?;
        Ok(Vec::<StoredReceipt>::decode(&mut data.as_slice())?)
    }

    pub async fn transaction_count(&self, number: u64) -> Result<u64, StoreError> {
        Ok(self.body(number).await?.transactions.len() as u64)
    }

    pub async fn transaction_count_by_hash(&self, hash: &B256) -> Result<u64, StoreError> {
        let number = self.height_by_hash(hash).await?;
        self.transaction_count(number).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKv;
    use alloy_primitives::Bloom;
    use std::time::Duration;

    async fn seed_block(kv: &MemoryKv, number: u64) -> B256 {
        let header = Header { number, gas_limit: 30_000_000, ..Default::default() };
        let hash = header.hash_slow();
        let body = BlockBody::default();

        kv.set(&keys::header(number), &alloy_rlp::encode(&header), Duration::ZERO).await.unwrap();
        kv.set(&keys::body(number), &alloy_rlp::encode(&body), Duration::ZERO).await.unwrap();
        kv.set(&keys::block_hash_index(&hash), number.to_string().as_bytes(), Duration::ZERO)
            .await
            .unwrap();
        kv.set(keys::IDX_LATEST, number.to_string().as_bytes(), Duration::ZERO).await.unwrap();
        hash
    }

    #[tokio::test]
    async fn latest_height_parses_decimal() {
        let kv = Arc::new(MemoryKv::new());
        kv.set(keys::IDX_LATEST, b"256", Duration::ZERO).await.unwrap();

        let reader = BlockReader::new(kv, None);
        assert_eq!(reader.latest_height().await.unwrap(), 256);
    }

    #[tokio::test]
    async fn latest_height_missing_is_not_found() {
        let reader = BlockReader::new(Arc::new(MemoryKv::new()), None);
        assert!(matches!(reader.latest_height().await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn latest_height_garbage_is_invalid_data() {
        let kv = Arc::new(MemoryKv::new());
        kv.set(keys::IDX_LATEST, b"nope", Duration::ZERO).await.unwrap();

        let reader = BlockReader::new(kv, None);
        assert!(matches!(reader.latest_height().await, Err(StoreError::InvalidData(_))));
    }

    #[tokio::test]
    async fn block_round_trips_and_indexes_agree() {
        let kv = Arc::new(MemoryKv::new());
        let hash = seed_block(&kv, 42).await;

        let reader = BlockReader::new(kv, None);
        let by_number = reader.block(42).await.unwrap();
        assert_eq!(by_number.header.number, 42);
        assert_eq!(by_number.hash, hash);

        let by_hash = reader.block_by_hash(&hash).await.unwrap();
        assert_eq!(by_hash.header.number, 42);
        assert_eq!(reader.height_by_hash(&hash).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn block_reads_populate_cache() {
        let kv = Arc::new(MemoryKv::new());
        let hash = seed_block(&kv, 7).await;

        let cache = Arc::new(CacheManager::default());
        let reader = BlockReader::new(kv.clone(), Some(Arc::clone(&cache)));
        reader.block(7).await.unwrap();

        // Backing entry removed: the next read must be served by cache.
        kv.del(&keys::header(7)).await.unwrap();
        let cached = reader.block(7).await.unwrap();
        assert_eq!(cached.hash, hash);
    }

    #[tokio::test]
    async fn receipts_decode_stored_array() {
        let kv = Arc::new(MemoryKv::new());
        let receipts = vec![StoredReceipt {
            status: 1,
            cumulative_gas_used: 21_000,
            gas_used: 21_000,
            logs_bloom: Bloom::ZERO,
            logs: Vec::new(),
            ..Default::default()
        }];
        kv.set(&keys::receipts(3), &alloy_rlp::encode(&receipts), Duration::ZERO).await.unwrap();

        let reader = BlockReader::new(kv, None);
        let decoded = reader.receipts(3).await.unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].gas_used, 21_000);
    }
}
