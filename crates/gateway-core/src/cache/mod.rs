//! Read caches, sharded by domain.
//!
//! Five caches sit in front of the KV readers: blocks (keyed by both
//! height and hash), transactions, receipts, balances and code. Each
//! has its own capacity and TTL. Only successful reads are cached; a
//! `not found` from the store is never masked by a cache entry.

mod ttl;

pub use ttl::{CacheStats, TtlCache};

use crate::store::{ReceiptEntry, SealedBlock};
use alloy_consensus::TxEnvelope;
use alloy_primitives::{Address, Bytes, B256, U256};
use std::{collections::HashMap, sync::Arc, time::Duration};

/// Sizing and TTL for each cache domain.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub block_capacity: usize,
    pub tx_capacity: usize,
    pub receipt_capacity: usize,
    pub balance_capacity: usize,
    pub code_capacity: usize,
    pub block_ttl: Duration,
    pub tx_ttl: Duration,
    pub receipt_ttl: Duration,
    pub balance_ttl: Duration,
    pub code_ttl: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            block_capacity: 1024,
            tx_capacity: 4096,
            receipt_capacity: 4096,
            balance_capacity: 8192,
            code_capacity: 512,
            block_ttl: Duration::from_secs(60),
            tx_ttl: Duration::from_secs(300),
            receipt_ttl: Duration::from_secs(300),
            balance_ttl: Duration::from_secs(5),
            code_ttl: Duration::from_secs(3600),
        }
    }
}

/// Key space of the block cache; height and hash lookups share one
/// bounded cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKey {
    Height(u64),
    Hash(B256),
}

pub struct CacheManager {
    blocks: TtlCache<BlockKey, Arc<SealedBlock>>,
    transactions: TtlCache<B256, Arc<TxEnvelope>>,
    receipts: TtlCache<B256, Arc<ReceiptEntry>>,
    balances: TtlCache<(Address, String), U256>,
    code: TtlCache<B256, Bytes>,
}

impl CacheManager {
    #[must_use]
    pub fn new(opts: &CacheOptions) -> Self {
        Self {
            blocks: TtlCache::new(opts.block_capacity, opts.block_ttl),
            transactions: TtlCache::new(opts.tx_capacity, opts.tx_ttl),
            receipts: TtlCache::new(opts.receipt_capacity, opts.receipt_ttl),
            balances: TtlCache::new(opts.balance_capacity, opts.balance_ttl),
            code: TtlCache::new(opts.code_capacity, opts.code_ttl),
        }
    }

    pub fn block(&self, key: BlockKey) -> Option<Arc<SealedBlock>> {
        self.blocks.get(&key)
    }

    /// Stores the block under both its height and its hash.
    pub fn put_block(&self, block: Arc<SealedBlock>) {
        self.blocks.insert(BlockKey::Height(block.header.number), Arc::clone(&block));
        self.blocks.insert(BlockKey::Hash(block.hash), block);
    }

    pub fn transaction(&self, hash: &B256) -> Option<Arc<TxEnvelope>> {
        self.transactions.get(hash)
    }

    pub fn put_transaction(&self, hash: B256, tx: Arc<TxEnvelope>) {
        self.transactions.insert(hash, tx);
    }

    pub fn receipt(&self, hash: &B256) -> Option<Arc<ReceiptEntry>> {
        self.receipts.get(hash)
    }

    pub fn put_receipt(&self, hash: B256, entry: Arc<ReceiptEntry>) {
        self.receipts.insert(hash, entry);
    }

    /// `height` is the resolved key segment, `"latest"` or decimal.
    pub fn balance(&self, address: &Address, height: &str) -> Option<U256> {
        self.balances.get(&(*address, height.to_string()))
    }

    pub fn put_balance(&self, address: Address, height: &str, balance: U256) {
        self.balances.insert((address, height.to_string()), balance);
    }

    /// Code is keyed by code hash; the bytes behind a hash never change.
    pub fn code(&self, code_hash: &B256) -> Option<Bytes> {
        self.code.get(code_hash)
    }

    pub fn put_code(&self, code_hash: B256, code: Bytes) {
        self.code.insert(code_hash, code);
    }

    #[must_use]
    pub fn stats(&self) -> HashMap<&'static str, CacheStats> {
        HashMap::from([
            ("block", self.blocks.stats()),
            ("transaction", self.transactions.stats()),
            ("receipt", self.receipts.stats()),
            ("balance", self.balances.stats()),
            ("code", self.code.stats()),
        ])
    }

    pub fn clear(&self) {
        self.blocks.clear();
        self.transactions.clear();
        self.receipts.clear();
        self.balances.clear();
        self.code.clear();
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(&CacheOptions::default())
    }
}
