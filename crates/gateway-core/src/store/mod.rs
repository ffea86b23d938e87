//! Read path over the KV store: key layout, domain types and the
//! readers that decode stored bytes into them.
//!
//! ```text
//! idx:latest                       ASCII decimal height
//! idx:blk:hash:{0x..64}            ASCII decimal height
//! blk:hdr:{n}                      RLP(header)
//! blk:body:{n}                     RLP(body)
//! blk:rcpt:{n}                     RLP([receipt..])
//! tx:{0x..64}                      RLP(transaction)
//! tx:lookup:{0x..64}               JSON {blockNumber, blockHash, index}
//! st:{latest|n}:acc:{0x..40}       JSON {nonce, balance, codeHash}
//! st:{latest|n}:stor:{addr}:{key}  raw 32-byte word
//! st:code:{0x..64}                 raw code bytes
//! pool:pending:{0x..64}            RLP(transaction)
//! pool:addr:{0x..40}               zset score=nonce member=tx hash
//! pool:byprice                     zset score=gas price member=tx hash
//! ```

use crate::kv::KvError;
use alloy_consensus::{Header, TxEnvelope};
use alloy_primitives::{Address, Bloom, Log, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

mod block;
mod state;
mod transaction;
pub(crate) mod txpool;

pub use block::BlockReader;
pub use state::StateReader;
pub use transaction::TransactionReader;
pub use txpool::{effective_gas_price, PoolContent, PoolStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("invalid stored data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Kv(KvError),
}

impl From<KvError> for StoreError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::NotFound => StoreError::NotFound,
            other => StoreError::Kv(other),
        }
    }
}

impl From<alloy_rlp::Error> for StoreError {
    fn from(err: alloy_rlp::Error) -> Self {
        StoreError::InvalidData(err.to_string())
    }
}

/// Lowercase `0x`-prefixed hex, the form every key uses.
pub fn hash_hex(hash: &B256) -> String {
    format!("0x{}", hex::encode(hash))
}

pub fn address_hex(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// Key construction for the layout above.
pub(crate) mod keys {
    use alloy_primitives::{Address, B256};

    pub const IDX_LATEST: &str = "idx:latest";
    pub const POOL_BY_PRICE: &str = "pool:byprice";
    pub const CHANNEL_BLOCKS_NEW: &str = "blocks:new";
    pub const CHANNEL_POOL_NEW: &str = "pool:new";

    pub fn block_hash_index(hash: &B256) -> String {
        format!("idx:blk:hash:{}", super::hash_hex(hash))
    }

    pub fn header(number: u64) -> String {
        format!("blk:hdr:{number}")
    }

    pub fn body(number: u64) -> String {
        format!("blk:body:{number}")
    }

    pub fn receipts(number: u64) -> String {
        format!("blk:rcpt:{number}")
    }

    pub fn transaction(hash: &B256) -> String {
        format!("tx:{}", super::hash_hex(hash))
    }

    pub fn tx_lookup(hash: &B256) -> String {
        format!("tx:lookup:{}", super::hash_hex(hash))
    }

    /// `height` is `"latest"` or a decimal number, resolved by the caller.
    pub fn account(height: &str, address: &Address) -> String {
        format!("st:{height}:acc:{}", super::address_hex(address))
    }

    pub fn storage(height: &str, address: &Address, slot: &B256) -> String {
        format!("st:{height}:stor:{}:{}", super::address_hex(address), super::hash_hex(slot))
    }

    pub fn code(code_hash: &B256) -> String {
        format!("st:code:{}", super::hash_hex(code_hash))
    }

    pub fn pool_pending(hash: &B256) -> String {
        format!("pool:pending:{}", super::hash_hex(hash))
    }

    pub fn pool_address(address: &Address) -> String {
        format!("pool:addr:{}", super::address_hex(address))
    }
}

/// Block body as stored under `blk:body:{n}`.
#[derive(Debug, Clone, Default, PartialEq, RlpEncodable, RlpDecodable)]
pub struct BlockBody {
    pub transactions: Vec<TxEnvelope>,
    pub ommers: Vec<Header>,
}

/// A header rehydrated with its body and addressed by hash.
#[derive(Debug, Clone)]
pub struct SealedBlock {
    pub header: Header,
    pub hash: B256,
    pub transactions: Vec<TxEnvelope>,
}

impl SealedBlock {
    pub fn new(header: Header, body: BlockBody) -> Self {
        let hash = header.hash_slow();
        Self { header, hash, transactions: body.transactions }
    }

    /// RLP-encoded size of the block, header plus transaction list.
    pub fn rlp_size(&self) -> usize {
        use alloy_rlp::Encodable;
        self.header.length() + self.transactions.iter().map(Encodable::length).sum::<usize>()
    }
}

/// Receipt as stored in the per-block `blk:rcpt:{n}` array.
///
/// The zero address stands for "no contract created" and a zero
/// effective gas price for "not recorded"; the RPC projection maps
/// both back to their optional forms.
#[derive(Debug, Clone, Default, PartialEq, RlpEncodable, RlpDecodable)]
pub struct StoredReceipt {
    pub status: u64,
    pub cumulative_gas_used: u64,
    pub gas_used: u64,
    pub logs_bloom: Bloom,
    pub logs: Vec<Log>,
    pub contract_address: Address,
    pub effective_gas_price: u128,
}

/// A receipt resolved through its lookup record.
///
/// `first_log_index` is the block-wide index of the receipt's first
/// log, counting the logs of all preceding receipts in the block.
#[derive(Debug, Clone)]
pub struct ReceiptEntry {
    pub receipt: StoredReceipt,
    pub lookup: TxLookup,
    pub first_log_index: u64,
}

/// Inverse of the per-block transactions array, keyed by tx hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxLookup {
    #[serde(rename = "blockNumber")]
    pub block_number: u64,
    #[serde(rename = "blockHash")]
    pub block_hash: B256,
    pub index: u64,
}

/// Account record under `st:{height}:acc:{addr}`.
///
/// The balance is accepted both as a JSON number and as a decimal or
/// `0x`-hex string; indexers have shipped all three.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountState {
    #[serde(default)]
    pub nonce: u64,
    #[serde(default, with = "balance_serde")]
    pub balance: U256,
    #[serde(rename = "codeHash", default)]
    pub code_hash: String,
}

impl AccountState {
    /// The stored code hash, when one is present and non-empty.
    pub fn code_hash(&self) -> Option<B256> {
        if self.code_hash.is_empty() {
            return None;
        }
        let hash: B256 = self.code_hash.parse().ok()?;
        (hash != B256::ZERO).then_some(hash)
    }
}

mod balance_serde {
    use alloy_primitives::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(U256::from(n)),
            Raw::Text(s) => {
                let parsed = if let Some(hex) = s.strip_prefix("0x") {
                    U256::from_str_radix(hex, 16)
                } else {
                    U256::from_str_radix(&s, 10)
                };
                parsed.map_err(|e| de::Error::custom(format!("invalid balance {s:?}: {e}")))
            }
        }
    }
}
