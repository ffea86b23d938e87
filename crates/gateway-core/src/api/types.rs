//! Wire projections of domain values.
//!
//! Quantities are hex strings (`0x0`-style, no leading zeros), byte
//! fields use the `0x`-prefixed serde encodings of the primitive
//! types. A transaction or receipt projection that refers to a mined
//! transaction carries its block coordinates; a pending projection
//! carries explicit nulls instead.

use crate::store::{ReceiptEntry, SealedBlock};
use alloy_consensus::{transaction::SignerRecoverable, Transaction, TxEnvelope};
use alloy_primitives::{Address, Bloom, Bytes, B256, B64, U256};
use serde::{Deserialize, Serialize};

pub fn hex_u64(value: u64) -> String {
    format!("0x{value:x}")
}

pub fn hex_u128(value: u128) -> String {
    format!("0x{value:x}")
}

pub fn hex_u256(value: &U256) -> String {
    format!("0x{value:x}")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub block_hash: Option<B256>,
    pub block_number: Option<String>,
    pub transaction_index: Option<String>,
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: String,
    pub gas: String,
    pub gas_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<String>,
    pub value: String,
    pub input: Bytes,
    #[serde(rename = "type")]
    pub tx_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    pub v: String,
    pub r: String,
    pub s: String,
}

impl RpcTransaction {
    /// Projects a transaction; `position` is `(block hash, height,
    /// index)` for mined transactions, `None` for pending ones.
    pub fn from_envelope(tx: &TxEnvelope, position: Option<(B256, u64, u64)>) -> Self {
        let from = tx.recover_signer().unwrap_or_default();
        let signature = tx.signature();
        let is_dynamic = tx.gas_price().is_none();

        let (block_hash, block_number, transaction_index) = match position {
            Some((hash, number, index)) => {
                (Some(hash), Some(hex_u64(number)), Some(hex_u64(index)))
            }
            None => (None, None, None),
        };

        Self {
            block_hash,
            block_number,
            transaction_index,
            hash: *tx.tx_hash(),
            from,
            to: tx.to(),
            nonce: hex_u64(tx.nonce()),
            gas: hex_u64(tx.gas_limit()),
            gas_price: tx.gas_price().map(hex_u128),
            max_fee_per_gas: is_dynamic.then(|| hex_u128(tx.max_fee_per_gas())),
            max_priority_fee_per_gas: if is_dynamic {
                tx.max_priority_fee_per_gas().map(hex_u128)
            } else {
                None
            },
            value: hex_u256(&tx.value()),
            input: tx.input().clone(),
            tx_type: hex_u64(u64::from(tx.tx_type() as u8)),
            chain_id: tx.chain_id().map(hex_u64),
            v: hex_u64(v_value(tx, signature.v())),
            r: hex_u256(&signature.r()),
            s: hex_u256(&signature.s()),
        }
    }

    pub fn pending(tx: &TxEnvelope) -> Self {
        Self::from_envelope(tx, None)
    }
}

/// The `v` field as clients expect it: EIP-155 encoded for legacy
/// transactions, the bare y-parity bit for typed ones.
fn v_value(tx: &TxEnvelope, y_parity: bool) -> u64 {
    let parity = u64::from(y_parity);
    if matches!(tx, TxEnvelope::Legacy(_)) {
        match tx.chain_id() {
            Some(chain_id) => chain_id * 2 + 35 + parity,
            None => 27 + parity,
        }
    } else {
        parity
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BlockTransactions {
    Hashes(Vec<B256>),
    Full(Vec<RpcTransaction>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub number: String,
    pub hash: B256,
    pub parent_hash: B256,
    pub nonce: B64,
    pub sha3_uncles: B256,
    pub logs_bloom: Bloom,
    pub transactions_root: B256,
    pub state_root: B256,
    pub receipts_root: B256,
    pub miner: Address,
    pub difficulty: String,
    pub extra_data: Bytes,
    pub size: String,
    pub gas_limit: String,
    pub gas_used: String,
    pub timestamp: String,
    pub transactions: BlockTransactions,
    pub uncles: Vec<B256>,
    pub mix_hash: B256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<String>,
}

impl RpcBlock {
    pub fn from_block(block: &SealedBlock, full_transactions: bool) -> Self {
        let header = &block.header;

        let transactions = if full_transactions {
            BlockTransactions::Full(
                block
                    .transactions
                    .iter()
                    .enumerate()
                    .map(|(index, tx)| {
                        RpcTransaction::from_envelope(
                            tx,
                            Some((block.hash, header.number, index as u64)),
                        )
                    })
                    .collect(),
            )
        } else {
            BlockTransactions::Hashes(
                block.transactions.iter().map(|tx| *tx.tx_hash()).collect(),
            )
        };

        Self {
            number: hex_u64(header.number),
            hash: block.hash,
            parent_hash: header.parent_hash,
            nonce: header.nonce,
            sha3_uncles: header.ommers_hash,
            logs_bloom: header.logs_bloom,
            transactions_root: header.transactions_root,
            state_root: header.state_root,
            receipts_root: header.receipts_root,
            miner: header.beneficiary,
            difficulty: hex_u256(&header.difficulty),
            extra_data: header.extra_data.clone(),
            size: hex_u64(block.rlp_size() as u64),
            gas_limit: hex_u64(header.gas_limit),
            gas_used: hex_u64(header.gas_used),
            timestamp: hex_u64(header.timestamp),
            transactions,
            uncles: Vec::new(),
            mix_hash: header.mix_hash,
            base_fee_per_gas: header.base_fee_per_gas.map(hex_u64),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: String,
    pub block_hash: B256,
    pub transaction_hash: B256,
    pub transaction_index: String,
    pub log_index: String,
    pub removed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub transaction_hash: B256,
    pub transaction_index: String,
    pub block_hash: B256,
    pub block_number: String,
    pub from: Address,
    pub to: Option<Address>,
    pub cumulative_gas_used: String,
    pub gas_used: String,
    pub contract_address: Option<Address>,
    pub logs: Vec<RpcLog>,
    pub logs_bloom: Bloom,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_gas_price: Option<String>,
}

impl RpcReceipt {
    /// Merges the stored receipt with transaction metadata.
    pub fn new(entry: &ReceiptEntry, tx: &TxEnvelope) -> Self {
        let receipt = &entry.receipt;
        let lookup = &entry.lookup;
        let from = tx.recover_signer().unwrap_or_default();

        let contract_address = (tx.to().is_none() && receipt.contract_address != Address::ZERO)
            .then_some(receipt.contract_address);

        let effective_gas_price = match tx.gas_price() {
            Some(price) => Some(hex_u128(price)),
            None => (receipt.effective_gas_price != 0)
                .then(|| hex_u128(receipt.effective_gas_price)),
        };

        let logs = receipt
            .logs
            .iter()
            .enumerate()
            .map(|(offset, log)| RpcLog {
                address: log.address,
                topics: log.data.topics().to_vec(),
                data: log.data.data.clone(),
                block_number: hex_u64(lookup.block_number),
                block_hash: lookup.block_hash,
                transaction_hash: *tx.tx_hash(),
                transaction_index: hex_u64(lookup.index),
                log_index: hex_u64(entry.first_log_index + offset as u64),
                removed: false,
            })
            .collect();

        Self {
            transaction_hash: *tx.tx_hash(),
            transaction_index: hex_u64(lookup.index),
            block_hash: lookup.block_hash,
            block_number: hex_u64(lookup.block_number),
            from,
            to: tx.to(),
            cumulative_gas_used: hex_u64(receipt.cumulative_gas_used),
            gas_used: hex_u64(receipt.gas_used),
            contract_address,
            logs,
            logs_bloom: receipt.logs_bloom,
            tx_type: hex_u64(u64::from(tx.tx_type() as u8)),
            status: hex_u64(receipt.status),
            effective_gas_price,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeHistoryResult {
    pub oldest_block: String,
    pub base_fee_per_gas: Vec<String>,
    pub gas_used_ratio: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<Vec<Vec<String>>>,
}

/// Arguments of `eth_estimateGas` (and `eth_call`-shaped requests).
/// Newer clients send the calldata as `input`, older ones as `data`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallArgs {
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub gas: Option<U256>,
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub value: Option<U256>,
    pub data: Option<Bytes>,
    pub input: Option<Bytes>,
}

impl CallArgs {
    pub fn payload(&self) -> Option<&Bytes> {
        self.input.as_ref().or(self.data.as_ref())
    }
}
