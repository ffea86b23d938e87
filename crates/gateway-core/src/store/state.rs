//! Account state read path.
//!
//! Readers take the already-resolved height segment (`"latest"` or a
//! decimal height); block-tag resolution happens in the API layer.
//! Absent accounts read as nonce 0, balance 0, no code, and absent
//! storage slots as the zero word.

use super::{keys, AccountState, StoreError};
use crate::{cache::CacheManager, kv::Kv};
use alloy_primitives::{Address, Bytes, B256, U256};
use std::sync::Arc;

pub struct StateReader {
    kv: Arc<dyn Kv>,
    cache: Option<Arc<CacheManager>>,
}

impl StateReader {
    pub fn new(kv: Arc<dyn Kv>, cache: Option<Arc<CacheManager>>) -> Self {
        Self { kv, cache }
    }

    pub async fn account(
        &self,
        address: &Address,
        height: &str,
    ) -> Result<AccountState, StoreError> {
        match self.kv.get(&keys::account(height, address)).await {
            Ok(data) => serde_json::from_slice(&data)
                .map_err(|e| StoreError::InvalidData(format!("account state: {e}"))),
            Err(crate::kv::KvError::NotFound) => Ok(AccountState::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn balance(&self, address: &Address, height: &str) -> Result<U256, StoreError> {
        if let Some(cache) = &self.cache {
            if let Some(balance) = cache.balance(address, height) {
                return Ok(balance);
            }
        }

        let balance = self.account(address, height).await?.balance;

        if let Some(cache) = &self.cache {
            cache.put_balance(*address, height, balance);
        }
        Ok(balance)
    }

    pub async fn nonce(&self, address: &Address, height: &str) -> Result<u64, StoreError> {
        Ok(self.account(address, height).await?.nonce)
    }

    /// Contract code, resolved through the account's code hash. Empty
    /// for accounts without code or with a dangling hash.
    pub async fn code(&self, address: &Address, height: &str) -> Result<Bytes, StoreError> {
        let account = self.account(address, height).await?;
        let Some(code_hash) = account.code_hash() else {
            return Ok(Bytes::new());
        };

        if let Some(cache) = &self.cache {
            if let Some(code) = cache.code(&code_hash) {
                return Ok(code);
            }
        }

        let code = match self.kv.get(&keys::code(&code_hash)).await {
            Ok(data) => Bytes::from(data),
            Err(crate::kv::KvError::NotFound) => Bytes::new(),
            Err(err) => return Err(err.into()),
        };

        if let Some(cache) = &self.cache {
            cache.put_code(code_hash, code.clone());
        }
        Ok(code)
    }

    /// Storage word at `(address, slot)`, left-padded to 32 bytes.
    pub async fn storage(
        &self,
        address: &Address,
        slot: &B256,
        height: &str,
    ) -> Result<B256, StoreError> {
        let raw = match self.kv.get(&keys::storage(height, address, slot)).await {
            Ok(data) => data,
            Err(crate::kv::KvError::NotFound) => return Ok(B256::ZERO),
            Err(err) => return Err(err.into()),
        };

        if raw.len() > 32 {
            return Err(StoreError::InvalidData(format!(
                "storage value is {} bytes, expected at most 32",
                raw.len()
            )));
        }
        let mut word = [0u8; 32];
        word[32 - raw.len()..].copy_from_slice(&raw);
        Ok(B256::from(word))
    }
}
