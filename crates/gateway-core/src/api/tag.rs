//! Block-tag parameter resolution.

use crate::rpc::RpcError;

/// A block parameter: one of the tag literals or an explicit height.
///
/// Accepted forms are `latest`, `earliest`, `pending` and a
/// `0x`-prefixed hex height, case-insensitively. Anything else is an
/// `invalid params` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Earliest,
    Pending,
    Number(u64),
}

impl BlockTag {
    pub fn parse(input: &str) -> Result<Self, RpcError> {
        let normalized = input.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "latest" => Ok(BlockTag::Latest),
            "earliest" => Ok(BlockTag::Earliest),
            "pending" => Ok(BlockTag::Pending),
            other => {
                let digits = other.strip_prefix("0x").ok_or_else(|| {
                    RpcError::invalid_params(format!("invalid block number: {input}"))
                })?;
                u64::from_str_radix(digits, 16).map(BlockTag::Number).map_err(|_| {
                    RpcError::invalid_params(format!("invalid block number: {input}"))
                })
            }
        }
    }

    /// Key segment for state lookups: `latest` (which also covers
    /// `pending`) or a decimal height.
    #[must_use]
    pub fn state_key(&self) -> String {
        match self {
            BlockTag::Latest | BlockTag::Pending => "latest".to_string(),
            BlockTag::Earliest => "0".to_string(),
            BlockTag::Number(n) => n.to_string(),
        }
    }
}
