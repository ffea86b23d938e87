//! Public RPC namespaces.
//!
//! Method contracts follow the Ethereum JSON-RPC surface: lookups on
//! unknown blocks, transactions or receipts yield `null` results;
//! absent state reads yield empty values (zero balance, empty code,
//! the zero storage word).

mod tag;
pub mod types;

pub mod eth;
pub mod net;
pub mod txpool;
pub mod web3;

pub use eth::EthApi;
pub use net::NetApi;
pub use tag::BlockTag;
pub use txpool::TxPoolApi;
pub use web3::Web3Api;

use crate::rpc::MethodRegistry;
use std::sync::Arc;

/// Registers every namespace on the given registry.
pub fn register_all(
    registry: &mut MethodRegistry,
    eth: Arc<EthApi>,
    net: Arc<NetApi>,
    web3: Arc<Web3Api>,
    txpool: Arc<TxPoolApi>,
) {
    eth::register(registry, &eth);
    net::register(registry, &net);
    web3::register(registry, &web3);
    txpool::register(registry, &txpool);
}
