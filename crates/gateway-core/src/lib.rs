//! # Gateway Core
//!
//! Core library for a read-mostly JSON-RPC 2.0 gateway over an
//! EVM-compatible chain. Chain data lives in an external
//! Redis-protocol key-value store populated by an indexer; the
//! gateway itself is stateless and horizontally scalable.
//!
//! Components:
//!
//! - **[`kv`]**: typed operations over the Redis-protocol store
//!   (strings, sorted sets, hashes, pub/sub) behind the [`kv::Kv`]
//!   seam.
//!
//! - **[`store`]**: readers that decode block, transaction, receipt
//!   and state bytes into domain values, plus the pending-transaction
//!   pool store and its secondary indices.
//!
//! - **[`cache`]**: bounded per-domain LRU caches with per-entry TTL
//!   in front of the readers.
//!
//! - **[`rpc`]**: JSON-RPC 2.0 envelopes, the method registry,
//!   positional parameter binding and batch execution.
//!
//! - **[`api`]**: the `eth`, `net`, `web3` and `txpool` namespaces.
//!
//! - **[`admission`]**: validation gate for raw signed transactions
//!   entering the shared pool.
//!
//! - **[`sub`]**: WebSocket subscription registry and the fan-out of
//!   KV pub/sub events to subscribers.
//!
//! - **[`ratelimit`]**: token buckets at global, per-peer and
//!   per-method scope.
//!
//! ```text
//! client -> transport -> rpc dispatcher -> api handlers
//!                               |               |
//!                          rate limiter    cache | store | admission
//!                                                |
//!                                            kv adapter
//!
//! indexer -> KV pub/sub -> sub manager -> WebSocket writers -> client
//! ```

pub mod admission;
pub mod api;
pub mod cache;
pub mod chain;
pub mod config;
pub mod kv;
pub mod ratelimit;
pub mod rpc;
pub mod store;
pub mod sub;
