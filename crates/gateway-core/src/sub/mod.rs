//! WebSocket subscriptions and fan-out of KV pub/sub events.
//!
//! Two long-lived consumers listen on the store's `blocks:new` and
//! `pool:new` channels. A `blocks:new` payload (a block hash) fans out
//! a header projection to every `newHeads` subscription, then every
//! log of the block's receipts to the `logs` subscriptions whose
//! filter matches. A `pool:new` payload (a tx hash) fans out to the
//! `newPendingTransactions` subscriptions.
//!
//! Each notification goes into the owning connection's bounded send
//! queue without blocking; a full queue drops the notification for
//! that subscription and logs at `warn`, so one slow client cannot
//! stall the fan-out loop.

mod filter;

pub use filter::LogFilter;

use crate::{
    api::types::{hex_u64, RpcLog},
    chain::ChainStatus,
    kv::Kv,
    store::{keys, BlockReader, SealedBlock, StoredReceipt},
};
use alloy_primitives::B256;
use futures::StreamExt;
use parking_lot::RwLock;
use rand::RngCore;
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    NewHeads,
    Logs,
    NewPendingTransactions,
}

impl SubscriptionKind {
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "newHeads" => Some(Self::NewHeads),
            "logs" => Some(Self::Logs),
            "newPendingTransactions" => Some(Self::NewPendingTransactions),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewHeads => "newHeads",
            Self::Logs => "logs",
            Self::NewPendingTransactions => "newPendingTransactions",
        }
    }
}

/// Write side of one WebSocket connection: the bounded queue its
/// writer task drains.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub id: u64,
    sender: mpsc::Sender<Value>,
}

impl ConnectionHandle {
    pub fn new(id: u64, sender: mpsc::Sender<Value>) -> Self {
        Self { id, sender }
    }

    /// Non-blocking enqueue; `false` means the queue was full (or the
    /// connection is gone) and the message was dropped.
    pub fn try_send(&self, message: Value) -> bool {
        self.sender.try_send(message).is_ok()
    }
}

struct Subscription {
    id: String,
    kind: SubscriptionKind,
    filter: Option<LogFilter>,
    conn: ConnectionHandle,
}

pub struct SubscriptionManager {
    kv: Arc<dyn Kv>,
    blocks: Arc<BlockReader>,
    chain: Arc<ChainStatus>,
    subscriptions: RwLock<HashMap<String, Subscription>>,
}

impl SubscriptionManager {
    pub fn new(kv: Arc<dyn Kv>, blocks: Arc<BlockReader>, chain: Arc<ChainStatus>) -> Self {
        Self { kv, blocks, chain, subscriptions: RwLock::new(HashMap::new()) }
    }

    /// Registers a subscription and returns its opaque hex id.
    pub fn subscribe(
        &self,
        conn: ConnectionHandle,
        kind: SubscriptionKind,
        filter: Option<LogFilter>,
    ) -> String {
        let mut subscriptions = self.subscriptions.write();

        // Ids come from the OS RNG; the collision check makes the
        // registry safe even if the RNG misbehaves.
        let id = loop {
            let mut bytes = [0u8; 16];
            rand::rngs::OsRng.fill_bytes(&mut bytes);
            let candidate = format!("0x{}", hex::encode(bytes));
            if !subscriptions.contains_key(&candidate) {
                break candidate;
            }
        };

        info!(subscription = %id, kind = kind.as_str(), conn = conn.id, "subscription created");
        subscriptions
            .insert(id.clone(), Subscription { id: id.clone(), kind, filter, conn });
        id
    }

    /// Removes one subscription; `false` when the id is unknown.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let removed = self.subscriptions.write().remove(id).is_some();
        if removed {
            info!(subscription = %id, "subscription removed");
        }
        removed
    }

    /// Drops every subscription owned by a closed connection.
    pub fn drop_connection(&self, conn_id: u64) {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|_, sub| sub.conn.id != conn_id);
        let dropped = before - subscriptions.len();
        if dropped > 0 {
            debug!(conn = conn_id, dropped, "connection subscriptions dropped");
        }
    }

    #[must_use]
    pub fn active(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Spawns the two channel consumers. They reconnect with capped
    /// exponential backoff and exit on shutdown.
    pub fn spawn(self: Arc<Self>, shutdown: &broadcast::Sender<()>) -> Vec<tokio::task::JoinHandle<()>> {
        let pool = Arc::clone(&self);
        vec![
            tokio::spawn(self.consume(keys::CHANNEL_BLOCKS_NEW, shutdown.subscribe())),
            tokio::spawn(pool.consume(keys::CHANNEL_POOL_NEW, shutdown.subscribe())),
        ]
    }

    async fn consume(self: Arc<Self>, channel: &'static str, mut shutdown: broadcast::Receiver<()>) {
        let mut delay = Duration::from_secs(1);
        loop {
            let mut stream = match self.kv.subscribe(&[channel.to_string()]).await {
                Ok(stream) => {
                    info!(channel, "listening for events");
                    delay = Duration::from_secs(1);
                    stream
                }
                Err(err) => {
                    error!(channel, error = %err, retry_in = ?delay, "pub/sub subscribe failed");
                    tokio::select! {
                        _ = shutdown.recv() => return,
                        () = tokio::time::sleep(delay) => {}
                    }
                    delay = (delay * 2).min(MAX_RECONNECT_DELAY);
                    continue;
                }
            };

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!(channel, "event consumer shutting down");
                        return;
                    }
                    event = stream.next() => match event {
                        Some(message) => match channel {
                            keys::CHANNEL_BLOCKS_NEW => self.on_new_block(&message.payload).await,
                            _ => self.on_new_pending(&message.payload),
                        },
                        None => {
                            warn!(channel, "pub/sub stream ended, reconnecting");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn on_new_block(&self, payload: &str) {
        let Ok(hash) = payload.parse::<B256>() else {
            warn!(payload, "unparseable block hash on blocks:new");
            return;
        };

        let block = match self.blocks.block_by_hash(&hash).await {
            Ok(block) => block,
            Err(err) => {
                error!(block = %payload, error = %err, "failed to load announced block");
                return;
            }
        };
        self.chain.observe(block.header.number);

        self.notify_new_heads(&block);

        match self.blocks.receipts(block.header.number).await {
            Ok(receipts) => self.notify_logs(&block, &receipts),
            Err(err) => {
                error!(block = %payload, error = %err, "failed to load receipts for announced block");
            }
        }
    }

    fn on_new_pending(&self, payload: &str) {
        let subscriptions = self.subscriptions.read();
        for sub in subscriptions.values() {
            if sub.kind == SubscriptionKind::NewPendingTransactions {
                self.deliver(sub, json!(payload));
            }
        }
    }

    fn notify_new_heads(&self, block: &SealedBlock) {
        let header = &block.header;
        let result = json!({
            "number": hex_u64(header.number),
            "hash": block.hash,
            "parentHash": header.parent_hash,
            "timestamp": hex_u64(header.timestamp),
            "gasUsed": hex_u64(header.gas_used),
            "gasLimit": hex_u64(header.gas_limit),
        });

        let subscriptions = self.subscriptions.read();
        for sub in subscriptions.values() {
            if sub.kind == SubscriptionKind::NewHeads {
                self.deliver(sub, result.clone());
            }
        }
    }

    fn notify_logs(&self, block: &SealedBlock, receipts: &[StoredReceipt]) {
        let subscriptions = self.subscriptions.read();

        let mut log_index = 0u64;
        for (tx_index, receipt) in receipts.iter().enumerate() {
            let Some(tx_hash) = block.transactions.get(tx_index).map(|tx| *tx.tx_hash()) else {
                warn!(block = %block.hash, tx_index, "receipt without matching transaction");
                log_index += receipt.logs.len() as u64;
                continue;
            };

            for log in &receipt.logs {
                for sub in subscriptions.values() {
                    if sub.kind != SubscriptionKind::Logs {
                        continue;
                    }
                    let matched = sub
                        .filter
                        .as_ref()
                        .is_none_or(|f| f.matches(log.address, log.data.topics()));
                    if !matched {
                        continue;
                    }

                    let projection = RpcLog {
                        address: log.address,
                        topics: log.data.topics().to_vec(),
                        data: log.data.data.clone(),
                        block_number: hex_u64(block.header.number),
                        block_hash: block.hash,
                        transaction_hash: tx_hash,
                        transaction_index: hex_u64(tx_index as u64),
                        log_index: hex_u64(log_index),
                        removed: false,
                    };
                    let Ok(result) = serde_json::to_value(&projection) else {
                        continue;
                    };
                    self.deliver(sub, result);
                }
                log_index += 1;
            }
        }
    }

    fn deliver(&self, sub: &Subscription, result: Value) {
        let message = json!({
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": { "subscription": sub.id, "result": result },
        });
        if !sub.conn.try_send(message) {
            warn!(subscription = %sub.id, kind = sub.kind.as_str(), "send queue full, dropping notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKv;
    use crate::store::{keys as store_keys, BlockBody};
    use alloy_consensus::Header;
    use alloy_primitives::{Address, Bytes, Log, LogData};
    use serde_json::json;
    use std::time::Duration;

    async fn seed_block_with_logs(kv: &MemoryKv, number: u64) -> B256 {
        let signer = alloy_signer_local::PrivateKeySigner::random();
        let tx = crate::store::txpool::tests::signed_legacy(&signer, 0, 10, Some(1337));

        let header = Header { number, gas_used: 21_000, gas_limit: 30_000_000, ..Default::default() };
        let hash = header.hash_slow();
        let body = BlockBody { transactions: vec![tx], ommers: Vec::new() };

        let log = Log {
            address: Address::repeat_byte(0xaa),
            data: LogData::new_unchecked(vec![B256::repeat_byte(0x01)], Bytes::new()),
        };
        let receipts = vec![StoredReceipt { logs: vec![log], ..Default::default() }];

        kv.set(&store_keys::header(number), &alloy_rlp::encode(&header), Duration::ZERO)
            .await
            .unwrap();
        kv.set(&store_keys::body(number), &alloy_rlp::encode(&body), Duration::ZERO)
            .await
            .unwrap();
        kv.set(&store_keys::receipts(number), &alloy_rlp::encode(&receipts), Duration::ZERO)
            .await
            .unwrap();
        kv.set(
            &store_keys::block_hash_index(&hash),
            number.to_string().as_bytes(),
            Duration::ZERO,
        )
        .await
        .unwrap();
        hash
    }

    fn manager(kv: Arc<MemoryKv>) -> Arc<SubscriptionManager> {
        let blocks = Arc::new(BlockReader::new(kv.clone(), None));
        Arc::new(SubscriptionManager::new(kv, blocks, Arc::new(ChainStatus::new())))
    }

    fn handle(id: u64, capacity: usize) -> (ConnectionHandle, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ConnectionHandle::new(id, tx), rx)
    }

    async fn recv(rx: &mut mpsc::Receiver<Value>) -> Value {
        tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn subscribe_unsubscribe_lifecycle() {
        let manager = manager(Arc::new(MemoryKv::new()));
        let (conn, _rx) = handle(1, 8);

        let a = manager.subscribe(conn.clone(), SubscriptionKind::NewHeads, None);
        let b = manager.subscribe(conn.clone(), SubscriptionKind::Logs, None);
        assert_ne!(a, b);
        assert!(a.starts_with("0x"));
        assert_eq!(manager.active(), 2);

        assert!(manager.unsubscribe(&a));
        assert!(!manager.unsubscribe(&a));
        assert_eq!(manager.active(), 1);

        manager.drop_connection(conn.id);
        assert_eq!(manager.active(), 0);
    }

    #[tokio::test]
    async fn new_block_fans_out_heads_and_logs() {
        let kv = Arc::new(MemoryKv::new());
        let hash = seed_block_with_logs(&kv, 5).await;
        let manager = manager(kv.clone());

        let (heads_conn, mut heads_rx) = handle(1, 8);
        let heads_id = manager.subscribe(heads_conn, SubscriptionKind::NewHeads, None);

        let (logs_conn, mut logs_rx) = handle(2, 8);
        manager.subscribe(logs_conn, SubscriptionKind::Logs, None);

        let (shutdown, _) = broadcast::channel(1);
        let tasks = Arc::clone(&manager).spawn(&shutdown);
        tokio::time::sleep(Duration::from_millis(50)).await;

        kv.publish(store_keys::CHANNEL_BLOCKS_NEW, &crate::store::hash_hex(&hash))
            .await
            .unwrap();

        let head = recv(&mut heads_rx).await;
        assert_eq!(head["method"], "eth_subscription");
        assert_eq!(head["params"]["subscription"], heads_id);
        assert_eq!(head["params"]["result"]["number"], "0x5");

        let log = recv(&mut logs_rx).await;
        assert_eq!(log["params"]["result"]["logIndex"], "0x0");
        assert_eq!(log["params"]["result"]["blockNumber"], "0x5");

        let _ = shutdown.send(());
        for task in tasks {
            let _ = task.await;
        }
    }

    #[tokio::test]
    async fn log_filter_gates_delivery() {
        let kv = Arc::new(MemoryKv::new());
        let hash = seed_block_with_logs(&kv, 9).await;
        let manager = manager(kv.clone());

        let (matching_conn, mut matching_rx) = handle(1, 8);
        let matching_filter: LogFilter = serde_json::from_value(json!({
            "address": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
        }))
        .unwrap();
        manager.subscribe(matching_conn, SubscriptionKind::Logs, Some(matching_filter));

        let (other_conn, mut other_rx) = handle(2, 8);
        let other_filter: LogFilter = serde_json::from_value(json!({
            "address": "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
        }))
        .unwrap();
        manager.subscribe(other_conn, SubscriptionKind::Logs, Some(other_filter));

        let (shutdown, _) = broadcast::channel(1);
        let tasks = Arc::clone(&manager).spawn(&shutdown);
        tokio::time::sleep(Duration::from_millis(50)).await;

        kv.publish(store_keys::CHANNEL_BLOCKS_NEW, &crate::store::hash_hex(&hash))
            .await
            .unwrap();

        let delivered = recv(&mut matching_rx).await;
        assert_eq!(
            delivered["params"]["result"]["address"],
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
        assert!(other_rx.try_recv().is_err());

        let _ = shutdown.send(());
        for task in tasks {
            let _ = task.await;
        }
    }

    #[tokio::test]
    async fn pending_tx_fans_out_hash() {
        let kv = Arc::new(MemoryKv::new());
        let manager = manager(kv.clone());

        let (conn, mut rx) = handle(1, 8);
        manager.subscribe(conn, SubscriptionKind::NewPendingTransactions, None);

        let (shutdown, _) = broadcast::channel(1);
        let tasks = Arc::clone(&manager).spawn(&shutdown);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let tx_hash = crate::store::hash_hex(&B256::repeat_byte(0x77));
        kv.publish(store_keys::CHANNEL_POOL_NEW, &tx_hash).await.unwrap();

        let event = recv(&mut rx).await;
        assert_eq!(event["params"]["result"], tx_hash);

        let _ = shutdown.send(());
        for task in tasks {
            let _ = task.await;
        }
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let kv = Arc::new(MemoryKv::new());
        let manager = manager(kv.clone());

        let (conn, mut rx) = handle(1, 1);
        manager.subscribe(conn, SubscriptionKind::NewPendingTransactions, None);

        // Two events into a queue of one, nothing draining it.
        manager.on_new_pending("0x01");
        manager.on_new_pending("0x02");

        assert_eq!(recv(&mut rx).await["params"]["result"], "0x01");
        assert!(rx.try_recv().is_err());
    }
}
