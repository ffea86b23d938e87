//! Adapter over the Redis-protocol key-value store.
//!
//! The indexer writes chain data into the store; the gateway only
//! reads it, except for the transaction pool keys. All operations go
//! through the [`Kv`] trait so the read path can be exercised against
//! the in-memory implementation in tests.
//!
//! Missing keys are surfaced as the distinguished [`KvError::NotFound`]
//! so callers can tell "absent" apart from a failing backend.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::{collections::HashMap, future::Future, time::Duration};

#[cfg(any(test, feature = "test-util"))]
pub mod memory;

/// A message received from a pub/sub channel.
#[derive(Debug, Clone)]
pub struct KvMessage {
    pub channel: String,
    pub payload: String,
}

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("not found")]
    NotFound,

    #[error("operation timed out")]
    Timeout,

    #[error("backend error: {0}")]
    Backend(#[from] redis::RedisError),
}

/// Operations the gateway needs from the store.
///
/// The surface mirrors the subset of the Redis command set the key
/// layout uses: plain strings, hashes, sets, sorted sets and pub/sub,
/// plus `MGET` as the pipelined batch for resolving hash lists.
#[async_trait]
pub trait Kv: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Vec<u8>, KvError>;
    /// A zero `ttl` stores the value without expiry.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), KvError>;
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, KvError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Vec<u8>, KvError>;
    async fn hset(&self, key: &str, field: &str, value: &[u8]) -> Result<(), KvError>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Vec<u8>>, KvError>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), KvError>;
    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, KvError>;
    async fn zrevrange(&self, key: &str, start: isize, stop: isize)
        -> Result<Vec<String>, KvError>;
    async fn zrem(&self, key: &str, member: &str) -> Result<(), KvError>;
    async fn zcard(&self, key: &str) -> Result<u64, KvError>;

    async fn sadd(&self, key: &str, member: &str) -> Result<(), KvError>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError>;

    async fn del(&self, key: &str) -> Result<(), KvError>;
    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), KvError>;

    /// Opens a dedicated pub/sub connection for the given channels and
    /// returns the message stream. The stream ends when the underlying
    /// connection drops; callers are expected to resubscribe.
    async fn subscribe(&self, channels: &[String]) -> Result<BoxStream<'static, KvMessage>, KvError>;
}

/// Connection settings for [`KvStore`].
#[derive(Debug, Clone)]
pub struct KvOptions {
    /// `redis://[:password@]host:port[/db]`
    pub url: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for KvOptions {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:9221".to_string(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(3),
        }
    }
}

/// Redis-protocol implementation of [`Kv`].
///
/// Backed by a multiplexed [`redis::aio::ConnectionManager`], which
/// reconnects transparently. Every operation is bounded by the
/// configured read or write timeout; an elapsed deadline maps to
/// [`KvError::Timeout`].
#[derive(Clone)]
pub struct KvStore {
    client: redis::Client,
    conn: redis::aio::ConnectionManager,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl KvStore {
    /// Connects to the store and verifies the connection with a `PING`.
    pub async fn connect(opts: KvOptions) -> Result<Self, KvError> {
        let client = redis::Client::open(opts.url.as_str())?;
        let conn = tokio::time::timeout(opts.connect_timeout, client.get_connection_manager())
            .await
            .map_err(|_| KvError::Timeout)??;

        let store = Self {
            client,
            conn,
            read_timeout: opts.read_timeout,
            write_timeout: opts.write_timeout,
        };

        let mut conn = store.conn.clone();
        store
            .read(async move { redis::cmd("PING").query_async::<String>(&mut conn).await })
            .await?;

        Ok(store)
    }

    async fn read<T>(
        &self,
        fut: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, KvError> {
        Self::bounded(self.read_timeout, fut).await
    }

    async fn write<T>(
        &self,
        fut: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, KvError> {
        Self::bounded(self.write_timeout, fut).await
    }

    async fn bounded<T>(
        limit: Duration,
        fut: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, KvError> {
        match tokio::time::timeout(limit, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(KvError::Backend(err)),
            Err(_) => Err(KvError::Timeout),
        }
    }
}

#[async_trait]
impl Kv for KvStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, KvError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let key = key.to_string();
        let value: Option<Vec<u8>> = self.read(async move { conn.get(&key).await }).await?;
        value.ok_or(KvError::NotFound)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), KvError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let key = key.to_string();
        let value = value.to_vec();
        if ttl.is_zero() {
            self.write(async move { conn.set::<_, _, ()>(&key, value).await }).await
        } else {
            let secs = ttl.as_secs().max(1);
            self.write(async move { conn.set_ex::<_, _, ()>(&key, value, secs).await }).await
        }
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, KvError> {
        use redis::AsyncCommands;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let keys = keys.to_vec();
        self.read(async move { conn.mget(&keys).await }).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Vec<u8>, KvError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let (key, field) = (key.to_string(), field.to_string());
        let value: Option<Vec<u8>> =
            self.read(async move { conn.hget(&key, &field).await }).await?;
        value.ok_or(KvError::NotFound)
    }

    async fn hset(&self, key: &str, field: &str, value: &[u8]) -> Result<(), KvError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let (key, field) = (key.to_string(), field.to_string());
        let value = value.to_vec();
        self.write(async move { conn.hset::<_, _, _, ()>(&key, &field, value).await }).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Vec<u8>>, KvError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.read(async move { conn.hgetall(&key).await }).await
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), KvError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let (key, member) = (key.to_string(), member.to_string());
        self.write(async move { conn.zadd::<_, _, _, ()>(&key, &member, score).await }).await
    }

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, KvError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.read(async move { conn.zrange(&key, start, stop).await }).await
    }

    async fn zrevrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, KvError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.read(async move { conn.zrevrange(&key, start, stop).await }).await
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<(), KvError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let (key, member) = (key.to_string(), member.to_string());
        self.write(async move { conn.zrem::<_, _, ()>(&key, &member).await }).await
    }

    async fn zcard(&self, key: &str) -> Result<u64, KvError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.read(async move { conn.zcard(&key).await }).await
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), KvError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let (key, member) = (key.to_string(), member.to_string());
        self.write(async move { conn.sadd::<_, _, ()>(&key, &member).await }).await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.read(async move { conn.smembers(&key).await }).await
    }

    async fn del(&self, key: &str) -> Result<(), KvError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.write(async move { conn.del::<_, ()>(&key).await }).await
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.read(async move { conn.exists(&key).await }).await
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), KvError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let (channel, payload) = (channel.to_string(), payload.to_string());
        self.write(async move { conn.publish::<_, _, ()>(&channel, payload).await }).await
    }

    async fn subscribe(
        &self,
        channels: &[String],
    ) -> Result<BoxStream<'static, KvMessage>, KvError> {
        use futures::StreamExt;

        let mut pubsub = tokio::time::timeout(self.read_timeout, self.client.get_async_pubsub())
            .await
            .map_err(|_| KvError::Timeout)??;
        for channel in channels {
            pubsub.subscribe(channel).await?;
        }

        let stream = pubsub.into_on_message().map(|msg| KvMessage {
            channel: msg.get_channel_name().to_string(),
            payload: msg.get_payload::<String>().unwrap_or_default(),
        });
        Ok(stream.boxed())
    }
}
