//! In-memory [`Kv`] implementation backing tests.
//!
//! Semantics follow the Redis commands the gateway uses: string TTLs,
//! score-ordered sorted sets with lexicographic tie-break, and
//! broadcast-based pub/sub.

use super::{Kv, KvError, KvMessage};
use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, mpsc};

#[derive(Default)]
struct Inner {
    strings: HashMap<String, (Vec<u8>, Option<Instant>)>,
    hashes: HashMap<String, HashMap<String, Vec<u8>>>,
    sets: HashMap<String, HashSet<String>>,
    zsets: HashMap<String, Vec<(f64, String)>>,
    channels: HashMap<String, broadcast::Sender<String>>,
}

#[derive(Default)]
pub struct MemoryKv {
    inner: Mutex<Inner>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, name: &str) -> broadcast::Sender<String> {
        let mut inner = self.inner.lock();
        inner
            .channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }

    fn sorted_members(entries: &[(f64, String)]) -> Vec<(f64, String)> {
        let mut sorted = entries.to_vec();
        sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.1.cmp(&b.1)));
        sorted
    }

    fn slice(members: Vec<String>, start: isize, stop: isize) -> Vec<String> {
        let len = members.len() as isize;
        let norm = |i: isize| if i < 0 { (len + i).max(0) } else { i.min(len) };
        let start = norm(start);
        let stop = norm(stop);
        if start > stop {
            return Vec::new();
        }
        members
            .into_iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .collect()
    }
}

#[async_trait]
impl Kv for MemoryKv {
    async fn get(&self, key: &str) -> Result<Vec<u8>, KvError> {
        let mut inner = self.inner.lock();
        let entry = inner.strings.get(key).map(|(value, deadline)| (value.clone(), *deadline));
        match entry {
            Some((_, Some(deadline))) if deadline <= Instant::now() => {
                inner.strings.remove(key);
                Err(KvError::NotFound)
            }
            Some((value, _)) => Ok(value),
            None => Err(KvError::NotFound),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), KvError> {
        let deadline = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.inner.lock().strings.insert(key.to_string(), (value.to_vec(), deadline));
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, KvError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await.ok());
        }
        Ok(out)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Vec<u8>, KvError> {
        self.inner
            .lock()
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .cloned()
            .ok_or(KvError::NotFound)
    }

    async fn hset(&self, key: &str, field: &str, value: &[u8]) -> Result<(), KvError> {
        self.inner
            .lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_vec());
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Vec<u8>>, KvError> {
        Ok(self.inner.lock().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), KvError> {
        let mut inner = self.inner.lock();
        let entries = inner.zsets.entry(key.to_string()).or_default();
        entries.retain(|(_, m)| m != member);
        entries.push((score, member.to_string()));
        Ok(())
    }

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, KvError> {
        let inner = self.inner.lock();
        let entries = inner.zsets.get(key).map(|e| Self::sorted_members(e)).unwrap_or_default();
        Ok(Self::slice(entries.into_iter().map(|(_, m)| m).collect(), start, stop))
    }

    async fn zrevrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, KvError> {
        let inner = self.inner.lock();
        let mut entries =
            inner.zsets.get(key).map(|e| Self::sorted_members(e)).unwrap_or_default();
        entries.reverse();
        Ok(Self::slice(entries.into_iter().map(|(_, m)| m).collect(), start, stop))
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<(), KvError> {
        if let Some(entries) = self.inner.lock().zsets.get_mut(key) {
            entries.retain(|(_, m)| m != member);
        }
        Ok(())
    }

    async fn zcard(&self, key: &str) -> Result<u64, KvError> {
        Ok(self.inner.lock().zsets.get(key).map_or(0, |e| e.len() as u64))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), KvError> {
        self.inner.lock().sets.entry(key.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError> {
        Ok(self
            .inner
            .lock()
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn del(&self, key: &str) -> Result<(), KvError> {
        let mut inner = self.inner.lock();
        inner.strings.remove(key);
        inner.hashes.remove(key);
        inner.sets.remove(key);
        inner.zsets.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let inner = self.inner.lock();
        Ok(inner.strings.contains_key(key)
            || inner.hashes.contains_key(key)
            || inner.sets.contains_key(key)
            || inner.zsets.contains_key(key))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), KvError> {
        let _ = self.channel(channel).send(payload.to_string());
        Ok(())
    }

    async fn subscribe(
        &self,
        channels: &[String],
    ) -> Result<BoxStream<'static, KvMessage>, KvError> {
        let (tx, rx) = mpsc::unbounded_channel();
        for name in channels {
            let mut receiver = self.channel(name).subscribe();
            let tx = tx.clone();
            let name = name.clone();
            tokio::spawn(async move {
                while let Ok(payload) = receiver.recv().await {
                    if tx.send(KvMessage { channel: name.clone(), payload }).is_err() {
                        break;
                    }
                }
            });
        }

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });
        Ok(Box::pin(stream))
    }
}
