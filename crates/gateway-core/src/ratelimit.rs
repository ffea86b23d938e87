//! Token-bucket rate limiting at three scopes.
//!
//! Evaluation order is global, then per-peer, then per-method; the
//! first bucket to deny decides the rejection and its scope tag ends
//! up in the error message. The per-peer map is capped and idle
//! buckets are reclaimed by a background task so spoofed peers cannot
//! grow it without bound.

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

/// Which scope denied the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Global,
    Ip,
    Method,
}

impl LimitScope {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitScope::Global => "global",
            LimitScope::Ip => "ip",
            LimitScope::Method => "method",
        }
    }
}

/// Rate `r` tokens per second with burst capacity `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRule {
    pub requests_per_second: u32,
    pub burst: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimitOptions {
    pub global: Option<RateRule>,
    pub per_peer: Option<RateRule>,
    /// Per-method rates; the burst equals the rate.
    pub per_method: HashMap<String, u32>,
    pub max_peer_buckets: usize,
    pub idle_bucket_ttl: Duration,
    pub cleanup_interval: Duration,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            global: None,
            per_peer: None,
            per_method: HashMap::new(),
            max_peer_buckets: 100_000,
            idle_bucket_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_access: Instant,
}

impl TokenBucket {
    fn full(burst: u32, now: Instant) -> Self {
        Self { tokens: f64::from(burst), last_refill: now, last_access: now }
    }

    fn allow(&mut self, now: Instant, rate: u32, burst: u32) -> bool {
        self.last_access = now;

        let elapsed = now.duration_since(self.last_refill);
        let refill = (elapsed.as_secs_f64() * f64::from(rate)).min(f64::from(burst));
        if refill > 0.0 {
            self.tokens = (self.tokens + refill).min(f64::from(burst));
            self.last_refill = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub struct RateLimiter {
    global: Option<(RateRule, Mutex<TokenBucket>)>,
    peer_rule: Option<RateRule>,
    peers: DashMap<String, TokenBucket, RandomState>,
    method_rates: HashMap<String, u32, RandomState>,
    methods: DashMap<String, TokenBucket, RandomState>,
    max_peer_buckets: usize,
    idle_bucket_ttl: Duration,
    cleanup_interval: Duration,
}

impl RateLimiter {
    #[must_use]
    pub fn new(opts: RateLimitOptions) -> Self {
        let now = Instant::now();
        Self {
            global: opts
                .global
                .filter(|r| r.requests_per_second > 0)
                .map(|rule| (rule, Mutex::new(TokenBucket::full(rule.burst, now)))),
            peer_rule: opts.per_peer.filter(|r| r.requests_per_second > 0),
            peers: DashMap::default(),
            method_rates: opts.per_method.into_iter().filter(|(_, r)| *r > 0).collect(),
            methods: DashMap::default(),
            max_peer_buckets: opts.max_peer_buckets,
            idle_bucket_ttl: opts.idle_bucket_ttl,
            cleanup_interval: opts.cleanup_interval,
        }
    }

    /// Checks all three scopes in order. `Err` names the scope that
    /// denied the request.
    pub fn check(&self, peer: &str, method: &str) -> Result<(), LimitScope> {
        let now = Instant::now();

        if let Some((rule, bucket)) = &self.global {
            if !bucket.lock().allow(now, rule.requests_per_second, rule.burst) {
                return Err(LimitScope::Global);
            }
        }

        if let Some(rule) = self.peer_rule {
            if !self.allow_peer(peer, rule, now) {
                return Err(LimitScope::Ip);
            }
        }

        if let Some(&rate) = self.method_rates.get(method) {
            let mut bucket = self
                .methods
                .entry(method.to_string())
                .or_insert_with(|| TokenBucket::full(rate, now));
            if !bucket.allow(now, rate, rate) {
                return Err(LimitScope::Method);
            }
        }

        Ok(())
    }

    fn allow_peer(&self, peer: &str, rule: RateRule, now: Instant) -> bool {
        if let Some(mut bucket) = self.peers.get_mut(peer) {
            return bucket.allow(now, rule.requests_per_second, rule.burst);
        }

        // Unseen peers are denied once the map is at capacity.
        if self.peers.len() >= self.max_peer_buckets {
            return false;
        }

        self.peers
            .entry(peer.to_string())
            .or_insert_with(|| TokenBucket::full(rule.burst, now))
            .allow(now, rule.requests_per_second, rule.burst)
    }

    /// Spawns the periodic reclaim of idle peer buckets.
    pub fn start_cleanup_task(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.cleanup_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                self.reclaim_idle();
            }
        })
    }

    /// Drops peer buckets idle longer than the TTL; returns how many
    /// were removed.
    pub fn reclaim_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.peers.len();
        self.peers.retain(|_, bucket| now.duration_since(bucket.last_access) < self.idle_bucket_ttl);
        before - self.peers.len()
    }

    #[must_use]
    pub fn peer_bucket_count(&self) -> usize {
        self.peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(
        global: Option<RateRule>,
        per_peer: Option<RateRule>,
        per_method: &[(&str, u32)],
    ) -> RateLimitOptions {
        RateLimitOptions {
            global,
            per_peer,
            per_method: per_method.iter().map(|(m, r)| (m.to_string(), *r)).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn burst_then_deny() {
        let limiter = RateLimiter::new(options(
            None,
            Some(RateRule { requests_per_second: 1, burst: 2 }),
            &[],
        ));

        assert!(limiter.check("1.2.3.4", "eth_blockNumber").is_ok());
        assert!(limiter.check("1.2.3.4", "eth_blockNumber").is_ok());
        assert_eq!(limiter.check("1.2.3.4", "eth_blockNumber"), Err(LimitScope::Ip));
    }

    #[tokio::test]
    async fn peers_are_independent() {
        let limiter = RateLimiter::new(options(
            None,
            Some(RateRule { requests_per_second: 1, burst: 1 }),
            &[],
        ));

        assert!(limiter.check("a", "m").is_ok());
        assert!(limiter.check("b", "m").is_ok());
        assert!(limiter.check("a", "m").is_err());
        assert!(limiter.check("b", "m").is_err());
    }

    #[tokio::test]
    async fn tokens_refill_over_time() {
        let limiter = RateLimiter::new(options(
            None,
            Some(RateRule { requests_per_second: 20, burst: 1 }),
            &[],
        ));

        assert!(limiter.check("a", "m").is_ok());
        assert!(limiter.check("a", "m").is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(limiter.check("a", "m").is_ok());
    }

    #[tokio::test]
    async fn global_denies_before_peer() {
        let limiter = RateLimiter::new(options(
            Some(RateRule { requests_per_second: 1, burst: 1 }),
            Some(RateRule { requests_per_second: 100, burst: 100 }),
            &[],
        ));

        assert!(limiter.check("a", "m").is_ok());
        assert_eq!(limiter.check("b", "m"), Err(LimitScope::Global));
    }

    #[tokio::test]
    async fn method_scope_applies_only_to_configured_methods() {
        let limiter = RateLimiter::new(options(None, None, &[("eth_getLogs", 1)]));

        assert!(limiter.check("a", "eth_getLogs").is_ok());
        assert_eq!(limiter.check("a", "eth_getLogs"), Err(LimitScope::Method));
        assert!(limiter.check("a", "eth_blockNumber").is_ok());
    }

    #[tokio::test]
    async fn unseen_peer_denied_at_capacity() {
        let limiter = RateLimiter::new(RateLimitOptions {
            per_peer: Some(RateRule { requests_per_second: 10, burst: 10 }),
            max_peer_buckets: 2,
            ..Default::default()
        });

        assert!(limiter.check("a", "m").is_ok());
        assert!(limiter.check("b", "m").is_ok());
        assert_eq!(limiter.check("c", "m"), Err(LimitScope::Ip));
        assert!(limiter.check("a", "m").is_ok());
    }

    #[tokio::test]
    async fn reclaim_drops_only_idle_buckets() {
        let limiter = RateLimiter::new(RateLimitOptions {
            per_peer: Some(RateRule { requests_per_second: 10, burst: 10 }),
            idle_bucket_ttl: Duration::from_millis(50),
            ..Default::default()
        });

        assert!(limiter.check("old", "m").is_ok());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(limiter.check("fresh", "m").is_ok());

        let removed = limiter.reclaim_idle();
        assert_eq!(removed, 1);
        assert_eq!(limiter.peer_bucket_count(), 1);
    }
}
