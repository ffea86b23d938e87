//! Application configuration.
//!
//! Loaded from a YAML file with `GATEWAY__`-prefixed environment
//! overrides (`__` separates nesting, e.g.
//! `GATEWAY__SERVER__HTTP__LISTEN_ADDR`). Every field has a compiled
//! default so a minimal file only needs the values that differ.

use crate::{
    cache::CacheOptions,
    kv::KvOptions,
    ratelimit::{RateLimitOptions, RateRule},
    rpc::DispatcherOptions,
};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Display name used in logs.
    #[serde(default = "default_chain_name")]
    pub name: String,
    #[serde(default = "default_network_id")]
    pub network_id: u64,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
}

fn default_chain_name() -> String {
    "devnet".to_string()
}

fn default_network_id() -> u64 {
    1337
}

fn default_chain_id() -> u64 {
    1337
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_listen")]
    pub listen_addr: String,
    /// Upper bound on one handler invocation.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Request bodies larger than this are rejected at the transport.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

fn default_http_listen() -> String {
    "0.0.0.0:8545".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_max_concurrent_requests() -> usize {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    #[serde(default = "default_ws_listen")]
    pub listen_addr: String,
    /// Connections beyond this are rejected with HTTP 503. Zero means
    /// unlimited.
    #[serde(default = "default_ws_max_connections")]
    pub max_connections: usize,
    /// Capacity of each connection's outbound queue.
    #[serde(default = "default_send_queue_size")]
    pub send_queue_size: usize,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

fn default_ws_listen() -> String {
    "0.0.0.0:8546".to_string()
}

fn default_ws_max_connections() -> usize {
    1000
}

fn default_send_queue_size() -> usize {
    256
}

fn default_ping_interval_secs() -> u64 {
    54
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// `/health` reports syncing when the observed tip has not
    /// advanced for this long.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_stale_after_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub ws: WsConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvConfig {
    /// `redis://[:password@]host:port[/db]`
    #[serde(default = "default_kv_url")]
    pub url: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_rw_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_rw_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_kv_url() -> String {
    "redis://127.0.0.1:9221".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_rw_timeout_ms() -> u64 {
    3000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub kv: KvConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTtlConfig {
    #[serde(default = "default_block_ttl_secs")]
    pub block_secs: u64,
    #[serde(default = "default_tx_ttl_secs")]
    pub transaction_secs: u64,
    #[serde(default = "default_tx_ttl_secs")]
    pub receipt_secs: u64,
    #[serde(default = "default_balance_ttl_secs")]
    pub balance_secs: u64,
    #[serde(default = "default_code_ttl_secs")]
    pub code_secs: u64,
}

fn default_block_ttl_secs() -> u64 {
    60
}

fn default_tx_ttl_secs() -> u64 {
    300
}

fn default_balance_ttl_secs() -> u64 {
    5
}

fn default_code_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_block_capacity")]
    pub block_capacity: usize,
    #[serde(default = "default_tx_capacity")]
    pub tx_capacity: usize,
    #[serde(default = "default_tx_capacity")]
    pub receipt_capacity: usize,
    #[serde(default = "default_balance_capacity")]
    pub balance_capacity: usize,
    #[serde(default = "default_code_capacity")]
    pub code_capacity: usize,
    #[serde(default)]
    pub ttl: CacheTtlConfig,
}

fn default_true() -> bool {
    true
}

fn default_block_capacity() -> usize {
    1024
}

fn default_tx_capacity() -> usize {
    4096
}

fn default_balance_capacity() -> usize {
    8192
}

fn default_code_capacity() -> usize {
    512
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateRuleConfig {
    #[serde(default)]
    pub requests_per_second: u32,
    #[serde(default)]
    pub burst: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub global: RateRuleConfig,
    #[serde(default)]
    pub ip: RateRuleConfig,
    /// Per-method rates; the burst equals the rate.
    #[serde(default)]
    pub method: HashMap<String, u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `"json"` or `"pretty"`.
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_slow_query_ms")]
    pub slow_query_threshold_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_slow_query_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ratelimit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            name: default_chain_name(),
            network_id: default_network_id(),
            chain_id: default_chain_id(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_listen(),
            request_timeout_secs: default_request_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_ws_listen(),
            max_connections: default_ws_max_connections(),
            send_queue_size: default_send_queue_size(),
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { stale_after_secs: default_stale_after_secs() }
    }
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            url: default_kv_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_rw_timeout_ms(),
            write_timeout_ms: default_rw_timeout_ms(),
        }
    }
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            block_secs: default_block_ttl_secs(),
            transaction_secs: default_tx_ttl_secs(),
            receipt_secs: default_tx_ttl_secs(),
            balance_secs: default_balance_ttl_secs(),
            code_secs: default_code_ttl_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_capacity: default_block_capacity(),
            tx_capacity: default_tx_capacity(),
            receipt_capacity: default_tx_capacity(),
            balance_capacity: default_balance_capacity(),
            code_capacity: default_code_capacity(),
            ttl: CacheTtlConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            slow_query_threshold_ms: default_slow_query_ms(),
        }
    }
}

impl AppConfig {
    /// Loads the YAML file at `path` and applies `GATEWAY__*`
    /// environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(&path.as_ref().to_string_lossy()).required(true))
            .add_source(Environment::with_prefix("GATEWAY").separator("__"))
            .build()?;
        builder.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.chain.chain_id == 0 {
            return Err("chain.chain_id must be non-zero".to_string());
        }
        if self.storage.kv.url.is_empty() {
            return Err("storage.kv.url must be set".to_string());
        }
        if !self.storage.kv.url.starts_with("redis://")
            && !self.storage.kv.url.starts_with("rediss://")
        {
            return Err(format!("storage.kv.url is not a redis url: {}", self.storage.kv.url));
        }
        if self.server.http.request_timeout_secs == 0 {
            return Err("server.http.request_timeout_secs must be non-zero".to_string());
        }
        if self.server.ws.send_queue_size == 0 {
            return Err("server.ws.send_queue_size must be non-zero".to_string());
        }
        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("logging.format must be 'json' or 'pretty'".to_string());
        }
        Ok(())
    }

    #[must_use]
    pub fn kv_options(&self) -> KvOptions {
        KvOptions {
            url: self.storage.kv.url.clone(),
            connect_timeout: Duration::from_millis(self.storage.kv.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.storage.kv.read_timeout_ms),
            write_timeout: Duration::from_millis(self.storage.kv.write_timeout_ms),
        }
    }

    #[must_use]
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            block_capacity: self.cache.block_capacity,
            tx_capacity: self.cache.tx_capacity,
            receipt_capacity: self.cache.receipt_capacity,
            balance_capacity: self.cache.balance_capacity,
            code_capacity: self.cache.code_capacity,
            block_ttl: Duration::from_secs(self.cache.ttl.block_secs),
            tx_ttl: Duration::from_secs(self.cache.ttl.transaction_secs),
            receipt_ttl: Duration::from_secs(self.cache.ttl.receipt_secs),
            balance_ttl: Duration::from_secs(self.cache.ttl.balance_secs),
            code_ttl: Duration::from_secs(self.cache.ttl.code_secs),
        }
    }

    /// `None` when rate limiting is disabled.
    #[must_use]
    pub fn ratelimit_options(&self) -> Option<RateLimitOptions> {
        if !self.ratelimit.enabled {
            return None;
        }
        let rule = |cfg: &RateRuleConfig| {
            (cfg.requests_per_second > 0).then_some(RateRule {
                requests_per_second: cfg.requests_per_second,
                burst: cfg.burst.max(1),
            })
        };
        Some(RateLimitOptions {
            global: rule(&self.ratelimit.global),
            per_peer: rule(&self.ratelimit.ip),
            per_method: self.ratelimit.method.clone(),
            ..Default::default()
        })
    }

    #[must_use]
    pub fn dispatcher_options(&self) -> DispatcherOptions {
        DispatcherOptions {
            request_timeout: Duration::from_secs(self.server.http.request_timeout_secs),
            slow_query_threshold: Duration::from_millis(self.logging.slow_query_threshold_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chain.chain_id, 1337);
        assert_eq!(config.server.http.listen_addr, "0.0.0.0:8545");
        assert!(config.cache.enabled);
        assert!(!config.ratelimit.enabled);
    }

    #[test]
    fn yaml_overrides_defaults() {
        let yaml = r#"
chain:
  name: testnet
  chain_id: 97
server:
  ws:
    max_connections: 10
ratelimit:
  enabled: true
  global:
    requests_per_second: 100
    burst: 200
  method:
    eth_getLogs: 5
"#;
        let config: AppConfig = serde_yaml_from_str(yaml);
        assert_eq!(config.chain.name, "testnet");
        assert_eq!(config.chain.chain_id, 97);
        assert_eq!(config.chain.network_id, 1337);
        assert_eq!(config.server.ws.max_connections, 10);

        let limits = config.ratelimit_options().unwrap();
        assert_eq!(limits.global.unwrap().burst, 200);
        assert!(limits.per_peer.is_none());
        assert_eq!(limits.per_method["eth_getLogs"], 5);
    }

    #[test]
    fn disabled_ratelimit_yields_none() {
        assert!(AppConfig::default().ratelimit_options().is_none());
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut config = AppConfig::default();
        config.storage.kv.url = "http://nope".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    /// Parses YAML through the same `config` crate pipeline used at
    /// startup.
    fn serde_yaml_from_str(yaml: &str) -> AppConfig {
        Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }
}
