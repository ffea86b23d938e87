//! Gateway process: configuration, wiring and the two transports.

mod router;
mod ws;

use anyhow::{Context, Result};
use clap::Parser;
use gateway_core::{
    admission::AdmissionEngine,
    api::{self, EthApi, NetApi, TxPoolApi, Web3Api},
    cache::CacheManager,
    chain::ChainStatus,
    config::AppConfig,
    kv::{Kv, KvStore},
    ratelimit::RateLimiter,
    rpc::{Dispatcher, MethodRegistry},
    store::{BlockReader, PoolStore, StateReader, TransactionReader},
    sub::SubscriptionManager,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal, sync::broadcast};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const CACHE_STATS_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Parser)]
#[command(
    name = "evm-gateway",
    version,
    about = "Read-mostly JSON-RPC gateway for an EVM chain over a Redis-protocol store"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config/config.yaml")]
    config: String,
}

fn init_logging(config: &gateway_core::config::LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,gateway_core={level},gateway_server={level},evm_gateway={level}",
            level = config.level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty().with_target(false)).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config))?;
    config.validate().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    init_logging(&config.logging);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        chain = %config.chain.name,
        chain_id = config.chain.chain_id,
        "starting evm-gateway"
    );

    let kv: Arc<dyn Kv> = Arc::new(
        KvStore::connect(config.kv_options())
            .await
            .context("failed to connect to the KV store")?,
    );
    info!(url = %config.storage.kv.url, "connected to KV store");

    let cache = config
        .cache
        .enabled
        .then(|| Arc::new(CacheManager::new(&config.cache_options())));

    let blocks = Arc::new(BlockReader::new(kv.clone(), cache.clone()));
    let txs = Arc::new(TransactionReader::new(kv.clone(), cache.clone()));
    let state = Arc::new(StateReader::new(kv.clone(), cache.clone()));
    let pool = Arc::new(PoolStore::new(kv.clone()));

    // Admission reads nonce and balance through an uncached reader;
    // a stale cached value must not admit an already-invalid tx.
    let admission = Arc::new(AdmissionEngine::new(
        Arc::new(StateReader::new(kv.clone(), None)),
        pool.clone(),
        config.chain.chain_id,
    ));

    let eth = Arc::new(EthApi::new(
        blocks.clone(),
        txs,
        state,
        pool.clone(),
        admission,
        config.chain.chain_id,
    ));

    let mut registry = MethodRegistry::new();
    api::register_all(
        &mut registry,
        eth,
        Arc::new(NetApi::new(config.chain.network_id)),
        Arc::new(Web3Api::new(env!("CARGO_PKG_VERSION"))),
        Arc::new(TxPoolApi::new(pool)),
    );

    let limiter = config.ratelimit_options().map(|opts| Arc::new(RateLimiter::new(opts)));
    if let Some(limiter) = &limiter {
        Arc::clone(limiter).start_cleanup_task();
        info!("rate limiter enabled");
    }

    let dispatcher = Arc::new(Dispatcher::new(registry, limiter, config.dispatcher_options()));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let chain = Arc::new(ChainStatus::new());
    let subscriptions =
        Arc::new(SubscriptionManager::new(kv.clone(), blocks.clone(), chain.clone()));
    let consumer_tasks = Arc::clone(&subscriptions).spawn(&shutdown_tx);

    if let Some(cache) = cache.clone() {
        spawn_cache_stats_task(cache, shutdown_tx.subscribe());
    }

    let http_state = router::HttpState {
        dispatcher: dispatcher.clone(),
        blocks: blocks.clone(),
        chain: chain.clone(),
        stale_after: Duration::from_secs(config.server.health.stale_after_secs),
    };
    let http_app = router::http_router(
        http_state,
        config.server.http.max_body_bytes,
        config.server.http.max_concurrent_requests,
    );

    let ws_state = ws::WsState::new(
        dispatcher,
        subscriptions,
        shutdown_tx.clone(),
        config.server.ws.max_connections,
        config.server.ws.send_queue_size,
        Duration::from_secs(config.server.ws.ping_interval_secs),
    );
    let ws_app = ws::ws_router(ws_state);

    let http_listener = TcpListener::bind(&config.server.http.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.http.listen_addr))?;
    let ws_listener = TcpListener::bind(&config.server.ws.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.ws.listen_addr))?;
    info!(
        http = %config.server.http.listen_addr,
        ws = %config.server.ws.listen_addr,
        "servers listening"
    );

    tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        async move {
            shutdown_signal().await;
            info!(
                "shutdown signal received, draining (deadline {}s)",
                GRACEFUL_SHUTDOWN_TIMEOUT.as_secs()
            );
            let _ = shutdown_tx.send(());
        }
    });

    let http_server = axum::serve(
        http_listener,
        http_app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_shutdown(shutdown_tx.subscribe()));
    let ws_server = axum::serve(
        ws_listener,
        ws_app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_shutdown(shutdown_tx.subscribe()));

    let (http_result, ws_result) =
        tokio::join!(async { http_server.await }, async { ws_server.await });
    if let Err(err) = http_result {
        error!(error = %err, "http server error");
    }
    if let Err(err) = ws_result {
        error!(error = %err, "websocket server error");
    }

    let _ = shutdown_tx.send(());
    let drained = tokio::time::timeout(
        GRACEFUL_SHUTDOWN_TIMEOUT,
        futures::future::join_all(consumer_tasks),
    )
    .await;
    if drained.is_err() {
        warn!("shutdown deadline exceeded with consumers still running");
    }

    info!("shutdown complete");
    Ok(())
}

async fn wait_for_shutdown(mut shutdown: broadcast::Receiver<()>) {
    let _ = shutdown.recv().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install sigterm handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

fn spawn_cache_stats_task(cache: Arc<CacheManager>, mut shutdown: broadcast::Receiver<()>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CACHE_STATS_INTERVAL);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    for (name, stats) in cache.stats() {
                        info!(
                            cache = name,
                            hits = stats.hits,
                            misses = stats.misses,
                            entries = stats.len,
                            hit_rate = format!("{:.2}", stats.hit_rate()),
                            "cache statistics"
                        );
                    }
                }
            }
        }
    });
}
