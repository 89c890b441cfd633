// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:     Configuration structs loaded from JSON
// - cache:      Concurrent latest-price store (the shared sink)
// - util:       Shared helper utilities (mid-price arithmetic)
// - exchanges:  Exchange connectors and connector registry
// - collector:  Supervision runtime (reconnect loops, dispatch)
// - api:        Read-only HTTP query endpoint over the cache
// - metrics:    Lock-free runtime counters
//
mod api;
mod cache;
mod collector;
mod config;
mod exchanges;
mod metrics;
mod util;

use std::fs;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use env_logger::Env;
use rustls::crypto::{CryptoProvider, ring};
use tokio::time::sleep;

use api::ApiState;
use cache::PriceCache;
use collector::runner::spawn_exchanges;
use config::Config;
use exchanges::get_connector;
use metrics::METRICS;

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// Responsibilities:
// - Initialize cryptography backend (rustls)
// - Load configuration and fail fast on an empty exchange set
// - Construct the single shared PriceCache
// - Start the query endpoint and one supervised task per exchange
// - Wait on the connector tasks forever
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // rustls >= 0.23 requires an explicit CryptoProvider
    // installation, exactly once and as early as possible.
    CryptoProvider::install_default(ring::default_provider())
        .expect("failed to install rustls CryptoProvider");

    let config: Config = load_config("config.json")?;

    let default_level = match &config.debug {
        Some(d) if d.log.unwrap_or(false) => "debug",
        _ => "info",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    // --------------------------------------------------------
    // Resolve enabled connectors
    //
    // An unknown name is skipped with a warning; an empty result
    // is a configuration error, fatal and never retried, in
    // contrast to everything downstream of here, which self-heals.
    // --------------------------------------------------------
    let mut connectors = Vec::new();
    for name in config.enabled_exchanges() {
        match get_connector(&name) {
            Some(connector) => connectors.push(connector),
            None => log::warn!("exchange '{}' is not supported", name),
        }
    }
    if connectors.is_empty() {
        anyhow::bail!("no exchange connectors enabled, check config.json");
    }

    // One cache instance for the whole process, passed by reference
    // to every writer and reader. No hidden global.
    let price_cache = Arc::new(PriceCache::new());

    // --------------------------------------------------------
    // Query endpoint
    //
    // Runs beside the collectors. If it dies the collectors keep
    // filling the cache; prices merely become unreadable over HTTP.
    // --------------------------------------------------------
    let api_state = ApiState {
        cache: Arc::clone(&price_cache),
        exchanges: Arc::new(connectors.iter().map(|c| c.name().to_string()).collect()),
    };
    let bind = config.api.bind.clone();
    tokio::spawn(async move {
        if let Err(e) = api::serve(&bind, api_state).await {
            log::error!("query endpoint failed: {:#}", e);
        }
    });

    // --------------------------------------------------------
    // Metrics reporter (periodic, low-noise)
    // --------------------------------------------------------
    tokio::spawn(async {
        loop {
            sleep(Duration::from_secs(10)).await;

            log::info!(
                "[metrics] ex={} ws={} recv={} writes={} parse_err={} reconnects={} subs={}",
                METRICS.exchanges_active.load(Ordering::Relaxed),
                METRICS.ws_connections_active.load(Ordering::Relaxed),
                METRICS.ticks_received.load(Ordering::Relaxed),
                METRICS.cache_writes.load(Ordering::Relaxed),
                METRICS.parse_errors.load(Ordering::Relaxed),
                METRICS.ws_reconnects.load(Ordering::Relaxed),
                METRICS.subscriptions_sent.load(Ordering::Relaxed),
            );
        }
    });

    // --------------------------------------------------------
    // Dispatch and wait
    //
    // Connector loops reconnect forever, so this join only returns
    // if the process is being torn down anyway.
    // --------------------------------------------------------
    let mut tasks = spawn_exchanges(connectors, price_cache);
    while tasks.join_next().await.is_some() {}

    Ok(())
}

/// Reads the JSON configuration file from disk and deserializes it
/// into the strongly typed `Config` structure.
fn load_config(path: &str) -> anyhow::Result<Config> {
    let data = fs::read_to_string(path)?;
    let cfg = serde_json::from_str(&data)?;
    Ok(cfg)
}
