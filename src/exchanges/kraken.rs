use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::JoinSet;
use tokio::time::{Instant, interval};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Bytes, Message, Utf8Bytes},
};

use crate::{cache::PriceCache, collector::runner::supervise, metrics::METRICS, util};

use super::connector::ExchangeConnector;

/// Kraken ticker connector
///
/// Kraken WS v1:
/// https://docs.kraken.com/websockets/
///
/// Unlike Binance there is no all-symbols stream, and the venue caps
/// how many pairs one connection may subscribe to. Coverage of the
/// full pair universe therefore takes two phases:
///
/// 1. Discovery: one REST call to the AssetPairs endpoint yields the
///    native `wsname` for every tradable pair.
/// 2. Fan-out: the wsnames are partitioned into batches of at most
///    BATCH_SIZE, and each batch gets its own WebSocket connection
///    with its own subscribe handshake and its own reconnect loop.
///    One batch dying never affects the others.
pub struct KrakenConnector;

const WS_ENDPOINT: &str = "wss://ws.kraken.com/";
const ASSET_PAIRS_URL: &str = "https://api.kraken.com/0/public/AssetPairs";

/// Pairs per WebSocket connection (venue subscription cap)
const BATCH_SIZE: usize = 30;

/// Application-level keep-alive: Kraken's transport goes silently
/// dead without it.
const PING_INTERVAL: Duration = Duration::from_secs(20);
const PING_TIMEOUT: Duration = Duration::from_secs(20);

const EXCHANGE: &str = "kraken";

// ------------------------------------------------------------
// REST discovery
// ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AssetPairsResponse {
    result: HashMap<String, AssetPairInfo>,
}

#[derive(Debug, Deserialize)]
struct AssetPairInfo {
    /// Native WebSocket identifier, e.g. "XBT/USDT".
    /// Absent for pairs not available over WS.
    wsname: Option<String>,
}

/// Mapping from normalized pair to Kraken's native wsname, built
/// once from REST discovery and read-only afterwards.
///
/// Insertion order is preserved so batching stays deterministic for
/// a given discovery response.
#[derive(Debug, Default)]
pub struct PairCatalog {
    by_pair: HashMap<String, String>,
    wsnames: Vec<String>,
}

impl PairCatalog {
    /// Insert one native name under its normalized form.
    ///
    /// Two native names can collide on the same normalized pair
    /// (Kraken lists some instruments under multiple keys). Policy:
    /// the first-seen entry wins and the collision is warn-logged,
    /// so a given normalized pair always maps to exactly one
    /// subscription.
    fn insert(&mut self, normalized: String, wsname: String) {
        if let Some(existing) = self.by_pair.get(&normalized) {
            if *existing != wsname {
                log::warn!(
                    "[kraken] catalog collision: {} also normalizes to {}, keeping {}",
                    wsname,
                    normalized,
                    existing
                );
            }
            return;
        }
        self.by_pair.insert(normalized, wsname.clone());
        self.wsnames.push(wsname);
    }

    pub fn len(&self) -> usize {
        self.wsnames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wsnames.is_empty()
    }

    /// Native subscription names, in discovery order.
    pub fn wsnames(&self) -> &[String] {
        &self.wsnames
    }
}

/// Build the catalog from discovery entries, keeping only pairs that
/// carry a native WS name.
fn build_catalog(entries: impl IntoIterator<Item = AssetPairInfo>) -> PairCatalog {
    let mut catalog = PairCatalog::default();
    for info in entries {
        if let Some(wsname) = info.wsname {
            catalog.insert(normalize(&wsname), wsname);
        }
    }
    catalog
}

/// Partition native names, in catalog order, into batches of at most
/// `size`: ceil(N / size) batches, none empty, union exact.
fn partition_batches(wsnames: &[String], size: usize) -> Vec<Vec<String>> {
    wsnames.chunks(size).map(<[String]>::to_vec).collect()
}

/// "XBT/USDT" -> "BTC_USDT", "ETH/USD" -> "ETH_USD".
///
/// Kraken still quotes Bitcoin under its legacy "XBT" ticker; the
/// leading prefix is rewritten so cross-exchange lookups agree.
fn normalize(raw: &str) -> String {
    let p = raw.replace('/', "_").to_uppercase();
    if let Some(rest) = p.strip_prefix("XBT_") {
        format!("BTC_{}", rest)
    } else {
        p
    }
}

/// True once nothing has been heard for a full ping interval plus
/// the pong grace period; the connection is then assumed silently
/// dead and must be torn down for the supervisor to rebuild.
fn keep_alive_expired(last_heard: Instant) -> bool {
    last_heard.elapsed() > PING_INTERVAL + PING_TIMEOUT
}

// ------------------------------------------------------------
// Per-batch stream loop
// ------------------------------------------------------------

/// One connection lifetime for one batch: connect, subscribe, read
/// until the stream ends or the keep-alive declares it dead.
///
/// Returns only on disconnect; the caller's supervision loop retries.
async fn listen_batch(
    batch: Vec<String>,
    batch_index: usize,
    cache: Arc<PriceCache>,
) -> anyhow::Result<()> {
    let (mut ws, _) = connect_async(WS_ENDPOINT).await?;
    log::info!(
        "[kraken] batch #{}: connected, subscribing to {} pairs",
        batch_index,
        batch.len()
    );
    METRICS.ws_connections_active.fetch_add(1, Ordering::Relaxed);

    let result = async {
        let sub = json!({
            "event": "subscribe",
            "pair": batch,
            "subscription": { "name": "ticker" },
        });
        ws.send(Message::Text(Utf8Bytes::from(sub.to_string())))
            .await?;
        METRICS.subscriptions_sent.fetch_add(1, Ordering::Relaxed);

        let mut ping = interval(PING_INTERVAL);
        ping.tick().await; // first tick completes immediately
        let mut last_heard = Instant::now();

        loop {
            tokio::select! {
                msg = ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            last_heard = Instant::now();
                            handle_frame(&cache, &text);
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            last_heard = Instant::now();
                            ws.send(Message::Pong(payload)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => last_heard = Instant::now(),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        // Clean stream end: hand back to the supervisor.
                        None => return Ok(()),
                    }
                }
                _ = ping.tick() => {
                    if keep_alive_expired(last_heard) {
                        anyhow::bail!(
                            "keep-alive timeout: nothing heard for {:?}",
                            last_heard.elapsed()
                        );
                    }
                    ws.send(Message::Ping(Bytes::new())).await?;
                }
            }
        }
    }
    .await;

    METRICS.ws_connections_active.fetch_sub(1, Ordering::Relaxed);
    result
}

/// Apply one text frame to the cache.
///
/// Control messages (`subscriptionStatus`, `heartbeat`) are
/// recognized by shape and dropped. Ticker frames arrive as
/// `[channelId, {"b":[bid,..],"a":[ask,..],..}, "ticker", "PAIR/NAME"]`.
///
/// Anything malformed is dropped silently (counted, not logged) so
/// one bad tick never costs the connection.
fn handle_frame(cache: &PriceCache, raw: &str) {
    let Ok(v) = serde_json::from_str::<Value>(raw) else {
        METRICS.parse_errors.fetch_add(1, Ordering::Relaxed);
        return;
    };

    // Object frames are control traffic (acks, heartbeats)
    if v.is_object() {
        return;
    }

    let Some(arr) = v.as_array() else { return };
    if arr.len() < 4 || arr[2] != "ticker" {
        return;
    }

    METRICS.ticks_received.fetch_add(1, Ordering::Relaxed);

    let payload = &arr[1];
    let Some(raw_pair) = arr[3].as_str() else {
        METRICS.parse_errors.fetch_add(1, Ordering::Relaxed);
        return;
    };

    // Best bid/ask sit at the head of the "b" / "a" arrays
    let bid = payload
        .get("b")
        .and_then(|b| b.get(0))
        .and_then(Value::as_str)
        .unwrap_or("");
    let ask = payload
        .get("a")
        .and_then(|a| a.get(0))
        .and_then(Value::as_str)
        .unwrap_or("");

    let (Ok(bid), Ok(ask)) = (bid.parse::<Decimal>(), ask.parse::<Decimal>()) else {
        METRICS.parse_errors.fetch_add(1, Ordering::Relaxed);
        return;
    };

    cache.update(EXCHANGE, &normalize(raw_pair), util::mid_price(bid, ask));
    METRICS.cache_writes.fetch_add(1, Ordering::Relaxed);
}

// ------------------------------------------------------------
// Connector impl
// ------------------------------------------------------------

impl KrakenConnector {
    /// Phase 1: fetch the pair universe over REST.
    ///
    /// Failure propagates out of `connect_and_listen`, so discovery
    /// is retried on the same fixed delay as any WS failure instead
    /// of aborting the connector for good.
    async fn discover_pairs(&self) -> anyhow::Result<PairCatalog> {
        log::info!("[kraken] fetching asset pairs from {}", ASSET_PAIRS_URL);

        let response = reqwest::Client::new()
            .get(ASSET_PAIRS_URL)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .context("asset pairs request failed")?
            .error_for_status()
            .context("asset pairs request rejected")?
            .json::<AssetPairsResponse>()
            .await
            .context("asset pairs response malformed")?;

        let total = response.result.len();
        let catalog = build_catalog(response.result.into_values());
        log::info!(
            "[kraken] discovered {} pairs, {} subscribable",
            total,
            catalog.len()
        );
        Ok(catalog)
    }
}

#[async_trait::async_trait]
impl ExchangeConnector for KrakenConnector {
    fn name(&self) -> &'static str {
        EXCHANGE
    }

    fn normalize_pair(&self, raw: &str) -> String {
        normalize(raw)
    }

    /// Phase 2: one independently supervised task per batch, held in
    /// this connector's own task group. The join below is effectively
    /// permanent since batch loops never exit.
    async fn connect_and_listen(&self, cache: Arc<PriceCache>) -> anyhow::Result<()> {
        let catalog = self.discover_pairs().await?;
        if catalog.is_empty() {
            anyhow::bail!("discovery returned no subscribable pairs");
        }
        let batches = partition_batches(catalog.wsnames(), BATCH_SIZE);
        log::info!(
            "[kraken] splitting {} pairs into {} batches of <= {}",
            catalog.len(),
            batches.len(),
            BATCH_SIZE
        );

        let mut tasks = JoinSet::new();
        for (i, batch) in batches.into_iter().enumerate() {
            let index = i + 1;
            let cache = Arc::clone(&cache);
            tasks.spawn(async move {
                let label = format!("kraken batch #{}", index);
                supervise(&label, move || {
                    listen_batch(batch.clone(), index, Arc::clone(&cache))
                })
                .await;
            });
        }

        while tasks.join_next().await.is_some() {}
        Ok(())
    }
}
