use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::{cache::PriceCache, metrics::METRICS, util};

use super::connector::ExchangeConnector;

/// Binance (Global) ticker connector
///
/// Binance Spot WS:
/// https://developers.binance.com/docs/binance-spot-api-docs/websocket-market-streams
///
/// The `!ticker@arr` stream pushes best bid/ask for *every* symbol
/// on the venue over a single connection, so no subscribe handshake
/// and no pair discovery are needed.
pub struct BinanceConnector;

const WS_ENDPOINT: &str = "wss://stream.binance.com:9443/ws/!ticker@arr";

impl BinanceConnector {
    /// Apply one text frame to the cache.
    ///
    /// A frame is a JSON array of ticker objects:
    /// `{ "s": symbol, "b": bid, "a": ask, ... }`
    ///
    /// Objects with a missing or non-numeric bid/ask are skipped
    /// without aborting the frame or the stream; they are counted
    /// in METRICS.parse_errors instead of being logged, since a
    /// misbehaving feed would otherwise flood the log.
    fn handle_frame(&self, cache: &PriceCache, raw: &str) {
        let Ok(Value::Array(tickers)) = serde_json::from_str::<Value>(raw) else {
            METRICS.parse_errors.fetch_add(1, Ordering::Relaxed);
            return;
        };

        for item in &tickers {
            METRICS.ticks_received.fetch_add(1, Ordering::Relaxed);

            let Some(symbol) = item.get("s").and_then(Value::as_str) else {
                METRICS.parse_errors.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            // Venue symbols are ASCII; anything else is a malformed
            // tick, not a pair we could normalize.
            if !symbol.is_ascii() {
                METRICS.parse_errors.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            let bid = item.get("b").and_then(Value::as_str).unwrap_or("");
            let ask = item.get("a").and_then(Value::as_str).unwrap_or("");

            let (Ok(bid), Ok(ask)) = (bid.parse::<Decimal>(), ask.parse::<Decimal>()) else {
                METRICS.parse_errors.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            let pair = self.normalize_pair(symbol);
            cache.update(self.name(), &pair, util::mid_price(bid, ask));
            METRICS.cache_writes.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[async_trait::async_trait]
impl ExchangeConnector for BinanceConnector {
    fn name(&self) -> &'static str {
        "binance"
    }

    /// "BTCUSDT" -> "BTC_USDT", "ETHBTC" -> "ETH_BTC".
    ///
    /// Binance symbols carry no separator, so the quote is split off
    /// by length: 4 characters for USDT, 3 otherwise. Quote codes
    /// outside {3, 4} characters are not resolvable from the symbol
    /// alone and come out wrong; acceptable for the major pairs this
    /// feed is consumed for.
    ///
    /// Symbols the length split cannot apply to (non-ASCII, or too
    /// short to leave a base) pass through unsplit rather than
    /// slicing mid-character.
    fn normalize_pair(&self, raw: &str) -> String {
        let s = raw.to_uppercase();
        if !s.is_ascii() {
            return s;
        }
        let split = if s.ends_with("USDT") {
            s.len() - 4
        } else {
            s.len().saturating_sub(3)
        };
        if split == 0 {
            return s;
        }
        format!("{}_{}", &s[..split], &s[split..])
    }

    async fn connect_and_listen(&self, cache: Arc<PriceCache>) -> anyhow::Result<()> {
        log::info!("[binance] connecting to {}", WS_ENDPOINT);
        let (mut ws, _) = connect_async(WS_ENDPOINT).await?;
        log::info!("[binance] connected, streaming all tickers");
        METRICS.ws_connections_active.fetch_add(1, Ordering::Relaxed);

        let result = async {
            while let Some(msg) = ws.next().await {
                match msg? {
                    Message::Text(text) => self.handle_frame(&cache, &text),

                    // Binance pings every few minutes and drops the
                    // connection if no pong comes back.
                    Message::Ping(payload) => ws.send(Message::Pong(payload)).await?,

                    // Ignore pong/binary/close payloads
                    _ => {}
                }
            }
            Ok(())
        }
        .await;

        METRICS.ws_connections_active.fetch_sub(1, Ordering::Relaxed);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normalizes_usdt_and_three_letter_quotes() {
        let c = BinanceConnector;
        assert_eq!(c.normalize_pair("BTCUSDT"), "BTC_USDT");
        assert_eq!(c.normalize_pair("ETHBTC"), "ETH_BTC");
        assert_eq!(c.normalize_pair("dogeusdt"), "DOGE_USDT");
    }

    #[test]
    fn degenerate_symbols_pass_through_unsplit() {
        let c = BinanceConnector;
        // Bare quote code: no base to split off
        assert_eq!(c.normalize_pair("USDT"), "USDT");
        assert_eq!(c.normalize_pair("BTC"), "BTC");
        // Multibyte input must not be sliced mid-character
        assert_eq!(c.normalize_pair("aéxy"), "AÉXY");
    }

    #[test]
    fn non_ascii_symbol_is_dropped_and_frame_continues() {
        let c = BinanceConnector;
        let cache = PriceCache::new();

        c.handle_frame(
            &cache,
            r#"[{"s":"AÉXY","b":"1","a":"2"},
                {"s":"BTCUSDT","b":"10","a":"12"}]"#,
        );

        assert_eq!(cache.get_by_exchange("binance").len(), 1);
        assert_eq!(cache.get_price("binance", "BTC_USDT"), Some(dec!(11)));
    }

    #[test]
    fn frame_updates_cache_with_mid_price() {
        let c = BinanceConnector;
        let cache = PriceCache::new();

        c.handle_frame(
            &cache,
            r#"[{"s":"BTCUSDT","b":"100.005","a":"100.015"},
                {"s":"ETHBTC","b":"0.05","a":"0.07"}]"#,
        );

        assert_eq!(cache.get_price("binance", "BTC_USDT"), Some(dec!(100.01)));
        assert_eq!(cache.get_price("binance", "ETH_BTC"), Some(dec!(0.06)));
    }

    #[test]
    fn bad_ticker_is_skipped_but_rest_of_frame_applies() {
        let c = BinanceConnector;
        let cache = PriceCache::new();

        c.handle_frame(
            &cache,
            r#"[{"s":"BTCUSDT","b":"not-a-number","a":"100"},
                {"s":"ETHUSDT","b":"2000","a":"2002"}]"#,
        );

        assert_eq!(cache.get_price("binance", "BTC_USDT"), None);
        assert_eq!(cache.get_price("binance", "ETH_USDT"), Some(dec!(2001)));
    }

    #[test]
    fn malformed_frame_does_not_poison_later_frames() {
        let c = BinanceConnector;
        let cache = PriceCache::new();

        c.handle_frame(&cache, "not json at all");
        c.handle_frame(&cache, r#"[{"s":"BTCUSDT","b":"10","a":"12"}]"#);

        assert_eq!(cache.get_price("binance", "BTC_USDT"), Some(dec!(11)));
    }
}
