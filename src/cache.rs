use std::collections::HashMap;
use std::sync::Mutex;

use rust_decimal::Decimal;

/// Snapshot of every price the process currently knows:
/// exchange → pair → latest mid-price.
pub type PriceMap = HashMap<String, HashMap<String, Decimal>>;

// ------------------------------------------------------------
// Price cache
// ------------------------------------------------------------
//
// Concurrent map holding the latest mid-price per (exchange, pair).
//
// Writers: every connector task (Binance, each Kraken batch).
// Readers: the HTTP query endpoint.
//
// PROPERTIES:
// - Last write wins; no history is retained.
// - All reads return isolated copies, never live references.
// - A single mutex guards the whole map; no operation performs
//   I/O while holding it, so contention stays in the nanosecond
//   range even with dozens of concurrent writers.
//
// Prices are `rust_decimal::Decimal`, never f64: the mid-price is
// recomputed from bid/ask on every tick and binary floats would
// accumulate visible rounding drift.
//
pub struct PriceCache {
    inner: Mutex<PriceMap>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Store or overwrite the price for (exchange, pair).
    ///
    /// Unconditional and idempotent; safe under arbitrary
    /// concurrent callers targeting the same or different keys.
    pub fn update(&self, exchange: &str, pair: &str, price: Decimal) {
        let mut map = self.inner.lock().expect("price cache poisoned");
        map.entry(exchange.to_string())
            .or_default()
            .insert(pair.to_string(), price);
    }

    /// Full snapshot of the cache.
    ///
    /// The returned map is a deep copy: later `update` calls do not
    /// affect it, and mutating it does not affect the cache.
    pub fn get_all(&self) -> PriceMap {
        self.inner.lock().expect("price cache poisoned").clone()
    }

    /// Snapshot of one exchange's pairs.
    ///
    /// An exchange with no entries yet yields an empty map, not an
    /// error: connectors fill the cache asynchronously and a reader
    /// may race ahead of the first tick.
    pub fn get_by_exchange(&self, exchange: &str) -> HashMap<String, Decimal> {
        self.inner
            .lock()
            .expect("price cache poisoned")
            .get(exchange)
            .cloned()
            .unwrap_or_default()
    }

    /// Latest price for (exchange, pair), if any.
    pub fn get_price(&self, exchange: &str, pair: &str) -> Option<Decimal> {
        self.inner
            .lock()
            .expect("price cache poisoned")
            .get(exchange)
            .and_then(|pairs| pairs.get(pair))
            .copied()
    }
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn update_overwrites_previous_value() {
        let cache = PriceCache::new();
        cache.update("binance", "BTC_USDT", dec!(100));
        cache.update("binance", "BTC_USDT", dec!(101));
        assert_eq!(cache.get_price("binance", "BTC_USDT"), Some(dec!(101)));
    }

    #[test]
    fn missing_keys_are_absent_not_errors() {
        let cache = PriceCache::new();
        assert_eq!(cache.get_price("binance", "BTC_USDT"), None);
        assert!(cache.get_by_exchange("kraken").is_empty());
        assert!(cache.get_all().is_empty());
    }

    #[test]
    fn snapshots_are_isolated_from_later_updates() {
        let cache = PriceCache::new();
        cache.update("binance", "BTC_USDT", dec!(100));

        let mut all = cache.get_all();
        let by_exchange = cache.get_by_exchange("binance");

        cache.update("binance", "BTC_USDT", dec!(200));
        cache.update("kraken", "ETH_USD", dec!(3000));

        assert_eq!(all["binance"]["BTC_USDT"], dec!(100));
        assert_eq!(by_exchange["BTC_USDT"], dec!(100));

        // Mutating the snapshot must not leak back into the cache.
        all.get_mut("binance")
            .unwrap()
            .insert("BTC_USDT".into(), dec!(1));
        assert_eq!(cache.get_price("binance", "BTC_USDT"), Some(dec!(200)));
    }

    #[test]
    fn concurrent_writers_lose_no_updates() {
        let cache = Arc::new(PriceCache::new());
        let mut handles = Vec::new();

        // 8 writers hammer distinct keys, plus one shared key.
        for w in 0..8u32 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                let pair = format!("PAIR{}_USDT", w);
                for i in 0..1000u32 {
                    cache.update("binance", &pair, Decimal::from(i));
                    cache.update("binance", "SHARED_USDT", Decimal::from(i));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        // Every distinct key holds its writer's final value.
        for w in 0..8u32 {
            let pair = format!("PAIR{}_USDT", w);
            assert_eq!(cache.get_price("binance", &pair), Some(dec!(999)));
        }
        // The shared key holds *some* writer's final value.
        assert_eq!(cache.get_price("binance", "SHARED_USDT"), Some(dec!(999)));
    }
}
