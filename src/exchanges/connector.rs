use std::sync::Arc;

use crate::cache::PriceCache;

/// ExchangeConnector is the core abstraction layer between:
/// - The generic supervision runtime
/// - Exchange-specific WebSocket APIs
///
/// Each exchange implementation must:
/// - Establish its own transport connection and subscription
/// - Parse raw WebSocket messages into bid/ask ticks
/// - Normalize symbols into canonical "BASE_QUOTE" form
/// - Write mid-prices into the shared PriceCache
///
/// DESIGN GOALS:
/// - Zero exchange-specific logic outside connectors
/// - One connector per exchange
/// - Uniform cache writes across all exchanges
///
/// THREAD SAFETY:
/// - Must be Send + Sync
/// - Connector instances are shared across tasks
///
#[async_trait::async_trait]
pub trait ExchangeConnector: Send + Sync {
    /// Returns the canonical exchange name.
    ///
    /// CONTRACT:
    /// - Must match `exchange.name` in configuration
    /// - Used as the cache key and in log lines
    fn name(&self) -> &'static str;

    /// Convert a raw symbol from the exchange into normalized
    /// "BASE_QUOTE" form, e.g. "BTCUSDT" -> "BTC_USDT" or
    /// "XBT/USDT" -> "BTC_USDT".
    ///
    /// Cross-exchange queries join on this form, so two venues
    /// quoting the same instrument must produce the same string.
    ///
    /// MUST NOT:
    /// - Perform network I/O
    /// - Mutate shared state
    fn normalize_pair(&self, raw: &str) -> String;

    /// Connect, subscribe if the venue requires it, and consume the
    /// stream until it ends, writing every valid tick into `cache`.
    ///
    /// CONTRACT:
    /// - Returns only on disconnect, clean stream end, or a setup
    ///   failure; in normal operation it runs forever.
    /// - A single malformed message must be dropped, not bubbled up:
    ///   only transport-level failures end the stream.
    /// - The caller (the supervision loop) retries unconditionally,
    ///   so no retry logic belongs in here.
    async fn connect_and_listen(&self, cache: Arc<PriceCache>) -> anyhow::Result<()>;
}
