/// Collector module
///
/// This module groups all logic responsible for:
/// - Supervising connector tasks (reconnect-forever loops)
/// - Dispatching one task per enabled exchange
///
/// The collector layer acts as the orchestration layer between:
/// - Exchange connectors (Binance, Kraken)
/// - The shared PriceCache
///
/// Design notes:
/// - Exchange-specific logic MUST NOT live here
/// - This module should remain thin and orchestration-focused
pub mod runner;
