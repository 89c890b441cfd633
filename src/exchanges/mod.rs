//! Exchange connector registry and factory
//!
//! This module provides:
//! - Central registration of all supported exchanges
//! - A factory function to resolve connectors by name
//!
//! All exchange-specific logic must live in dedicated connector
//! modules. The rest of the application must interact exclusively
//! through the `ExchangeConnector` trait.

pub mod connector;

pub mod binance;
pub mod kraken;

use std::sync::Arc;

use connector::ExchangeConnector;

/// Returns an exchange connector instance by name.
///
/// This function acts as the central factory for all supported
/// exchanges.
///
/// CONTRACT:
/// - `name` MUST match the `exchange.name` field in config.json
/// - Connector names are lowercase and stable
///
/// RETURNS:
/// - `Some(Arc<dyn ExchangeConnector>)` if the exchange is supported
/// - `None` if the exchange is unknown
///
/// THREADING:
/// - Connectors are wrapped in `Arc` and shared across tasks
pub fn get_connector(name: &str) -> Option<Arc<dyn ExchangeConnector>> {
    match name {
        "binance" => Some(Arc::new(binance::BinanceConnector)),
        "kraken" => Some(Arc::new(kraken::KrakenConnector)),
        _ => None,
    }
}
