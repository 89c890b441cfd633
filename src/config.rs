use serde::Deserialize;

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// Top-level structure loaded from `config.json`.
//
// It defines:
// - Which exchange connectors are enabled
// - The HTTP query endpoint bind address
// - Optional debug flags
//
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// List of exchange configurations
    pub exchanges: Vec<ExchangeConfig>,

    /// HTTP query endpoint settings
    pub api: ApiConfig,

    /// Optional debug configuration
    pub debug: Option<DebugConfig>,
}

impl Config {
    /// Names of all enabled exchanges, lowercased.
    ///
    /// CONTRACT:
    /// - Must be non-empty for the process to start; the dispatcher
    ///   treats an empty set as a fatal configuration error.
    pub fn enabled_exchanges(&self) -> Vec<String> {
        self.exchanges
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.name.to_lowercase())
            .collect()
    }
}

// ------------------------------------------------------------
// Exchange configuration
// ------------------------------------------------------------
//
// One entry per venue. Connectors discover their own pair universe
// (Binance streams all symbols implicitly, Kraken queries its REST
// catalog), so no pair lists live in configuration.
//
#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    /// Exchange identifier (e.g. "binance", "kraken")
    pub name: String,

    /// Enables or disables this exchange at runtime
    pub enabled: bool,
}

// ------------------------------------------------------------
// API configuration
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Socket address the query endpoint listens on,
    /// e.g. "127.0.0.1:8080"
    pub bind: String,
}

// ------------------------------------------------------------
// Debug configuration
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    /// Enables verbose per-connection logging
    pub log: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_exchanges_filters_and_lowercases() {
        let cfg: Config = serde_json::from_str(
            r#"{
                "exchanges": [
                    {"name": "Binance", "enabled": true},
                    {"name": "kraken", "enabled": false}
                ],
                "api": {"bind": "127.0.0.1:8080"}
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.enabled_exchanges(), vec!["binance".to_string()]);
    }
}
