use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;

use crate::cache::{PriceCache, PriceMap};

// ------------------------------------------------------------
// HTTP query endpoint
// ------------------------------------------------------------
//
// Thin read-only dispatch over the PriceCache. This layer never
// touches the connectors: it only takes snapshots, so a slow or
// abusive client cannot stall a single price write.
//
// GET /prices              → full snapshot
// GET /prices?exchange=e   → all pairs on one exchange
// GET /prices?pair=p       → one pair across all exchanges
// GET /prices?exchange=e&pair=p → single price
//

#[derive(Clone)]
pub struct ApiState {
    pub cache: Arc<PriceCache>,

    /// Names of the connectors actually running; anything else in
    /// the `exchange` query param is a client error.
    pub exchanges: Arc<Vec<String>>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/prices", get(get_prices))
        .with_state(state)
}

/// Bind and serve until the process dies. Runs beside the
/// collectors; its failure never propagates to them.
pub async fn serve(bind: &str, state: ApiState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    log::info!("query endpoint listening on {}", bind);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PriceQuery {
    exchange: Option<String>,
    pair: Option<String>,
}

#[derive(Debug, PartialEq)]
enum QueryError {
    /// Unknown exchange or malformed pair → 400
    BadRequest(String),
    /// Valid query with no matching data → 404
    NotFound(String),
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            QueryError::BadRequest(d) => (StatusCode::BAD_REQUEST, d),
            QueryError::NotFound(d) => (StatusCode::NOT_FOUND, d),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

async fn get_prices(
    State(state): State<ApiState>,
    Query(query): Query<PriceQuery>,
) -> Result<Json<PriceMap>, QueryError> {
    fetch_prices(
        &state.cache,
        &state.exchanges,
        query.exchange.as_deref(),
        query.pair.as_deref(),
    )
    .map(Json)
}

/// Slice the cache by (exchange, pair):
///   1) neither          → everything
///   2) exchange only    → that exchange's pairs
///   3) pair only        → that pair on every exchange that has it
///   4) both             → that pair on that exchange
fn fetch_prices(
    cache: &PriceCache,
    known_exchanges: &[String],
    exchange: Option<&str>,
    pair: Option<&str>,
) -> Result<PriceMap, QueryError> {
    let exchange = match exchange {
        Some(raw) => Some(validate_exchange(raw, known_exchanges)?),
        None => None,
    };
    let pair = match pair {
        Some(raw) => Some(validate_pair(raw)?),
        None => None,
    };

    match (exchange, pair) {
        (None, None) => Ok(cache.get_all()),

        (Some(exchange), None) => {
            // Known exchange with no ticks yet is an empty map,
            // not an error: readers may race the first tick.
            let pairs = cache.get_by_exchange(&exchange);
            Ok(PriceMap::from([(exchange, pairs)]))
        }

        (None, Some(pair)) => {
            let result: PriceMap = cache
                .get_all()
                .into_iter()
                .filter_map(|(ex, pairs)| {
                    pairs
                        .get(&pair)
                        .map(|price| (ex, [(pair.clone(), *price)].into()))
                })
                .collect();
            if result.is_empty() {
                return Err(QueryError::NotFound(format!(
                    "Pair '{}' not found on any exchange.",
                    pair
                )));
            }
            Ok(result)
        }

        (Some(exchange), Some(pair)) => match cache.get_price(&exchange, &pair) {
            Some(price) => Ok(PriceMap::from([(
                exchange,
                [(pair, price)].into(),
            )])),
            None => Err(QueryError::NotFound(format!(
                "Pair '{}' not found on {}.",
                pair, exchange
            ))),
        },
    }
}

fn validate_exchange(raw: &str, known: &[String]) -> Result<String, QueryError> {
    let exchange = raw.to_lowercase();
    if !known.iter().any(|k| *k == exchange) {
        return Err(QueryError::BadRequest(format!(
            "Unknown exchange '{}'.",
            raw
        )));
    }
    Ok(exchange)
}

fn validate_pair(raw: &str) -> Result<String, QueryError> {
    let pair = raw.to_uppercase();
    if pair.is_empty() || !pair.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(QueryError::BadRequest(
            "Pair must contain only letters, digits, and underscore.".into(),
        ));
    }
    Ok(pair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn known() -> Vec<String> {
        vec!["binance".into(), "kraken".into()]
    }

    fn seeded_cache() -> PriceCache {
        let cache = PriceCache::new();
        cache.update("binance", "BTC_USDT", dec!(100.01));
        cache.update("binance", "ETH_USDT", dec!(2001));
        cache.update("kraken", "BTC_USDT", dec!(100.02));
        cache
    }

    #[test]
    fn no_filters_returns_everything() {
        let all = fetch_prices(&seeded_cache(), &known(), None, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["binance"].len(), 2);
    }

    #[test]
    fn exchange_filter_returns_one_exchange() {
        let result = fetch_prices(&seeded_cache(), &known(), Some("Binance"), None).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result["binance"]["BTC_USDT"], dec!(100.01));
    }

    #[test]
    fn unknown_exchange_is_a_client_error() {
        let err = fetch_prices(&seeded_cache(), &known(), Some("mtgox"), None).unwrap_err();
        assert!(matches!(err, QueryError::BadRequest(_)));
    }

    #[test]
    fn known_exchange_without_ticks_is_empty_not_an_error() {
        let cache = PriceCache::new();
        let result = fetch_prices(&cache, &known(), Some("kraken"), None).unwrap();
        assert!(result["kraken"].is_empty());
    }

    #[test]
    fn pair_filter_spans_exchanges() {
        let result = fetch_prices(&seeded_cache(), &known(), None, Some("btc_usdt")).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result["kraken"]["BTC_USDT"], dec!(100.02));
    }

    #[test]
    fn missing_pair_is_not_found() {
        let err = fetch_prices(&seeded_cache(), &known(), None, Some("XMR_EUR")).unwrap_err();
        assert!(matches!(err, QueryError::NotFound(_)));

        let err =
            fetch_prices(&seeded_cache(), &known(), Some("kraken"), Some("ETH_USDT")).unwrap_err();
        assert!(matches!(err, QueryError::NotFound(_)));
    }

    #[test]
    fn both_filters_return_a_single_price() {
        let result =
            fetch_prices(&seeded_cache(), &known(), Some("binance"), Some("ETH_USDT")).unwrap();
        assert_eq!(result["binance"]["ETH_USDT"], dec!(2001));
    }

    #[test]
    fn malformed_pair_is_rejected() {
        let err = fetch_prices(&seeded_cache(), &known(), None, Some("BTC/USDT")).unwrap_err();
        assert!(matches!(err, QueryError::BadRequest(_)));
    }
}
