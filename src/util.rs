/// Shared helper utilities.
///
/// IMPORTANT:
/// - No exchange-specific business logic should live here.
/// - This module must remain lightweight and deterministic.
///
/// Exchange-specific behavior (normalization, wire formats) belongs
/// in the connector implementations.
use rust_decimal::Decimal;

/// Mid-price of a best bid/ask quote: (bid + ask) / 2.
///
/// Computed in decimal arithmetic. The cache recomputes this on
/// every tick, and with f64 the repeated averaging would accumulate
/// visible rounding drift on long-running streams.
pub fn mid_price(bid: Decimal, ask: Decimal) -> Decimal {
    (bid + ask) / Decimal::TWO
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn mid_price_is_exact() {
        // The classic f64 trap: (100.005 + 100.015) / 2 != 100.01
        assert_eq!(mid_price(dec!(100.005), dec!(100.015)), dec!(100.01));
        assert_eq!(mid_price(dec!(0.1), dec!(0.2)), dec!(0.15));
    }
}
