//! Venue-native book normalization.
//!
//! Converts Kalshi cents books and Polymarket decimal-string books into the
//! unified [`NormalizedOrderBook`] shape with prices in [0, 1]. Malformed
//! input yields `None` plus an error log record; normalization never panics
//! and never throws.
//!
//! The normalizer itself is stateless with respect to book content; the only
//! mutable state is the rolling latency window behind `p95_latency_ms`.

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use arb_core::types::{BookFlag, NormalizedOrderBook, PriceLevel, Venue};

use crate::latency::LatencyWindow;
use crate::raw::{RawKalshiBook, RawPolymarketBook, RawPolymarketLevel};

/// Samples kept in the rolling normalization-latency window.
const LATENCY_WINDOW_SIZE: usize = 100;

/// Normalization SLA: warn when P95 latency exceeds this.
const SLA_P95_MS: f64 = 500.0;

/// Converts venue-native books into [`NormalizedOrderBook`].
pub struct OrderBookNormalizer {
    latency: Mutex<LatencyWindow>,
}

impl OrderBookNormalizer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            latency: Mutex::new(LatencyWindow::new(LATENCY_WINDOW_SIZE)),
        }
    }

    /// Normalizes a Kalshi book: YES `[cents, qty]` levels become bids at
    /// `cents/100`, NO levels become asks at `1 − cents/100`.
    ///
    /// Returns `None` (with an error log) on any out-of-range price or
    /// negative quantity.
    #[must_use]
    pub fn normalize_kalshi(&self, raw: &RawKalshiBook) -> Option<NormalizedOrderBook> {
        let started = Instant::now();

        let yes = raw.yes.as_deref().unwrap_or_default();
        let no = raw.no.as_deref().unwrap_or_default();

        let mut bids = Vec::with_capacity(yes.len());
        for &[cents, qty] in yes {
            match kalshi_level(cents, qty, false) {
                Ok(Some(level)) => bids.push(level),
                Ok(None) => {}
                Err(reason) => {
                    error!(ticker = %raw.ticker, cents, qty, reason, "rejecting Kalshi book");
                    return None;
                }
            }
        }

        let mut asks = Vec::with_capacity(no.len());
        for &[cents, qty] in no {
            match kalshi_level(cents, qty, true) {
                Ok(Some(level)) => asks.push(level),
                Ok(None) => {}
                Err(reason) => {
                    error!(ticker = %raw.ticker, cents, qty, reason, "rejecting Kalshi book");
                    return None;
                }
            }
        }

        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        let book = NormalizedOrderBook {
            venue: Venue::Kalshi,
            contract_id: raw.ticker.clone(),
            bids,
            asks,
            timestamp: Utc::now(),
            seq: raw.seq,
        };

        self.finish(&book, started);
        Some(book)
    }

    /// Normalizes a Polymarket book: decimal-string bids/asks parsed as-is.
    ///
    /// Returns `None` (with an error log) on unparseable strings,
    /// out-of-range prices, or negative sizes.
    #[must_use]
    pub fn normalize_polymarket(&self, raw: &RawPolymarketBook) -> Option<NormalizedOrderBook> {
        let started = Instant::now();

        let parse_side = |levels: Option<&[RawPolymarketLevel]>| -> Result<Vec<PriceLevel>, String> {
            let mut out = Vec::new();
            for level in levels.unwrap_or_default() {
                let price: Decimal = level
                    .price
                    .parse()
                    .map_err(|_| format!("unparseable price {:?}", level.price))?;
                let size: Decimal = level
                    .size
                    .parse()
                    .map_err(|_| format!("unparseable size {:?}", level.size))?;
                if price < Decimal::ZERO || price > Decimal::ONE {
                    return Err(format!("price {price} outside [0, 1]"));
                }
                if size < Decimal::ZERO {
                    return Err(format!("negative size {size}"));
                }
                if size > Decimal::ZERO {
                    out.push(PriceLevel::new(price, size));
                }
            }
            Ok(out)
        };

        let mut bids = match parse_side(raw.bids.as_deref()) {
            Ok(levels) => levels,
            Err(reason) => {
                error!(asset_id = %raw.asset_id, reason, "rejecting Polymarket book");
                return None;
            }
        };
        let mut asks = match parse_side(raw.asks.as_deref()) {
            Ok(levels) => levels,
            Err(reason) => {
                error!(asset_id = %raw.asset_id, reason, "rejecting Polymarket book");
                return None;
            }
        };

        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        let book = NormalizedOrderBook {
            venue: Venue::Polymarket,
            contract_id: raw.asset_id.clone(),
            bids,
            asks,
            timestamp: Utc::now(),
            seq: raw.seq,
        };

        self.finish(&book, started);
        Some(book)
    }

    /// 95th-percentile normalization latency over the last 100 calls, ms.
    #[must_use]
    pub fn p95_latency_ms(&self) -> Option<f64> {
        self.latency.lock().p95()
    }

    fn finish(&self, book: &NormalizedOrderBook, started: Instant) {
        match book.flag() {
            Some(BookFlag::CrossedMarket) => warn!(
                venue = %book.venue,
                contract_id = %book.contract_id,
                best_bid = %book.best_bid().unwrap_or_default(),
                best_ask = %book.best_ask().unwrap_or_default(),
                "crossed_market"
            ),
            Some(BookFlag::ZeroSpread) => info!(
                venue = %book.venue,
                contract_id = %book.contract_id,
                "zero_spread"
            ),
            Some(BookFlag::Normal) => debug!(
                venue = %book.venue,
                contract_id = %book.contract_id,
                "normal"
            ),
            None => {}
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let mut window = self.latency.lock();
        window.record(elapsed_ms);
        if let Some(p95) = window.p95() {
            if p95 > SLA_P95_MS {
                warn!(p95_ms = p95, sla_ms = SLA_P95_MS, "normalization latency SLA exceeded");
            }
        }
    }
}

impl Default for OrderBookNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates one Kalshi level and converts it, dropping zero-quantity
/// levels. `invert` maps NO cents to ask prices (`1 − cents/100`).
fn kalshi_level(cents: i64, qty: i64, invert: bool) -> Result<Option<PriceLevel>, &'static str> {
    if !(0..=100).contains(&cents) {
        return Err("price cents outside [0, 100]");
    }
    if qty < 0 {
        return Err("negative quantity");
    }
    if qty == 0 {
        return Ok(None);
    }
    let price = Decimal::new(cents, 2);
    let price = if invert { Decimal::ONE - price } else { price };
    Ok(Some(PriceLevel::new(price, Decimal::from(qty))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn kalshi_raw(yes: Vec<[i64; 2]>, no: Vec<[i64; 2]>) -> RawKalshiBook {
        RawKalshiBook {
            ticker: "KXBTC-TEST".to_string(),
            yes: Some(yes),
            no: Some(no),
            seq: Some(7),
        }
    }

    fn poly_level(price: &str, size: &str) -> RawPolymarketLevel {
        RawPolymarketLevel {
            price: price.to_string(),
            size: size.to_string(),
        }
    }

    // ==================== Kalshi Tests ====================

    #[test]
    fn test_kalshi_yes_becomes_bids() {
        let normalizer = OrderBookNormalizer::new();
        let book = normalizer
            .normalize_kalshi(&kalshi_raw(vec![[44, 500], [43, 200]], vec![]))
            .unwrap();

        assert_eq!(book.venue, Venue::Kalshi);
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.bids[0].price, dec!(0.44));
        assert_eq!(book.bids[0].quantity, dec!(500));
        assert_eq!(book.bids[1].price, dec!(0.43));
        assert!(book.asks.is_empty());
        assert_eq!(book.seq, Some(7));
    }

    #[test]
    fn test_kalshi_no_becomes_inverted_asks_sorted_ascending() {
        let normalizer = OrderBookNormalizer::new();
        // NO at 55¢ → ask at 0.45; NO at 53¢ → ask at 0.47.
        let book = normalizer
            .normalize_kalshi(&kalshi_raw(vec![], vec![[53, 100], [55, 500]]))
            .unwrap();

        assert_eq!(book.asks.len(), 2);
        assert_eq!(book.asks[0].price, dec!(0.45));
        assert_eq!(book.asks[0].quantity, dec!(500));
        assert_eq!(book.asks[1].price, dec!(0.47));
    }

    #[test]
    fn test_kalshi_boundary_prices_accepted() {
        let normalizer = OrderBookNormalizer::new();
        let book = normalizer
            .normalize_kalshi(&kalshi_raw(vec![[0, 10], [100, 10]], vec![[0, 10], [100, 10]]))
            .unwrap();

        assert_eq!(book.bids[0].price, dec!(1.00));
        assert_eq!(book.bids[1].price, dec!(0.00));
        assert_eq!(book.asks[0].price, dec!(0.00));
        assert_eq!(book.asks[1].price, dec!(1.00));
    }

    #[test]
    fn test_kalshi_out_of_range_price_rejected() {
        let normalizer = OrderBookNormalizer::new();
        assert!(normalizer
            .normalize_kalshi(&kalshi_raw(vec![[101, 10]], vec![]))
            .is_none());
        assert!(normalizer
            .normalize_kalshi(&kalshi_raw(vec![[-1, 10]], vec![]))
            .is_none());
    }

    #[test]
    fn test_kalshi_negative_quantity_rejected() {
        let normalizer = OrderBookNormalizer::new();
        assert!(normalizer
            .normalize_kalshi(&kalshi_raw(vec![[44, -5]], vec![]))
            .is_none());
    }

    #[test]
    fn test_kalshi_zero_quantity_levels_dropped() {
        let normalizer = OrderBookNormalizer::new();
        let book = normalizer
            .normalize_kalshi(&kalshi_raw(vec![[44, 0], [43, 100]], vec![]))
            .unwrap();
        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.bids[0].price, dec!(0.43));
    }

    #[test]
    fn test_kalshi_missing_sides_are_empty() {
        let normalizer = OrderBookNormalizer::new();
        let raw = RawKalshiBook {
            ticker: "KXBTC-TEST".to_string(),
            yes: None,
            no: None,
            seq: None,
        };
        let book = normalizer.normalize_kalshi(&raw).unwrap();
        assert!(book.bids.is_empty());
        assert!(book.asks.is_empty());
    }

    #[test]
    fn test_kalshi_double_transform_is_exact() {
        // YES 44¢ and NO 56¢ describe the same 0.44 probability point;
        // normalizing twice must produce bit-identical decimals.
        let normalizer = OrderBookNormalizer::new();
        let raw = kalshi_raw(vec![[44, 500]], vec![[56, 500]]);

        let first = normalizer.normalize_kalshi(&raw).unwrap();
        let second = normalizer.normalize_kalshi(&raw).unwrap();

        assert_eq!(first.bids[0].price, second.bids[0].price);
        assert_eq!(first.asks[0].price, second.asks[0].price);
        assert_eq!(first.bids[0].price, first.asks[0].price);
        assert_eq!(first.bids[0].price.round_dp(10), dec!(0.44).round_dp(10));
    }

    // ==================== Polymarket Tests ====================

    #[test]
    fn test_polymarket_parses_decimal_strings() {
        let normalizer = OrderBookNormalizer::new();
        let raw = RawPolymarketBook {
            asset_id: "0xabc".to_string(),
            bids: Some(vec![poly_level("0.55", "500"), poly_level("0.54", "100")]),
            asks: Some(vec![poly_level("0.56", "500")]),
            seq: None,
        };

        let book = normalizer.normalize_polymarket(&raw).unwrap();
        assert_eq!(book.venue, Venue::Polymarket);
        assert_eq!(book.best_bid(), Some(dec!(0.55)));
        assert_eq!(book.best_ask(), Some(dec!(0.56)));
    }

    #[test]
    fn test_polymarket_price_string_roundtrip() {
        let normalizer = OrderBookNormalizer::new();
        let raw = RawPolymarketBook {
            asset_id: "0xabc".to_string(),
            bids: Some(vec![poly_level("0.5500000001", "1")]),
            asks: None,
            seq: None,
        };

        let book = normalizer.normalize_polymarket(&raw).unwrap();
        assert_eq!(
            book.bids[0].price.round_dp(10),
            dec!(0.5500000001).round_dp(10)
        );
    }

    #[test]
    fn test_polymarket_unparseable_price_rejected() {
        let normalizer = OrderBookNormalizer::new();
        let raw = RawPolymarketBook {
            asset_id: "0xabc".to_string(),
            bids: Some(vec![poly_level("NaN", "10")]),
            asks: None,
            seq: None,
        };
        assert!(normalizer.normalize_polymarket(&raw).is_none());
    }

    #[test]
    fn test_polymarket_out_of_range_rejected() {
        let normalizer = OrderBookNormalizer::new();
        for price in ["1.01", "-0.01"] {
            let raw = RawPolymarketBook {
                asset_id: "0xabc".to_string(),
                bids: Some(vec![poly_level(price, "10")]),
                asks: None,
                seq: None,
            };
            assert!(normalizer.normalize_polymarket(&raw).is_none(), "price {price}");
        }
    }

    #[test]
    fn test_polymarket_boundary_prices_accepted() {
        let normalizer = OrderBookNormalizer::new();
        let raw = RawPolymarketBook {
            asset_id: "0xabc".to_string(),
            bids: Some(vec![poly_level("0", "10")]),
            asks: Some(vec![poly_level("1", "10")]),
            seq: None,
        };
        let book = normalizer.normalize_polymarket(&raw).unwrap();
        assert_eq!(book.best_bid(), Some(dec!(0)));
        assert_eq!(book.best_ask(), Some(dec!(1)));
    }

    #[test]
    fn test_polymarket_missing_sides_are_empty() {
        let normalizer = OrderBookNormalizer::new();
        let raw = RawPolymarketBook {
            asset_id: "0xabc".to_string(),
            bids: None,
            asks: None,
            seq: None,
        };
        let book = normalizer.normalize_polymarket(&raw).unwrap();
        assert!(book.bids.is_empty());
        assert!(book.asks.is_empty());
    }

    // ==================== Latency Tests ====================

    #[test]
    fn test_latency_window_fills_with_calls() {
        let normalizer = OrderBookNormalizer::new();
        assert_eq!(normalizer.p95_latency_ms(), None);

        for _ in 0..5 {
            let _ = normalizer.normalize_kalshi(&kalshi_raw(vec![[44, 10]], vec![]));
        }
        assert!(normalizer.p95_latency_ms().is_some());
    }
}
