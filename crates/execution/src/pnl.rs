//! Single-leg P&L scenarios.
//!
//! Pure functions that price an unhedged leg three ways for the operator:
//! close it now into the current book, retry the missing leg at current
//! prices, or hold. All arithmetic is exact decimal; missing market data
//! degrades to `"UNAVAILABLE"` instead of failing.

use rust_decimal::Decimal;
use uuid::Uuid;

use arb_core::events::{MarketSnapshot, PnlScenarios};
use arb_core::types::{Side, Venue};

/// Sentinel for scenarios that cannot be priced from the available books.
pub const UNAVAILABLE: &str = "UNAVAILABLE";

/// The leg that filled, priced for scenario analysis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilledLegView {
    pub venue: Venue,
    pub side: Side,
    pub fill_price: Decimal,
    pub size: u64,
    pub taker_fee: Decimal,
}

/// The leg that failed, described by where a retry would trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecondaryLegView {
    pub venue: Venue,
    pub side: Side,
    pub taker_fee: Decimal,
}

/// Everything computed for one exposed position.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioReport {
    pub scenarios: PnlScenarios,
    pub recommended_actions: Vec<String>,
}

/// P&L of unwinding the filled leg into the current book, net of taker fee.
/// `None` when the opposing side is not quoted.
#[must_use]
pub fn close_now_pnl(filled: &FilledLegView, prices: &MarketSnapshot) -> Option<Decimal> {
    let unwind_price = match filled.side {
        Side::Buy => prices.best_bid(filled.venue),
        Side::Sell => prices.best_ask(filled.venue),
    }?;
    let size = Decimal::from(filled.size);
    let gross = match filled.side {
        Side::Buy => (unwind_price - filled.fill_price) * size,
        Side::Sell => (filled.fill_price - unwind_price) * size,
    };
    Some(gross - unwind_price * size * filled.taker_fee)
}

/// Close-now scenario as an operator string (two-decimal dollars).
#[must_use]
pub fn close_now(filled: &FilledLegView, prices: &MarketSnapshot) -> String {
    match close_now_pnl(filled, prices) {
        Some(pnl) => format!("${:.2}", pnl),
        None => UNAVAILABLE.to_string(),
    }
}

/// Gross edge of retrying the missing leg at its venue's current price, net
/// of both taker fees. `None` when the secondary side is not quoted.
#[must_use]
pub fn retry_edge(
    filled: &FilledLegView,
    secondary: &SecondaryLegView,
    prices: &MarketSnapshot,
) -> Option<Decimal> {
    let secondary_current = match secondary.side {
        Side::Sell => prices.best_bid(secondary.venue),
        Side::Buy => prices.best_ask(secondary.venue),
    }?;
    Some(
        (filled.fill_price - secondary_current).abs()
            - filled.fill_price * filled.taker_fee
            - secondary_current * secondary.taker_fee,
    )
}

/// Retry scenario as an operator string: the gross edge expressed as a
/// percentage of the mean of the two prices.
#[must_use]
pub fn retry_at_current(
    filled: &FilledLegView,
    secondary: &SecondaryLegView,
    prices: &MarketSnapshot,
) -> String {
    let Some(secondary_current) = (match secondary.side {
        Side::Sell => prices.best_bid(secondary.venue),
        Side::Buy => prices.best_ask(secondary.venue),
    }) else {
        return UNAVAILABLE.to_string();
    };

    let edge = (filled.fill_price - secondary_current).abs()
        - filled.fill_price * filled.taker_fee
        - secondary_current * secondary.taker_fee;
    let mean = (filled.fill_price + secondary_current) / Decimal::TWO;
    let pct = if mean.is_zero() {
        Decimal::ZERO
    } else {
        edge / mean * Decimal::ONE_HUNDRED
    };

    if edge > Decimal::ZERO {
        format!("Retry would yield ~{:.2}% edge", pct)
    } else {
        format!("Retry at current price would result in ~{:.2}% loss", pct.abs())
    }
}

/// Hold scenario: states the unhedged dollar exposure; flags stale data when
/// not a single best price is known.
#[must_use]
pub fn hold_risk_assessment(filled: &FilledLegView, prices: &MarketSnapshot) -> String {
    let exposure = filled.fill_price * Decimal::from(filled.size);
    let mut text = format!(
        "EXPOSED: ${:.2} on {} ({} {}@{}). No hedge. Immediate operator action recommended.",
        exposure,
        filled.venue,
        filled.side,
        filled.size,
        filled.fill_price,
    );
    if prices.is_blind() {
        text.push_str(" Current market prices unavailable - risk assessment may be stale.");
    }
    text
}

/// Builds the full scenario report plus the ordered recommended actions.
#[must_use]
pub fn build_report(
    position_id: Uuid,
    filled: &FilledLegView,
    secondary: &SecondaryLegView,
    prices: &MarketSnapshot,
) -> ScenarioReport {
    let close = close_now(filled, prices);
    let retry = retry_at_current(filled, secondary, prices);
    let hold = hold_risk_assessment(filled, prices);

    let retry_is_positive = retry_edge(filled, secondary, prices)
        .is_some_and(|edge| edge > Decimal::ZERO);
    let close_available = close != UNAVAILABLE;

    let mut actions = Vec::new();
    if retry_is_positive {
        actions.push(format!(
            "Retry the unfilled leg via POST /positions/{position_id}/retry-leg; current prices indicate positive edge"
        ));
    }
    if close_available && !retry_is_positive {
        actions.push(format!(
            "Close the filled leg via POST /positions/{position_id}/close-leg to flatten exposure"
        ));
    }
    actions.push(format!(
        "Monitor via GET /positions/{position_id}/exposure"
    ));

    ScenarioReport {
        scenarios: PnlScenarios {
            close_now: close,
            retry_at_current: retry,
            hold_risk_assessment: hold,
        },
        recommended_actions: actions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn filled_buy() -> FilledLegView {
        FilledLegView {
            venue: Venue::Kalshi,
            side: Side::Buy,
            fill_price: dec!(0.45),
            size: 200,
            taker_fee: dec!(0.02),
        }
    }

    fn secondary_sell() -> SecondaryLegView {
        SecondaryLegView {
            venue: Venue::Polymarket,
            side: Side::Sell,
            taker_fee: dec!(0.02),
        }
    }

    fn full_snapshot() -> MarketSnapshot {
        MarketSnapshot {
            kalshi_best_bid: Some(dec!(0.44)),
            kalshi_best_ask: Some(dec!(0.45)),
            polymarket_best_bid: Some(dec!(0.55)),
            polymarket_best_ask: Some(dec!(0.56)),
        }
    }

    // ==================== close_now Tests ====================

    #[test]
    fn test_close_now_buy_uses_best_bid() {
        // Unwind 200 bought at 0.45 into the 0.44 bid:
        // (0.44 - 0.45) * 200 - 0.44 * 200 * 0.02 = -2.00 - 1.76 = -3.76
        let pnl = close_now_pnl(&filled_buy(), &full_snapshot()).unwrap();
        assert_eq!(pnl, dec!(-3.76));
        assert_eq!(close_now(&filled_buy(), &full_snapshot()), "$-3.76");
    }

    #[test]
    fn test_close_now_sell_uses_best_ask() {
        let filled = FilledLegView {
            venue: Venue::Polymarket,
            side: Side::Sell,
            fill_price: dec!(0.55),
            size: 100,
            taker_fee: dec!(0.02),
        };
        // (0.55 - 0.56) * 100 - 0.56 * 100 * 0.02 = -1.00 - 1.12 = -2.12
        assert_eq!(
            close_now_pnl(&filled, &full_snapshot()),
            Some(dec!(-2.12))
        );
    }

    #[test]
    fn test_close_now_unavailable_without_opposing_side() {
        let prices = MarketSnapshot {
            kalshi_best_bid: None,
            ..full_snapshot()
        };
        assert_eq!(close_now(&filled_buy(), &prices), UNAVAILABLE);
    }

    // ==================== retry_at_current Tests ====================

    #[test]
    fn test_retry_positive_edge_phrasing() {
        // Secondary sells into the 0.55 bid:
        // |0.45 - 0.55| - 0.45*0.02 - 0.55*0.02 = 0.10 - 0.009 - 0.011 = 0.08
        // mean = 0.50, pct = 16.00
        let text = retry_at_current(&filled_buy(), &secondary_sell(), &full_snapshot());
        assert_eq!(text, "Retry would yield ~16.00% edge");
        assert_eq!(
            retry_edge(&filled_buy(), &secondary_sell(), &full_snapshot()),
            Some(dec!(0.08))
        );
    }

    #[test]
    fn test_retry_negative_edge_phrasing() {
        let prices = MarketSnapshot {
            polymarket_best_bid: Some(dec!(0.46)),
            ..full_snapshot()
        };
        // |0.45 - 0.46| - 0.009 - 0.0092 = 0.01 - 0.0182 = -0.0082
        let text = retry_at_current(&filled_buy(), &secondary_sell(), &prices);
        assert!(text.starts_with("Retry at current price would result in ~"));
        assert!(text.ends_with("% loss"));
    }

    #[test]
    fn test_retry_unavailable_without_secondary_prices() {
        let prices = MarketSnapshot {
            polymarket_best_bid: None,
            ..full_snapshot()
        };
        assert_eq!(
            retry_at_current(&filled_buy(), &secondary_sell(), &prices),
            UNAVAILABLE
        );
    }

    // ==================== hold_risk_assessment Tests ====================

    #[test]
    fn test_hold_risk_states_dollar_exposure() {
        let text = hold_risk_assessment(&filled_buy(), &full_snapshot());
        assert!(text.contains("EXPOSED: $90.00"), "got: {text}");
        assert!(text.contains("kalshi"));
        assert!(text.contains("buy 200@0.45"));
        assert!(text.contains("No hedge."));
        assert!(!text.contains("stale"));
    }

    #[test]
    fn test_hold_risk_flags_blind_snapshot() {
        let text = hold_risk_assessment(&filled_buy(), &MarketSnapshot::default());
        assert!(text.contains("risk assessment may be stale"));
    }

    #[test]
    fn test_hold_risk_not_stale_with_one_known_price() {
        let prices = MarketSnapshot {
            polymarket_best_ask: Some(dec!(0.56)),
            ..MarketSnapshot::default()
        };
        let text = hold_risk_assessment(&filled_buy(), &prices);
        assert!(!text.contains("stale"));
    }

    // ==================== Recommended Actions Tests ====================

    #[test]
    fn test_actions_lead_with_retry_when_positive() {
        let id = Uuid::new_v4();
        let report = build_report(id, &filled_buy(), &secondary_sell(), &full_snapshot());

        assert_eq!(report.recommended_actions.len(), 2);
        assert!(report.recommended_actions[0].contains("retry-leg"));
        assert!(report.recommended_actions[1].contains(&format!("GET /positions/{id}/exposure")));
    }

    #[test]
    fn test_actions_offer_close_when_retry_not_positive() {
        let prices = MarketSnapshot {
            polymarket_best_bid: Some(dec!(0.46)),
            ..full_snapshot()
        };
        let report = build_report(Uuid::new_v4(), &filled_buy(), &secondary_sell(), &prices);

        assert!(report.recommended_actions[0].contains("close-leg"));
        assert!(report.recommended_actions[1].contains("Monitor via GET"));
    }

    #[test]
    fn test_actions_always_include_monitor_clause() {
        let report = build_report(
            Uuid::new_v4(),
            &filled_buy(),
            &secondary_sell(),
            &MarketSnapshot::default(),
        );
        assert_eq!(report.recommended_actions.len(), 1);
        assert!(report.recommended_actions[0].contains("Monitor via GET"));
    }

    #[test]
    fn test_report_is_deterministic() {
        let id = Uuid::new_v4();
        let a = build_report(id, &filled_buy(), &secondary_sell(), &full_snapshot());
        let b = build_report(id, &filled_buy(), &secondary_sell(), &full_snapshot());
        assert_eq!(a, b);
    }
}
