//! Best-effort market context for exposure events.
//!
//! Book fetches here are advisory: each call races a deadline, and any
//! failure degrades to an empty side of the snapshot rather than aborting
//! the exposure path.

use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use arb_connectors::ConnectorRegistry;
use arb_core::error::{ExecutionError, ExecutionErrorCode};
use arb_core::events::{
    EventHeader, LegSnapshot, MarketSnapshot, SingleLegExposureEvent,
};
use arb_core::types::{ContractPair, Venue};

use crate::pnl::{self, FilledLegView, SecondaryLegView};

/// Fetches best bid/ask on both venues of a pair, best-effort, each call
/// bounded by `timeout`.
pub async fn fetch_market_snapshot(
    registry: &ConnectorRegistry,
    pair: &ContractPair,
    timeout: Duration,
) -> MarketSnapshot {
    let kalshi = registry.get(Venue::Kalshi);
    let polymarket = registry.get(Venue::Polymarket);

    let (kalshi_book, polymarket_book) = tokio::join!(
        tokio::time::timeout(timeout, kalshi.get_order_book(&pair.kalshi_contract_id)),
        tokio::time::timeout(
            timeout,
            polymarket.get_order_book(&pair.polymarket_contract_id)
        ),
    );

    let mut snapshot = MarketSnapshot::default();
    match kalshi_book {
        Ok(Ok(book)) => {
            snapshot.kalshi_best_bid = book.best_bid();
            snapshot.kalshi_best_ask = book.best_ask();
        }
        other => debug!(outcome = ?other.map(|r| r.map(|_| ())), "kalshi book unavailable for P&L context"),
    }
    match polymarket_book {
        Ok(Ok(book)) => {
            snapshot.polymarket_best_bid = book.best_bid();
            snapshot.polymarket_best_ask = book.best_ask();
        }
        other => debug!(outcome = ?other.map(|r| r.map(|_| ())), "polymarket book unavailable for P&L context"),
    }
    snapshot
}

/// Assembles a single-leg exposure event payload: scenarios, recommended
/// actions, and the structured error with its operator metadata.
#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn build_exposure_event(
    correlation_id: Uuid,
    position_id: Uuid,
    pair: &ContractPair,
    filled_leg: LegSnapshot,
    failed_leg: LegSnapshot,
    prices: MarketSnapshot,
    mode_flags: (bool, bool),
    code: ExecutionErrorCode,
    message: String,
) -> SingleLegExposureEvent {
    let filled_view = FilledLegView {
        venue: filled_leg.venue,
        side: filled_leg.side,
        fill_price: filled_leg.price,
        size: filled_leg.size,
        taker_fee: pair.fees(filled_leg.venue).taker,
    };
    let secondary_view = SecondaryLegView {
        venue: failed_leg.venue,
        side: failed_leg.side,
        taker_fee: pair.fees(failed_leg.venue).taker,
    };
    let report = pnl::build_report(position_id, &filled_view, &secondary_view, &prices);

    let (is_paper, mixed_mode) = mode_flags;
    let metadata = serde_json::json!({
        "pnlScenarios": &report.scenarios,
        "recommendedActions": &report.recommended_actions,
        "positionId": position_id,
        "pairId": pair.pair_id,
    });
    let error = ExecutionError::new(code, message).with_metadata(metadata);

    SingleLegExposureEvent {
        header: EventHeader::new(correlation_id),
        position_id,
        pair_id: pair.pair_id.clone(),
        filled_leg,
        failed_leg,
        current_prices: prices,
        pnl_scenarios: report.scenarios,
        recommended_actions: report.recommended_actions,
        error,
        is_paper,
        mixed_mode,
    }
}
