//! Event vocabulary for the in-process bus.
//!
//! Every event name is a stable dot-delimited string; payloads are immutable
//! snapshots embedding an [`EventHeader`] with the timestamp and the
//! correlation id threaded through the originating opportunity or tick.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ExecutionError;
use crate::types::{
    ConnectorMode, HealthStatus, OrderResult, ReconciliationDiscrepancy, Side, Venue, VenueHealth,
};

// =============================================================================
// Header
// =============================================================================

/// Common envelope embedded in every event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHeader {
    pub timestamp: DateTime<Utc>,
    /// Set once at the outer entry (scheduler tick or operator call) and
    /// carried through orders, events, and logs.
    pub correlation_id: Uuid,
}

impl EventHeader {
    /// Creates a header stamped now.
    #[must_use]
    pub fn new(correlation_id: Uuid) -> Self {
        Self {
            timestamp: Utc::now(),
            correlation_id,
        }
    }

    /// Creates a header with a fresh correlation id, for events that start
    /// their own lifecycle (ticks, operator calls).
    #[must_use]
    pub fn root() -> Self {
        Self::new(Uuid::new_v4())
    }
}

// =============================================================================
// Health / Degradation Payloads
// =============================================================================

/// Emitted every health tick, per venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthUpdatedEvent {
    pub header: EventHeader,
    pub health: VenueHealth,
    /// Why the venue is unhealthy, when it is (`stale_data`, `high_latency`).
    pub reason: Option<String>,
}

/// Emitted exactly once per confirmed health transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthTransitionEvent {
    pub header: EventHeader,
    pub venue: Venue,
    pub from: HealthStatus,
    pub to: HealthStatus,
    pub reason: String,
}

/// Degradation protocol switched on for a venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationActivatedEvent {
    pub header: EventHeader,
    pub venue: Venue,
    pub reason: String,
    pub last_data_timestamp: Option<DateTime<Utc>>,
}

/// Degradation protocol switched off for a venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationDeactivatedEvent {
    pub header: EventHeader,
    pub venue: Venue,
    pub outage_duration_ms: u64,
}

// =============================================================================
// Execution Payloads
// =============================================================================

/// A leg order filled (entry, retry, close, or exit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFilledEvent {
    pub header: EventHeader,
    pub pair_id: String,
    pub position_id: Option<Uuid>,
    pub order: OrderResult,
    pub side: Side,
    pub is_paper: bool,
}

/// An opportunity failed before creating any position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFailedEvent {
    pub header: EventHeader,
    pub opportunity_id: Uuid,
    pub pair_id: String,
    pub error: ExecutionError,
}

/// Snapshot of one leg inside an exposure event. For filled legs `price` and
/// `size` are the fill values; for failed legs they are the intended
/// (pre-submit) values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegSnapshot {
    pub venue: Venue,
    pub contract_id: String,
    pub side: Side,
    pub price: Decimal,
    pub size: u64,
    pub order_id: Option<String>,
}

/// Best bid/ask per venue at the time an exposure event was built.
/// `None` means the book was unavailable or empty on that side.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub kalshi_best_bid: Option<Decimal>,
    pub kalshi_best_ask: Option<Decimal>,
    pub polymarket_best_bid: Option<Decimal>,
    pub polymarket_best_ask: Option<Decimal>,
}

impl MarketSnapshot {
    /// Returns the best bid on the given venue.
    #[must_use]
    pub fn best_bid(&self, venue: Venue) -> Option<Decimal> {
        match venue {
            Venue::Kalshi => self.kalshi_best_bid,
            Venue::Polymarket => self.polymarket_best_bid,
        }
    }

    /// Returns the best ask on the given venue.
    #[must_use]
    pub fn best_ask(&self, venue: Venue) -> Option<Decimal> {
        match venue {
            Venue::Kalshi => self.kalshi_best_ask,
            Venue::Polymarket => self.polymarket_best_ask,
        }
    }

    /// True when not a single best price is known.
    #[must_use]
    pub fn is_blind(&self) -> bool {
        self.kalshi_best_bid.is_none()
            && self.kalshi_best_ask.is_none()
            && self.polymarket_best_bid.is_none()
            && self.polymarket_best_ask.is_none()
    }
}

/// Operator-facing P&L scenarios for an exposed position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlScenarios {
    pub close_now: String,
    pub retry_at_current: String,
    pub hold_risk_assessment: String,
}

/// One leg filled, the other failed. Also reused for exit-partial exposure
/// and for the periodic reminder, which carries the same payload shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleLegExposureEvent {
    pub header: EventHeader,
    pub position_id: Uuid,
    pub pair_id: String,
    pub filled_leg: LegSnapshot,
    pub failed_leg: LegSnapshot,
    pub current_prices: MarketSnapshot,
    pub pnl_scenarios: PnlScenarios,
    pub recommended_actions: Vec<String>,
    pub error: ExecutionError,
    pub is_paper: bool,
    pub mixed_mode: bool,
}

/// How an exposed position was resolved by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    Retried,
    Closed,
}

/// An exposed position was resolved (hedge restored or leg closed out).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleLegResolvedEvent {
    pub header: EventHeader,
    pub position_id: Uuid,
    pub pair_id: String,
    pub resolution: ResolutionType,
    pub original_edge: Decimal,
    /// `|entry fill − retry fill|` for retries; absent for closes.
    pub new_edge: Option<Decimal>,
    pub retry_price: Option<Decimal>,
    pub realized_pnl: Option<Decimal>,
}

/// Which exit threshold fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitType {
    StopLoss,
    TakeProfit,
    TimeBased,
}

impl ExitType {
    /// Returns the display string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StopLoss => "stop_loss",
            Self::TakeProfit => "take_profit",
            Self::TimeBased => "time_based",
        }
    }
}

impl std::fmt::Display for ExitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A position was fully exited by the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitTriggeredEvent {
    pub header: EventHeader,
    pub position_id: Uuid,
    pub pair_id: String,
    pub exit_type: ExitType,
    pub initial_edge: Decimal,
    pub final_edge: Decimal,
    pub realized_pnl: Decimal,
    pub exit_primary_order_id: String,
    pub exit_secondary_order_id: String,
}

// =============================================================================
// Limit Payloads
// =============================================================================

/// An exposure counter is nearing or at its soft limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitApproachedEvent {
    pub header: EventHeader,
    pub limit_type: String,
    pub count: u32,
    pub threshold: u32,
}

/// An exposure limit was breached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitBreachedEvent {
    pub header: EventHeader,
    pub limit_type: String,
    pub consecutive_weeks: u32,
}

// =============================================================================
// Reconciliation Payloads
// =============================================================================

/// A divergence between local state and venue truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyEvent {
    pub header: EventHeader,
    pub discrepancy: ReconciliationDiscrepancy,
}

/// Summary of a completed reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationCompleteEvent {
    pub header: EventHeader,
    pub positions_checked: u32,
    pub orders_verified: u32,
    pub pending_orders_resolved: u32,
    pub discrepancies_found: u32,
    pub duration_ms: u64,
    pub summary: String,
}

// =============================================================================
// The Event Enum
// =============================================================================

/// Every event carried on the bus, one variant per stable name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    HealthUpdated(HealthUpdatedEvent),
    HealthDegraded(HealthTransitionEvent),
    HealthRecovered(HealthTransitionEvent),
    HealthDisconnected(HealthTransitionEvent),
    DegradationActivated(DegradationActivatedEvent),
    DegradationDeactivated(DegradationDeactivatedEvent),
    OrderFilled(OrderFilledEvent),
    ExecutionFailed(ExecutionFailedEvent),
    SingleLegExposure(SingleLegExposureEvent),
    SingleLegExposureReminder(SingleLegExposureEvent),
    SingleLegResolved(SingleLegResolvedEvent),
    ExitTriggered(ExitTriggeredEvent),
    LimitApproached(LimitApproachedEvent),
    LimitBreached(LimitBreachedEvent),
    ReconciliationDiscrepancy(DiscrepancyEvent),
    ReconciliationComplete(ReconciliationCompleteEvent),
}

impl Event {
    /// Returns the stable dot-delimited event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::HealthUpdated(_) => "platform.health.updated",
            Self::HealthDegraded(_) => "platform.health.degraded",
            Self::HealthRecovered(_) => "platform.health.recovered",
            Self::HealthDisconnected(_) => "platform.health.disconnected",
            Self::DegradationActivated(_) => "degradation.activated",
            Self::DegradationDeactivated(_) => "degradation.deactivated",
            Self::OrderFilled(_) => "order.filled",
            Self::ExecutionFailed(_) => "execution.failed",
            Self::SingleLegExposure(_) => "execution.single_leg.exposure",
            Self::SingleLegExposureReminder(_) => "execution.single_leg.exposure_reminder",
            Self::SingleLegResolved(_) => "execution.single_leg.resolved",
            Self::ExitTriggered(_) => "execution.exit.triggered",
            Self::LimitApproached(_) => "limit.approached",
            Self::LimitBreached(_) => "limit.breached",
            Self::ReconciliationDiscrepancy(_) => "reconciliation.discrepancy",
            Self::ReconciliationComplete(_) => "reconciliation.complete",
        }
    }

    /// Returns the embedded header.
    #[must_use]
    pub fn header(&self) -> &EventHeader {
        match self {
            Self::HealthUpdated(e) => &e.header,
            Self::HealthDegraded(e) | Self::HealthRecovered(e) | Self::HealthDisconnected(e) => {
                &e.header
            }
            Self::DegradationActivated(e) => &e.header,
            Self::DegradationDeactivated(e) => &e.header,
            Self::OrderFilled(e) => &e.header,
            Self::ExecutionFailed(e) => &e.header,
            Self::SingleLegExposure(e) | Self::SingleLegExposureReminder(e) => &e.header,
            Self::SingleLegResolved(e) => &e.header,
            Self::ExitTriggered(e) => &e.header,
            Self::LimitApproached(e) => &e.header,
            Self::LimitBreached(e) => &e.header,
            Self::ReconciliationDiscrepancy(e) => &e.header,
            Self::ReconciliationComplete(e) => &e.header,
        }
    }
}

/// Mode flags derived from the two connectors involved in a position.
#[must_use]
pub fn mode_flags(primary: ConnectorMode, secondary: ConnectorMode) -> (bool, bool) {
    let is_paper = primary == ConnectorMode::Paper || secondary == ConnectorMode::Paper;
    let mixed_mode = primary != secondary;
    (is_paper, mixed_mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_event_names_are_stable() {
        let header = EventHeader::root();
        let event = Event::LimitApproached(LimitApproachedEvent {
            header,
            limit_type: "monthly_exposure".to_string(),
            count: 6,
            threshold: 5,
        });
        assert_eq!(event.name(), "limit.approached");
    }

    #[test]
    fn test_market_snapshot_blind() {
        let empty = MarketSnapshot::default();
        assert!(empty.is_blind());

        let partial = MarketSnapshot {
            kalshi_best_bid: Some(dec!(0.44)),
            ..MarketSnapshot::default()
        };
        assert!(!partial.is_blind());
    }

    #[test]
    fn test_market_snapshot_per_venue_access() {
        let snapshot = MarketSnapshot {
            kalshi_best_bid: Some(dec!(0.44)),
            kalshi_best_ask: Some(dec!(0.45)),
            polymarket_best_bid: Some(dec!(0.55)),
            polymarket_best_ask: Some(dec!(0.56)),
        };
        assert_eq!(snapshot.best_bid(Venue::Kalshi), Some(dec!(0.44)));
        assert_eq!(snapshot.best_ask(Venue::Polymarket), Some(dec!(0.56)));
    }

    #[test]
    fn test_mode_flags() {
        assert_eq!(
            mode_flags(ConnectorMode::Paper, ConnectorMode::Paper),
            (true, false)
        );
        assert_eq!(
            mode_flags(ConnectorMode::Live, ConnectorMode::Paper),
            (true, true)
        );
        assert_eq!(
            mode_flags(ConnectorMode::Live, ConnectorMode::Live),
            (false, false)
        );
    }

    #[test]
    fn test_header_correlation_is_carried() {
        let id = Uuid::new_v4();
        let header = EventHeader::new(id);
        let event = Event::LimitBreached(LimitBreachedEvent {
            header,
            limit_type: "weekly_consecutive_exposure".to_string(),
            consecutive_weeks: 3,
        });
        assert_eq!(event.header().correlation_id, id);
    }
}
