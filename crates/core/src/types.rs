//! Shared domain types for cross-venue arbitrage operations.
//!
//! Everything that crosses a component boundary lives here: venues, sides,
//! normalized order books, orders, positions, pairs, opportunities, and
//! reservations. All monetary and probability values are `rust_decimal`
//! exact decimals; contract counts are integers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Venue Identifiers
// =============================================================================

/// Identifies which venue a book, order, or position belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    /// Kalshi prediction market (cents-quoted YES/NO books).
    Kalshi,
    /// Polymarket CLOB (decimal-string books, on-chain settlement).
    Polymarket,
}

impl Venue {
    /// Returns the display name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kalshi => "kalshi",
            Self::Polymarket => "polymarket",
        }
    }

    /// Returns the other venue of the pair.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Kalshi => Self::Polymarket,
            Self::Polymarket => Self::Kalshi,
        }
    }

    /// Returns true for the venue whose settlement pipeline can leave
    /// submitted orders pending for minutes (on-chain matching).
    ///
    /// Pending orders on this venue are persisted for reconciliation
    /// instead of being treated as immediate failures.
    #[must_use]
    pub fn is_long_settlement(self) -> bool {
        matches!(self, Self::Polymarket)
    }

    /// Parses a stored venue string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "kalshi" => Some(Self::Kalshi),
            "polymarket" => Some(Self::Polymarket),
            _ => None,
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Sides and Order Shapes
// =============================================================================

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Returns the opposing side.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Returns the display string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }

    /// Parses a stored side string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(Self::Buy),
            "sell" => Some(Self::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Limit,
    Market,
}

/// Parameters for submitting an order to a venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderParams {
    /// Venue-native contract identifier.
    pub contract_id: String,
    pub side: Side,
    /// Number of contracts; must be positive.
    pub quantity: u64,
    /// Limit price in (0, 1].
    pub price: Decimal,
    pub order_type: OrderType,
}

impl OrderParams {
    /// Creates a limit order.
    #[must_use]
    pub fn limit(contract_id: impl Into<String>, side: Side, quantity: u64, price: Decimal) -> Self {
        Self {
            contract_id: contract_id.into(),
            side,
            quantity,
            price,
            order_type: OrderType::Limit,
        }
    }
}

/// Venue-reported order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Fully filled at `filled_price`.
    Filled,
    /// Some quantity filled at a single reported price.
    Partial,
    /// Accepted but unresolved.
    Pending,
    /// Rejected by the venue.
    Rejected,
}

/// Result of an order submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub venue: Venue,
    pub status: OrderStatus,
    pub filled_quantity: u64,
    pub filled_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl OrderResult {
    /// Returns true if any quantity filled (full or partial).
    #[must_use]
    pub fn has_fills(&self) -> bool {
        matches!(self.status, OrderStatus::Filled | OrderStatus::Partial)
    }

    /// Returns true if the order is unresolved at the venue.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }
}

/// Result of an order cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResult {
    pub order_id: String,
    pub cancelled: bool,
}

// =============================================================================
// Order Books
// =============================================================================

/// A single price level of a normalized book.
///
/// `price` is the probability of YES in [0, 1]; `quantity` is positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    #[must_use]
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Flag describing the relationship between best bid and best ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookFlag {
    /// Best bid above best ask. Allowed, but worth shouting about.
    CrossedMarket,
    /// Best bid equals best ask.
    ZeroSpread,
    Normal,
}

/// Venue-agnostic order book: bids descending, asks ascending, prices in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOrderBook {
    pub venue: Venue,
    pub contract_id: String,
    /// Sorted descending by price.
    pub bids: Vec<PriceLevel>,
    /// Sorted ascending by price.
    pub asks: Vec<PriceLevel>,
    pub timestamp: DateTime<Utc>,
    /// Venue sequence number, when the feed provides one.
    pub seq: Option<u64>,
}

impl NormalizedOrderBook {
    /// Returns the best (highest) bid price.
    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Returns the best (lowest) ask price.
    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Classifies the book when both sides are populated.
    #[must_use]
    pub fn flag(&self) -> Option<BookFlag> {
        let (bid, ask) = (self.best_bid()?, self.best_ask()?);
        Some(if bid > ask {
            BookFlag::CrossedMarket
        } else if bid == ask {
            BookFlag::ZeroSpread
        } else {
            BookFlag::Normal
        })
    }

    /// Sums the quantity available to a limit order of the given side.
    ///
    /// A buy consumes asks priced at or below the limit; a sell consumes
    /// bids priced at or above it.
    #[must_use]
    pub fn eligible_depth(&self, side: Side, limit: Decimal) -> Decimal {
        match side {
            Side::Buy => self
                .asks
                .iter()
                .filter(|l| l.price <= limit)
                .map(|l| l.quantity)
                .sum(),
            Side::Sell => self
                .bids
                .iter()
                .filter(|l| l.price >= limit)
                .map(|l| l.quantity)
                .sum(),
        }
    }
}

// =============================================================================
// Venue Health
// =============================================================================

/// Health classification for a venue connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Disconnected,
}

impl HealthStatus {
    /// Returns the display string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a connector trades real or simulated capital.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorMode {
    Live,
    Paper,
}

/// Snapshot of a venue's connection health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueHealth {
    pub venue: Venue,
    pub status: HealthStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub latency_ms_p95: Option<f64>,
    pub mode: ConnectorMode,
}

// =============================================================================
// Fees
// =============================================================================

/// Venue fee schedule; rates are decimal fractions (0.02 = 2%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub maker: Decimal,
    pub taker: Decimal,
    /// Flat per-trade gas cost, for venues that settle on-chain.
    pub gas_usd: Option<Decimal>,
}

impl FeeSchedule {
    #[must_use]
    pub fn new(maker: Decimal, taker: Decimal) -> Self {
        Self {
            maker,
            taker,
            gas_usd: None,
        }
    }

    /// Zero-fee schedule, the default for paper venues.
    #[must_use]
    pub fn free() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO)
    }
}

/// A venue-side holding, as reported by `PlatformConnector::get_positions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenuePosition {
    pub venue: Venue,
    pub contract_id: String,
    pub side: Side,
    pub quantity: u64,
    pub avg_price: Decimal,
}

// =============================================================================
// Contract Pairs
// =============================================================================

/// Two logically linked contracts on different venues resolving to the same
/// underlying event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractPair {
    pub pair_id: String,
    pub kalshi_contract_id: String,
    pub polymarket_contract_id: String,
    /// Which venue's leg is submitted first during execution and exit.
    pub primary_leg: Venue,
    /// When the underlying event resolves, if known.
    pub resolution_date: Option<DateTime<Utc>>,
    pub kalshi_fees: FeeSchedule,
    pub polymarket_fees: FeeSchedule,
}

impl ContractPair {
    /// Returns the contract id traded on the given venue.
    #[must_use]
    pub fn contract_id(&self, venue: Venue) -> &str {
        match venue {
            Venue::Kalshi => &self.kalshi_contract_id,
            Venue::Polymarket => &self.polymarket_contract_id,
        }
    }

    /// Returns the fee schedule for the given venue.
    #[must_use]
    pub fn fees(&self, venue: Venue) -> FeeSchedule {
        match venue {
            Venue::Kalshi => self.kalshi_fees,
            Venue::Polymarket => self.polymarket_fees,
        }
    }

    /// Returns the venue whose leg is submitted second.
    #[must_use]
    pub fn secondary_leg(&self) -> Venue {
        self.primary_leg.other()
    }
}

// =============================================================================
// Opportunities and Reservations
// =============================================================================

/// Capital request attached to a ranked opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub opportunity_id: Uuid,
    pub pair_id: String,
    pub requested_capital_usd: Decimal,
}

/// A live budget reservation. Created by `reserve_budget`; terminated by
/// exactly one of `commit_reservation` / `release_reservation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetReservation {
    pub reservation_id: Uuid,
    pub opportunity_id: Uuid,
    pub reserved_capital_usd: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A priced dislocation on a pair, ranked and ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedOpportunity {
    pub opportunity_id: Uuid,
    pub pair_id: String,
    /// The pair definition, carried so the executor needs no extra lookup.
    pub pair: ContractPair,
    /// Venue whose leg is submitted first.
    pub primary_venue: Venue,
    pub buy_venue: Venue,
    pub sell_venue: Venue,
    pub target_buy_price: Decimal,
    pub target_sell_price: Decimal,
    /// Net edge per contract after fees, in probability units.
    pub net_edge: Decimal,
    pub requested_capital_usd: Decimal,
    /// Set once at the outer entry and threaded through orders, events, logs.
    pub correlation_id: Uuid,
}

impl RankedOpportunity {
    /// Returns the venue whose leg is submitted second.
    #[must_use]
    pub fn secondary_venue(&self) -> Venue {
        self.primary_venue.other()
    }

    /// Returns the side traded on the given venue.
    #[must_use]
    pub fn side_on(&self, venue: Venue) -> Side {
        if venue == self.buy_venue {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    /// Returns the target limit price on the given venue.
    #[must_use]
    pub fn target_price_on(&self, venue: Venue) -> Decimal {
        if venue == self.buy_venue {
            self.target_buy_price
        } else {
            self.target_sell_price
        }
    }

    /// Returns the reservation request for this opportunity.
    #[must_use]
    pub fn reservation_request(&self) -> ReservationRequest {
        ReservationRequest {
            opportunity_id: self.opportunity_id,
            pair_id: self.pair_id.clone(),
            requested_capital_usd: self.requested_capital_usd,
        }
    }
}

// =============================================================================
// Positions
// =============================================================================

/// Position lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    /// Both legs filled; position is hedged.
    Open,
    /// Exactly one entry leg filled; unhedged exposure.
    SingleLegExposed,
    /// Exit's first leg filled, second did not.
    ExitPartial,
    /// Terminal.
    Closed,
    /// Flagged by reconciliation; operator action required.
    ReconciliationRequired,
}

impl PositionStatus {
    /// Returns the storage string (stable, used in the database).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::SingleLegExposed => "SINGLE_LEG_EXPOSED",
            Self::ExitPartial => "EXIT_PARTIAL",
            Self::Closed => "CLOSED",
            Self::ReconciliationRequired => "RECONCILIATION_REQUIRED",
        }
    }

    /// Parses a stored status string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(Self::Open),
            "SINGLE_LEG_EXPOSED" => Some(Self::SingleLegExposed),
            "EXIT_PARTIAL" => Some(Self::ExitPartial),
            "CLOSED" => Some(Self::Closed),
            "RECONCILIATION_REQUIRED" => Some(Self::ReconciliationRequired),
            _ => None,
        }
    }

    /// Returns true for states reconciliation must cross-check.
    #[must_use]
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Closed)
    }

    /// Returns true for states the operator can resolve via retry/close.
    #[must_use]
    pub fn is_resolvable(self) -> bool {
        matches!(self, Self::SingleLegExposed | Self::ExitPartial)
    }
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One leg of a two-venue position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionLeg {
    pub venue: Venue,
    pub contract_id: String,
    pub side: Side,
    /// Target entry price at execution time.
    pub entry_price: Decimal,
    /// Target size in contracts.
    pub size: u64,
}

impl PositionLeg {
    /// Notional capital of this leg at the entry price.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.entry_price * Decimal::from(self.size)
    }
}

/// Which order-reference slot on a position an order links into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSlot {
    SecondaryEntry,
    ExitPrimary,
    ExitSecondary,
}

/// A two-leg arbitrage position.
///
/// Invariants enforced by the mutating components:
/// `Open` requires both entry order refs; `SingleLegExposed` requires exactly
/// the primary ref; `ExitPartial` requires both entry refs and exactly one
/// exit ref; `Closed` is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub position_id: Uuid,
    pub pair_id: String,
    pub status: PositionStatus,
    /// Entry leg submitted first.
    pub primary_leg: PositionLeg,
    /// Entry leg submitted second.
    pub secondary_leg: PositionLeg,
    pub primary_order_id: Option<String>,
    pub secondary_order_id: Option<String>,
    pub exit_primary_order_id: Option<String>,
    pub exit_secondary_order_id: Option<String>,
    /// Net edge per contract captured at entry.
    pub expected_edge: Decimal,
    pub is_paper: bool,
    pub correlation_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Returns the leg traded on the given venue.
    #[must_use]
    pub fn leg_on(&self, venue: Venue) -> &PositionLeg {
        if self.primary_leg.venue == venue {
            &self.primary_leg
        } else {
            &self.secondary_leg
        }
    }

    /// Total entry capital across both legs at target prices.
    #[must_use]
    pub fn entry_capital(&self) -> Decimal {
        self.primary_leg.notional() + self.secondary_leg.notional()
    }

    /// Returns the entry order id linked for the given venue's leg, if any.
    #[must_use]
    pub fn entry_order_id_on(&self, venue: Venue) -> Option<&str> {
        if self.primary_leg.venue == venue {
            self.primary_order_id.as_deref()
        } else {
            self.secondary_order_id.as_deref()
        }
    }

    /// All order ids currently linked to this position.
    #[must_use]
    pub fn linked_order_ids(&self) -> Vec<&str> {
        [
            self.primary_order_id.as_deref(),
            self.secondary_order_id.as_deref(),
            self.exit_primary_order_id.as_deref(),
            self.exit_secondary_order_id.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

// =============================================================================
// Persisted Orders
// =============================================================================

/// Stored order status. A superset of the venue statuses: cancellations are
/// recorded locally even when the venue forgets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersistedOrderStatus {
    Filled,
    Partial,
    Pending,
    Cancelled,
    Rejected,
}

impl PersistedOrderStatus {
    /// Returns the storage string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Filled => "FILLED",
            Self::Partial => "PARTIAL",
            Self::Pending => "PENDING",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Parses a stored status string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FILLED" => Some(Self::Filled),
            "PARTIAL" => Some(Self::Partial),
            "PENDING" => Some(Self::Pending),
            "CANCELLED" => Some(Self::Cancelled),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Maps a venue order status into the stored form.
    #[must_use]
    pub fn from_order_status(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Filled => Self::Filled,
            OrderStatus::Partial => Self::Partial,
            OrderStatus::Pending => Self::Pending,
            OrderStatus::Rejected => Self::Rejected,
        }
    }
}

impl std::fmt::Display for PersistedOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An order as stored locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedOrder {
    pub order_id: String,
    pub venue: Venue,
    pub contract_id: String,
    pub pair_id: String,
    pub side: Side,
    /// Submitted limit price.
    pub price: Decimal,
    /// Submitted size in contracts.
    pub size: u64,
    pub status: PersistedOrderStatus,
    pub fill_price: Option<Decimal>,
    pub fill_size: Option<u64>,
    pub is_paper: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedOrder {
    /// Builds a stored order from a venue result plus submission context.
    #[must_use]
    pub fn from_result(
        result: &OrderResult,
        params: &OrderParams,
        pair_id: &str,
        is_paper: bool,
    ) -> Self {
        let now = Utc::now();
        let filled = result.has_fills();
        Self {
            order_id: result.order_id.clone(),
            venue: result.venue,
            contract_id: params.contract_id.clone(),
            pair_id: pair_id.to_string(),
            side: params.side,
            price: params.price,
            size: params.quantity,
            status: PersistedOrderStatus::from_order_status(result.status),
            fill_price: filled.then_some(result.filled_price),
            fill_size: filled.then_some(result.filled_quantity),
            is_paper,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fill price, falling back to the submitted limit.
    #[must_use]
    pub fn effective_fill_price(&self) -> Decimal {
        self.fill_price.unwrap_or(self.price)
    }

    /// Fill size, falling back to the submitted size.
    #[must_use]
    pub fn effective_fill_size(&self) -> u64 {
        self.fill_size.unwrap_or(self.size)
    }
}

/// A position joined with its pair definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionWithPair {
    pub position: Position,
    pub pair: ContractPair,
}

/// A position joined with its pair and entry orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionWithOrders {
    pub position: Position,
    pub pair: ContractPair,
    pub primary_order: Option<PersistedOrder>,
    pub secondary_order: Option<PersistedOrder>,
}

// =============================================================================
// Reconciliation
// =============================================================================

/// What kind of divergence reconciliation found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// Venue status differs from the local record.
    OrderStatusMismatch,
    /// Venue reports the order does not exist.
    OrderNotFound,
    /// Locally pending order that is now filled at the venue.
    PendingFilled,
    /// The venue query itself failed.
    PlatformUnavailable,
}

impl DiscrepancyKind {
    /// Returns the display string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OrderStatusMismatch => "order_status_mismatch",
            Self::OrderNotFound => "order_not_found",
            Self::PendingFilled => "pending_filled",
            Self::PlatformUnavailable => "platform_unavailable",
        }
    }
}

impl std::fmt::Display for DiscrepancyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded divergence between local state and venue truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationDiscrepancy {
    pub position_id: Uuid,
    pub pair_id: String,
    pub kind: DiscrepancyKind,
    pub order_id: Option<String>,
    pub local_state: String,
    pub venue_state: String,
    pub recommended_action: String,
    pub detected_at: DateTime<Utc>,
}
