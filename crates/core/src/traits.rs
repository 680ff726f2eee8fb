//! Seams between the engine and its collaborators.
//!
//! The engine never talks to a venue, a risk ledger, or a database directly;
//! it talks to these traits. Live and paper implementations are treated
//! uniformly.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ExecutionError;
use crate::types::{
    BudgetReservation, CancelResult, ConnectorMode, FeeSchedule, HealthStatus,
    NormalizedOrderBook, OrderParams, OrderResult, OrderSlot, PersistedOrder,
    PersistedOrderStatus, Position, PositionStatus, PositionWithOrders, PositionWithPair,
    ReservationRequest, Venue, VenueHealth, VenuePosition,
};

// =============================================================================
// Platform Connector
// =============================================================================

/// Errors surfaced by a venue connector.
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    /// The call did not complete within its deadline.
    #[error("connector call timed out after {0}ms")]
    Timeout(u64),

    /// The venue rejected the request.
    #[error("venue rejected request: {0}")]
    Rejected(String),

    /// The connector is not connected.
    #[error("connector not connected")]
    NotConnected,

    /// The referenced entity does not exist at the venue.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Callback invoked on every live book update.
pub type BookCallback = Arc<dyn Fn(NormalizedOrderBook) + Send + Sync>;

/// A venue connection: order entry, book access, health, fees.
///
/// Implementations must honor per-call deadlines supplied by callers via
/// `tokio::time::timeout`; no method may block indefinitely.
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    /// The venue this connector serves.
    fn venue(&self) -> Venue;

    /// Live or paper capital.
    fn mode(&self) -> ConnectorMode;

    /// Current connection state, non-blocking.
    fn is_connected(&self) -> bool;

    async fn connect(&self) -> Result<(), ConnectorError>;

    async fn disconnect(&self) -> Result<(), ConnectorError>;

    async fn submit_order(&self, params: OrderParams) -> Result<OrderResult, ConnectorError>;

    async fn cancel_order(&self, order_id: &str) -> Result<CancelResult, ConnectorError>;

    async fn get_order_book(&self, contract_id: &str)
        -> Result<NormalizedOrderBook, ConnectorError>;

    /// Venue-truth status of a previously submitted order.
    /// `Ok(None)` means the venue does not know the order.
    async fn get_order_status(&self, order_id: &str)
        -> Result<Option<OrderResult>, ConnectorError>;

    async fn get_positions(&self) -> Result<Vec<VenuePosition>, ConnectorError>;

    async fn get_health(&self) -> VenueHealth;

    async fn get_fee_schedule(&self) -> Result<FeeSchedule, ConnectorError>;

    /// Registers a callback for live book updates.
    fn on_book_update(&self, callback: BookCallback);
}

// =============================================================================
// Risk Manager
// =============================================================================

/// Capital reservation lifecycle owner.
///
/// Each reservation is terminated by exactly one of commit/release;
/// subsequent calls are no-ops or errors, never double-settlement.
#[async_trait]
pub trait RiskManager: Send + Sync {
    /// Reserves capital for an opportunity, or fails with `LIMIT_EXCEEDED`.
    async fn reserve_budget(
        &self,
        request: &ReservationRequest,
    ) -> Result<BudgetReservation, ExecutionError>;

    /// Marks the reservation as deployed into a position.
    async fn commit_reservation(&self, reservation_id: Uuid) -> Result<(), ExecutionError>;

    /// Returns the reserved capital to the pool.
    async fn release_reservation(&self, reservation_id: Uuid) -> Result<(), ExecutionError>;

    /// Records a closed position: capital returned to the pool plus the
    /// realized profit or loss.
    async fn close_position(
        &self,
        capital_returned: Decimal,
        realized_pnl: Decimal,
    ) -> Result<(), ExecutionError>;
}

// =============================================================================
// Repositories
// =============================================================================

/// Narrow CRUD over stored orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: &PersistedOrder) -> Result<()>;

    async fn find_by_id(&self, order_id: &str) -> Result<Option<PersistedOrder>>;

    async fn find_by_pair_id(&self, pair_id: &str) -> Result<Vec<PersistedOrder>>;

    /// Updates status and, when known, fill data.
    async fn update_status(
        &self,
        order_id: &str,
        status: PersistedOrderStatus,
        fill_price: Option<Decimal>,
        fill_size: Option<u64>,
    ) -> Result<()>;

    async fn find_pending_orders(&self, is_paper: bool) -> Result<Vec<PersistedOrder>>;
}

/// Narrow CRUD over positions.
///
/// Status mutations take the expected current status and apply it as a
/// database-level precondition in the same statement; they return whether
/// the row actually transitioned.
#[async_trait]
pub trait PositionRepository: Send + Sync {
    async fn create(&self, position: &Position) -> Result<()>;

    async fn find_by_id(&self, position_id: Uuid) -> Result<Option<Position>>;

    async fn find_by_id_with_pair(&self, position_id: Uuid) -> Result<Option<PositionWithPair>>;

    async fn find_by_status(
        &self,
        statuses: &[PositionStatus],
        is_paper: bool,
    ) -> Result<Vec<Position>>;

    async fn find_by_status_with_pair(
        &self,
        statuses: &[PositionStatus],
        is_paper: bool,
    ) -> Result<Vec<PositionWithPair>>;

    async fn find_by_status_with_orders(
        &self,
        statuses: &[PositionStatus],
        is_paper: bool,
    ) -> Result<Vec<PositionWithOrders>>;

    /// Positions in any non-terminal state.
    async fn find_active_positions(&self, is_paper: bool) -> Result<Vec<Position>>;

    /// Transitions `expected → next`; returns false when the precondition
    /// did not hold.
    async fn update_status(
        &self,
        position_id: Uuid,
        expected: PositionStatus,
        next: PositionStatus,
    ) -> Result<bool>;

    /// Transitions status and links an order id into the given slot, as one
    /// persistence call with the same status precondition.
    async fn update_with_order(
        &self,
        position_id: Uuid,
        expected: PositionStatus,
        next: PositionStatus,
        order_id: &str,
        slot: OrderSlot,
    ) -> Result<bool>;

    async fn find_by_order_ids(&self, order_ids: &[String]) -> Result<Vec<Position>>;
}

/// Pair definitions, read-mostly.
#[async_trait]
pub trait PairRepository: Send + Sync {
    async fn upsert(&self, pair: &crate::types::ContractPair) -> Result<()>;

    async fn find_by_id(&self, pair_id: &str) -> Result<Option<crate::types::ContractPair>>;
}

/// Append-only venue health log; a row is inserted only on status change.
#[async_trait]
pub trait HealthLogRepository: Send + Sync {
    async fn insert(
        &self,
        venue: Venue,
        status: HealthStatus,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()>;
}
