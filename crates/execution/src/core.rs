//! Two-leg execution core.
//!
//! Executes one ranked opportunity under the global execution lock: verify
//! primary depth, submit the primary leg, verify secondary depth, submit the
//! secondary leg, and persist the resulting position. One leg filled with
//! the other failed is not an error path to unwind silently; it becomes a
//! `SINGLE_LEG_EXPOSED` position with a critical event carrying everything
//! the operator needs to resolve it.

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use arb_connectors::ConnectorRegistry;
use arb_core::bus::EventBus;
use arb_core::config::ExecutionConfig;
use arb_core::error::{ExecutionError, ExecutionErrorCode};
use arb_core::events::{
    Event, EventHeader, ExecutionFailedEvent, LegSnapshot, OrderFilledEvent,
};
use arb_core::traits::{OrderRepository, PositionRepository};
use arb_core::types::{
    BudgetReservation, OrderParams, OrderResult, OrderStatus, PersistedOrder, Position,
    PositionLeg, PositionStatus, RankedOpportunity, Venue,
};

use crate::snapshot::{build_exposure_event, fetch_market_snapshot};

/// Outcome of executing one opportunity.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Both legs filled and the position is hedged.
    pub success: bool,
    /// Exactly one leg filled; a `SINGLE_LEG_EXPOSED` position exists.
    pub partial_fill: bool,
    pub position_id: Option<Uuid>,
    pub primary_order: Option<OrderResult>,
    pub secondary_order: Option<OrderResult>,
    pub error: Option<ExecutionError>,
}

impl ExecutionReport {
    fn failure(error: ExecutionError) -> Self {
        Self {
            success: false,
            partial_fill: false,
            position_id: None,
            primary_order: None,
            secondary_order: None,
            error: Some(error),
        }
    }
}

/// Integer contracts purchasable with `capital` at `price`, floored.
#[must_use]
pub fn contracts_for(capital: Decimal, price: Decimal) -> u64 {
    if price <= Decimal::ZERO {
        return 0;
    }
    (capital / price).floor().to_u64().unwrap_or(0)
}

/// The two-leg executor.
pub struct ExecutionCore {
    connectors: Arc<ConnectorRegistry>,
    orders: Arc<dyn OrderRepository>,
    positions: Arc<dyn PositionRepository>,
    bus: Arc<EventBus>,
    config: ExecutionConfig,
}

impl ExecutionCore {
    #[must_use]
    pub fn new(
        connectors: Arc<ConnectorRegistry>,
        orders: Arc<dyn OrderRepository>,
        positions: Arc<dyn PositionRepository>,
        bus: Arc<EventBus>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            connectors,
            orders,
            positions,
            bus,
            config,
        }
    }

    fn book_timeout(&self) -> Duration {
        Duration::from_secs(self.config.book_fetch_timeout_secs)
    }

    fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.config.submit_timeout_secs)
    }

    /// Executes one opportunity against both venues.
    pub async fn execute(
        &self,
        opportunity: &RankedOpportunity,
        reservation: &BudgetReservation,
    ) -> ExecutionReport {
        let primary_venue = opportunity.primary_venue;
        let secondary_venue = opportunity.secondary_venue();
        let primary_side = opportunity.side_on(primary_venue);
        let secondary_side = opportunity.side_on(secondary_venue);
        let primary_price = opportunity.target_price_on(primary_venue);
        let secondary_price = opportunity.target_price_on(secondary_venue);
        let primary_size = contracts_for(reservation.reserved_capital_usd, primary_price);
        let secondary_size = contracts_for(reservation.reserved_capital_usd, secondary_price);

        info!(
            opportunity_id = %opportunity.opportunity_id,
            pair_id = %opportunity.pair_id,
            primary_venue = %primary_venue,
            primary_size,
            secondary_size,
            net_edge = %opportunity.net_edge,
            "executing opportunity"
        );

        if primary_size == 0 || secondary_size == 0 {
            return self.fail(
                opportunity,
                ExecutionError::new(
                    ExecutionErrorCode::InsufficientLiquidity,
                    format!(
                        "reserved ${} buys zero contracts at targets {primary_price}/{secondary_price}",
                        reservation.reserved_capital_usd
                    ),
                ),
            );
        }

        // Pre-primary depth verification.
        let primary_contract = opportunity.pair.contract_id(primary_venue);
        let Some(primary_book) = self.fetch_book(primary_venue, primary_contract).await else {
            return self.fail(
                opportunity,
                ExecutionError::new(
                    ExecutionErrorCode::InsufficientLiquidity,
                    format!("{primary_venue} book unavailable; primary depth unverified"),
                ),
            );
        };
        let primary_depth = primary_book.eligible_depth(primary_side, primary_price);
        if primary_depth < Decimal::from(primary_size) {
            return self.fail(
                opportunity,
                ExecutionError::new(
                    ExecutionErrorCode::InsufficientLiquidity,
                    format!(
                        "primary depth {primary_depth} < target {primary_size} at {primary_price} on {primary_venue}"
                    ),
                ),
            );
        }

        // Submit primary. No reservation side effects happen in here; the
        // queue settles the reservation from the report.
        let primary_params =
            OrderParams::limit(primary_contract, primary_side, primary_size, primary_price);
        let primary_result = match self.submit(primary_venue, primary_params.clone()).await {
            Ok(result) => result,
            Err(error) => return self.fail(opportunity, error),
        };

        match primary_result.status {
            OrderStatus::Filled | OrderStatus::Partial => {
                self.persist_order(&primary_result, &primary_params, opportunity).await;
            }
            OrderStatus::Pending => {
                return self.fail(
                    opportunity,
                    ExecutionError::new(
                        ExecutionErrorCode::OrderTimeout,
                        format!("primary order pending on {primary_venue}"),
                    ),
                );
            }
            OrderStatus::Rejected => {
                return self.fail(
                    opportunity,
                    ExecutionError::new(
                        ExecutionErrorCode::OrderRejected,
                        format!("primary order rejected on {primary_venue}"),
                    ),
                );
            }
        }

        // Pre-secondary depth verification; from here on a failure means
        // single-leg exposure, never a plain abort.
        let secondary_contract = opportunity.pair.contract_id(secondary_venue);
        let secondary_params = OrderParams::limit(
            secondary_contract,
            secondary_side,
            secondary_size,
            secondary_price,
        );

        let secondary_ok = match self.fetch_book(secondary_venue, secondary_contract).await {
            Some(book) => {
                let depth = book.eligible_depth(secondary_side, secondary_price);
                if depth < Decimal::from(secondary_size) {
                    warn!(
                        opportunity_id = %opportunity.opportunity_id,
                        depth = %depth,
                        target = secondary_size,
                        "secondary depth insufficient after primary fill"
                    );
                    None
                } else {
                    Some(())
                }
            }
            None => None,
        };

        if secondary_ok.is_none() {
            return self
                .single_leg_exposure(opportunity, &primary_result, &primary_params, &secondary_params)
                .await;
        }

        // Submit secondary.
        let secondary_result = match self.submit(secondary_venue, secondary_params.clone()).await {
            Ok(result) => result,
            Err(error) => {
                warn!(
                    opportunity_id = %opportunity.opportunity_id,
                    error = %error,
                    "secondary submission failed after primary fill"
                );
                return self
                    .single_leg_exposure(
                        opportunity,
                        &primary_result,
                        &primary_params,
                        &secondary_params,
                    )
                    .await;
            }
        };

        match secondary_result.status {
            OrderStatus::Filled | OrderStatus::Partial => {
                self.complete(
                    opportunity,
                    primary_result,
                    primary_params,
                    secondary_result,
                    secondary_params,
                )
                .await
            }
            OrderStatus::Pending => {
                // Long-settlement venues answer pending while the chain
                // catches up; keep the order for reconciliation to resolve.
                if secondary_venue.is_long_settlement() {
                    self.persist_order(&secondary_result, &secondary_params, opportunity)
                        .await;
                }
                self.single_leg_exposure(
                    opportunity,
                    &primary_result,
                    &primary_params,
                    &secondary_params,
                )
                .await
            }
            OrderStatus::Rejected => {
                self.single_leg_exposure(
                    opportunity,
                    &primary_result,
                    &primary_params,
                    &secondary_params,
                )
                .await
            }
        }
    }

    /// Both legs filled: persist, create the hedged position, emit fills.
    async fn complete(
        &self,
        opportunity: &RankedOpportunity,
        primary_result: OrderResult,
        primary_params: OrderParams,
        secondary_result: OrderResult,
        secondary_params: OrderParams,
    ) -> ExecutionReport {
        self.persist_order(&secondary_result, &secondary_params, opportunity).await;

        let position = self.build_position(
            opportunity,
            &primary_params,
            &secondary_params,
            PositionStatus::Open,
            Some(primary_result.order_id.clone()),
            Some(secondary_result.order_id.clone()),
        );
        let position_id = position.position_id;
        if let Err(e) = self.positions.create(&position).await {
            error!(position_id = %position_id, error = %e, "failed to persist open position");
        }

        let (is_paper, _) = self.connectors.mode_flags();
        for (result, side) in [
            (&primary_result, primary_params.side),
            (&secondary_result, secondary_params.side),
        ] {
            self.bus.publish(Event::OrderFilled(OrderFilledEvent {
                header: EventHeader::new(opportunity.correlation_id),
                pair_id: opportunity.pair_id.clone(),
                position_id: Some(position_id),
                order: result.clone(),
                side,
                is_paper,
            }));
        }

        let partial_fill = primary_result.status == OrderStatus::Partial
            || secondary_result.status == OrderStatus::Partial;
        info!(
            position_id = %position_id,
            opportunity_id = %opportunity.opportunity_id,
            primary_order_id = %primary_result.order_id,
            secondary_order_id = %secondary_result.order_id,
            partial_fill,
            "two-leg execution complete"
        );

        ExecutionReport {
            success: true,
            partial_fill,
            position_id: Some(position_id),
            primary_order: Some(primary_result),
            secondary_order: Some(secondary_result),
            error: None,
        }
    }

    /// Primary filled, secondary failed: create the exposed position and
    /// emit `order.filled` followed by the exposure event, in that order.
    async fn single_leg_exposure(
        &self,
        opportunity: &RankedOpportunity,
        primary_result: &OrderResult,
        primary_params: &OrderParams,
        secondary_params: &OrderParams,
    ) -> ExecutionReport {
        let position = self.build_position(
            opportunity,
            primary_params,
            secondary_params,
            PositionStatus::SingleLegExposed,
            Some(primary_result.order_id.clone()),
            None,
        );
        let position_id = position.position_id;
        if let Err(e) = self.positions.create(&position).await {
            error!(position_id = %position_id, error = %e, "failed to persist exposed position");
        }

        let (is_paper, mixed_mode) = self.connectors.mode_flags();
        self.bus.publish(Event::OrderFilled(OrderFilledEvent {
            header: EventHeader::new(opportunity.correlation_id),
            pair_id: opportunity.pair_id.clone(),
            position_id: Some(position_id),
            order: primary_result.clone(),
            side: primary_params.side,
            is_paper,
        }));

        let prices = fetch_market_snapshot(
            &self.connectors,
            &opportunity.pair,
            self.book_timeout(),
        )
        .await;

        let filled_leg = LegSnapshot {
            venue: primary_result.venue,
            contract_id: primary_params.contract_id.clone(),
            side: primary_params.side,
            price: primary_result.filled_price,
            size: primary_result.filled_quantity,
            order_id: Some(primary_result.order_id.clone()),
        };
        // Intended (pre-submit) values describe the failed leg regardless of
        // whether depth verification or the submission itself failed.
        let failed_leg = LegSnapshot {
            venue: opportunity.secondary_venue(),
            contract_id: secondary_params.contract_id.clone(),
            side: secondary_params.side,
            price: secondary_params.price,
            size: secondary_params.quantity,
            order_id: None,
        };

        let event = build_exposure_event(
            opportunity.correlation_id,
            position_id,
            &opportunity.pair,
            filled_leg,
            failed_leg,
            prices,
            (is_paper, mixed_mode),
            ExecutionErrorCode::SingleLegExposure,
            format!(
                "single-leg exposure: {} filled on {}, {} leg failed",
                primary_result.filled_quantity,
                primary_result.venue,
                opportunity.secondary_venue()
            ),
        );
        let error = event.error.clone();
        self.bus.publish(Event::SingleLegExposure(event));

        warn!(
            position_id = %position_id,
            opportunity_id = %opportunity.opportunity_id,
            filled_venue = %primary_result.venue,
            "single-leg exposure created"
        );

        ExecutionReport {
            success: false,
            partial_fill: true,
            position_id: Some(position_id),
            primary_order: Some(primary_result.clone()),
            secondary_order: None,
            error: Some(error),
        }
    }

    fn build_position(
        &self,
        opportunity: &RankedOpportunity,
        primary_params: &OrderParams,
        secondary_params: &OrderParams,
        status: PositionStatus,
        primary_order_id: Option<String>,
        secondary_order_id: Option<String>,
    ) -> Position {
        let now = Utc::now();
        let (is_paper, _) = self.connectors.mode_flags();
        Position {
            position_id: Uuid::new_v4(),
            pair_id: opportunity.pair_id.clone(),
            status,
            primary_leg: PositionLeg {
                venue: opportunity.primary_venue,
                contract_id: primary_params.contract_id.clone(),
                side: primary_params.side,
                entry_price: primary_params.price,
                size: primary_params.quantity,
            },
            secondary_leg: PositionLeg {
                venue: opportunity.secondary_venue(),
                contract_id: secondary_params.contract_id.clone(),
                side: secondary_params.side,
                entry_price: secondary_params.price,
                size: secondary_params.quantity,
            },
            primary_order_id,
            secondary_order_id,
            exit_primary_order_id: None,
            exit_secondary_order_id: None,
            expected_edge: opportunity.net_edge,
            is_paper,
            correlation_id: opportunity.correlation_id,
            created_at: now,
            updated_at: now,
        }
    }

    async fn fetch_book(
        &self,
        venue: Venue,
        contract_id: &str,
    ) -> Option<arb_core::types::NormalizedOrderBook> {
        match tokio::time::timeout(
            self.book_timeout(),
            self.connectors.get(venue).get_order_book(contract_id),
        )
        .await
        {
            Ok(Ok(book)) => Some(book),
            Ok(Err(e)) => {
                warn!(venue = %venue, contract_id, error = %e, "book fetch failed");
                None
            }
            Err(_) => {
                warn!(venue = %venue, contract_id, "book fetch timed out");
                None
            }
        }
    }

    /// Submits an order with the configured deadline, mapping transport
    /// failures and deadline misses to execution errors.
    async fn submit(
        &self,
        venue: Venue,
        params: OrderParams,
    ) -> Result<OrderResult, ExecutionError> {
        match tokio::time::timeout(
            self.submit_timeout(),
            self.connectors.get(venue).submit_order(params),
        )
        .await
        {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(ExecutionError::new(
                ExecutionErrorCode::OrderRejected,
                format!("{venue} rejected submission: {e}"),
            )),
            Err(_) => Err(ExecutionError::new(
                ExecutionErrorCode::OrderTimeout,
                format!(
                    "{venue} submission exceeded {}s deadline",
                    self.config.submit_timeout_secs
                ),
            )),
        }
    }

    async fn persist_order(
        &self,
        result: &OrderResult,
        params: &OrderParams,
        opportunity: &RankedOpportunity,
    ) {
        let (is_paper, _) = self.connectors.mode_flags();
        let stored = PersistedOrder::from_result(result, params, &opportunity.pair_id, is_paper);
        if let Err(e) = self.orders.create(&stored).await {
            error!(order_id = %result.order_id, error = %e, "failed to persist order");
        }
    }

    /// Emits `execution.failed` and returns the failure report. Used for
    /// every pre-exposure abort.
    fn fail(&self, opportunity: &RankedOpportunity, error: ExecutionError) -> ExecutionReport {
        warn!(
            opportunity_id = %opportunity.opportunity_id,
            code = ?error.code,
            message = %error.message,
            "execution failed"
        );
        self.bus.publish(Event::ExecutionFailed(ExecutionFailedEvent {
            header: EventHeader::new(opportunity.correlation_id),
            opportunity_id: opportunity.opportunity_id,
            pair_id: opportunity.pair_id.clone(),
            error: error.clone(),
        }));
        ExecutionReport::failure(error)
    }
}
