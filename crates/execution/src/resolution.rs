//! Operator resolution of exposed positions.
//!
//! `retry_leg` re-submits the missing leg at an operator-chosen price;
//! `close_leg` flattens the filled leg into the current book. Prices and
//! P&L are recomputed at the moment of decision, never from stale event
//! payloads. Both paths validate the position state first and fail with
//! `INVALID_POSITION_STATE` otherwise.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use arb_connectors::ConnectorRegistry;
use arb_core::bus::EventBus;
use arb_core::config::ExecutionConfig;
use arb_core::error::{ExecutionError, ExecutionErrorCode, Severity};
use arb_core::events::{
    Event, EventHeader, LegSnapshot, MarketSnapshot, OrderFilledEvent, PnlScenarios,
    ResolutionType, SingleLegResolvedEvent,
};
use arb_core::traits::{OrderRepository, PositionRepository, RiskManager};
use arb_core::types::{
    ContractPair, OrderParams, OrderResult, OrderSlot, PersistedOrder, Position, PositionLeg,
    PositionStatus, PositionWithPair, Side,
};

use crate::pnl::{self, FilledLegView, SecondaryLegView};
use crate::snapshot::fetch_market_snapshot;

/// Outcome of a retry attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RetryLegOutcome {
    /// The missing leg filled and the position transitioned.
    Retried {
        order: OrderResult,
        new_edge: Option<Decimal>,
        realized_pnl: Option<Decimal>,
    },
    /// The retry did not fill; the position is untouched and fresh P&L
    /// scenarios are returned instead.
    NotFilled {
        pnl_scenarios: PnlScenarios,
        recommended_actions: Vec<String>,
    },
}

/// Outcome of a successful close.
#[derive(Debug, Clone, Serialize)]
pub struct CloseLegOutcome {
    pub order: OrderResult,
    pub realized_pnl: Decimal,
}

/// Current exposure context for an exposed position.
#[derive(Debug, Clone, Serialize)]
pub struct ExposureReport {
    pub position_id: Uuid,
    pub pair_id: String,
    pub status: PositionStatus,
    pub filled_leg: LegSnapshot,
    pub failed_leg: LegSnapshot,
    pub current_prices: MarketSnapshot,
    pub pnl_scenarios: PnlScenarios,
    pub recommended_actions: Vec<String>,
}

/// Derives the exposed (filled) and missing (failed) leg snapshots for a
/// resolvable position. Fill prices come from the persisted entry orders
/// when available; intended values otherwise.
pub(crate) fn exposure_legs(
    position: &Position,
    primary_order: Option<&PersistedOrder>,
    secondary_order: Option<&PersistedOrder>,
) -> Result<(LegSnapshot, LegSnapshot), ExecutionError> {
    match position.status {
        PositionStatus::SingleLegExposed => {
            let leg = &position.primary_leg;
            let filled = LegSnapshot {
                venue: leg.venue,
                contract_id: leg.contract_id.clone(),
                side: leg.side,
                price: primary_order
                    .map_or(leg.entry_price, PersistedOrder::effective_fill_price),
                size: primary_order.map_or(leg.size, PersistedOrder::effective_fill_size),
                order_id: position.primary_order_id.clone(),
            };
            let missing = &position.secondary_leg;
            let failed = LegSnapshot {
                venue: missing.venue,
                contract_id: missing.contract_id.clone(),
                side: missing.side,
                price: missing.entry_price,
                size: missing.size,
                order_id: None,
            };
            Ok((filled, failed))
        }
        PositionStatus::ExitPartial => {
            let (leg, entry_order, entry_order_id) =
                if position.exit_primary_order_id.is_none() {
                    (
                        &position.primary_leg,
                        primary_order,
                        position.primary_order_id.clone(),
                    )
                } else {
                    (
                        &position.secondary_leg,
                        secondary_order,
                        position.secondary_order_id.clone(),
                    )
                };
            let filled = LegSnapshot {
                venue: leg.venue,
                contract_id: leg.contract_id.clone(),
                side: leg.side,
                price: entry_order.map_or(leg.entry_price, PersistedOrder::effective_fill_price),
                size: entry_order.map_or(leg.size, PersistedOrder::effective_fill_size),
                order_id: entry_order_id,
            };
            // The missing exit: same venue and contract, opposite side.
            let failed = LegSnapshot {
                venue: leg.venue,
                contract_id: leg.contract_id.clone(),
                side: leg.side.opposite(),
                price: leg.entry_price,
                size: filled.size,
                order_id: None,
            };
            Ok((filled, failed))
        }
        other => Err(ExecutionError::new(
            ExecutionErrorCode::InvalidPositionState,
            format!("position is {other}, not resolvable"),
        )),
    }
}

/// Operator retry/close paths over exposed positions.
pub struct SingleLegResolution {
    connectors: Arc<ConnectorRegistry>,
    orders: Arc<dyn OrderRepository>,
    positions: Arc<dyn PositionRepository>,
    risk: Arc<dyn RiskManager>,
    bus: Arc<EventBus>,
    config: ExecutionConfig,
}

impl SingleLegResolution {
    #[must_use]
    pub fn new(
        connectors: Arc<ConnectorRegistry>,
        orders: Arc<dyn OrderRepository>,
        positions: Arc<dyn PositionRepository>,
        risk: Arc<dyn RiskManager>,
        bus: Arc<EventBus>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            connectors,
            orders,
            positions,
            risk,
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

    async fn load_resolvable(
        &self,
        position_id: Uuid,
    ) -> Result<PositionWithPair, ExecutionError> {
        let loaded = self
            .positions
            .find_by_id_with_pair(position_id)
            .await
            .map_err(|e| {
                ExecutionError::new(
                    ExecutionErrorCode::GenericExecutionFailure,
                    format!("failed to load position: {e}"),
                )
            })?
            .ok_or_else(|| {
                ExecutionError::new(
                    ExecutionErrorCode::InvalidPositionState,
                    format!("position {position_id} not found"),
                )
            })?;

        if !loaded.position.status.is_resolvable() {
            return Err(ExecutionError::new(
                ExecutionErrorCode::InvalidPositionState,
                format!(
                    "position {position_id} is {}, expected SINGLE_LEG_EXPOSED or EXIT_PARTIAL",
                    loaded.position.status
                ),
            ));
        }
        Ok(loaded)
    }

    async fn entry_order(&self, order_id: Option<&str>) -> Option<PersistedOrder> {
        match order_id {
            Some(id) => self.orders.find_by_id(id).await.ok().flatten(),
            None => None,
        }
    }

    /// Re-submits the missing leg at `retry_price`.
    pub async fn retry_leg(
        &self,
        position_id: Uuid,
        retry_price: Decimal,
    ) -> Result<RetryLegOutcome, ExecutionError> {
        let PositionWithPair { position, pair } = self.load_resolvable(position_id).await?;
        match position.status {
            PositionStatus::SingleLegExposed => {
                self.retry_entry_leg(position, pair, retry_price).await
            }
            PositionStatus::ExitPartial => self.retry_exit_leg(position, pair, retry_price).await,
            _ => unreachable!("load_resolvable admits only resolvable states"),
        }
    }

    /// Missing entry leg: a fill restores the hedge and reopens the position.
    async fn retry_entry_leg(
        &self,
        position: Position,
        pair: ContractPair,
        retry_price: Decimal,
    ) -> Result<RetryLegOutcome, ExecutionError> {
        let leg = position.secondary_leg.clone();
        let params = OrderParams::limit(leg.contract_id.clone(), leg.side, leg.size, retry_price);
        let result = self.submit_retry(&position, &params).await?;

        if !result.has_fills() {
            info!(
                position_id = %position.position_id,
                status = ?result.status,
                "retry did not fill; position untouched"
            );
            return self.fresh_scenarios(&position, &pair).await;
        }

        self.persist(&result, &params, &position).await;
        let transitioned = self
            .positions
            .update_with_order(
                position.position_id,
                PositionStatus::SingleLegExposed,
                PositionStatus::Open,
                &result.order_id,
                OrderSlot::SecondaryEntry,
            )
            .await
            .unwrap_or(false);
        if !transitioned {
            warn!(
                position_id = %position.position_id,
                "retry filled but the position moved concurrently; order persisted without link"
            );
        }

        let primary_entry = self
            .entry_order(position.primary_order_id.as_deref())
            .await;
        let entry_fill = primary_entry
            .as_ref()
            .map_or(position.primary_leg.entry_price, |o| o.effective_fill_price());
        let new_edge = (entry_fill - result.filled_price).abs();

        self.emit_fill(&position, &result, params.side);
        self.bus.publish(Event::SingleLegResolved(SingleLegResolvedEvent {
            header: EventHeader::new(position.correlation_id),
            position_id: position.position_id,
            pair_id: position.pair_id.clone(),
            resolution: ResolutionType::Retried,
            original_edge: position.expected_edge,
            new_edge: Some(new_edge),
            retry_price: Some(retry_price),
            realized_pnl: None,
        }));

        info!(
            position_id = %position.position_id,
            order_id = %result.order_id,
            new_edge = %new_edge,
            "exposed leg retried; position reopened"
        );
        Ok(RetryLegOutcome::Retried {
            order: result,
            new_edge: Some(new_edge),
            realized_pnl: None,
        })
    }

    /// Missing exit leg: a fill completes the exit and closes the position.
    async fn retry_exit_leg(
        &self,
        position: Position,
        pair: ContractPair,
        retry_price: Decimal,
    ) -> Result<RetryLegOutcome, ExecutionError> {
        let exit_primary_missing = position.exit_primary_order_id.is_none();
        if !exit_primary_missing && position.exit_secondary_order_id.is_some() {
            return Err(ExecutionError::new(
                ExecutionErrorCode::InvalidPositionState,
                "EXIT_PARTIAL position has both exit refs populated",
            ));
        }
        let (leg, entry_order_id, slot, other_exit_id) = if exit_primary_missing {
            (
                position.primary_leg.clone(),
                position.primary_order_id.clone(),
                OrderSlot::ExitPrimary,
                position.exit_secondary_order_id.clone(),
            )
        } else {
            (
                position.secondary_leg.clone(),
                position.secondary_order_id.clone(),
                OrderSlot::ExitSecondary,
                position.exit_primary_order_id.clone(),
            )
        };

        let entry_order = self.entry_order(entry_order_id.as_deref()).await;
        let size = entry_order
            .as_ref()
            .map_or(leg.size, PersistedOrder::effective_fill_size);
        let params =
            OrderParams::limit(leg.contract_id.clone(), leg.side.opposite(), size, retry_price);
        let result = self.submit_retry(&position, &params).await?;

        if !result.has_fills() {
            return self.fresh_scenarios(&position, &pair).await;
        }

        self.persist(&result, &params, &position).await;
        let transitioned = self
            .positions
            .update_with_order(
                position.position_id,
                PositionStatus::ExitPartial,
                PositionStatus::Closed,
                &result.order_id,
                slot,
            )
            .await
            .unwrap_or(false);
        if !transitioned {
            warn!(
                position_id = %position.position_id,
                "exit retry filled but the position moved concurrently"
            );
        }

        let realized_pnl = self
            .exit_partial_realized_pnl(&position, &pair, &leg, &result, other_exit_id.as_deref())
            .await;
        if let Err(e) = self
            .risk
            .close_position(position.entry_capital() + realized_pnl, realized_pnl)
            .await
        {
            error!(position_id = %position.position_id, error = %e, "close_position failed");
        }

        self.emit_fill(&position, &result, params.side);
        self.bus.publish(Event::SingleLegResolved(SingleLegResolvedEvent {
            header: EventHeader::new(position.correlation_id),
            position_id: position.position_id,
            pair_id: position.pair_id.clone(),
            resolution: ResolutionType::Retried,
            original_edge: position.expected_edge,
            new_edge: None,
            retry_price: Some(retry_price),
            realized_pnl: Some(realized_pnl),
        }));

        info!(
            position_id = %position.position_id,
            realized_pnl = %realized_pnl,
            "partial exit completed via retry; position closed"
        );
        Ok(RetryLegOutcome::Retried {
            order: result,
            new_edge: None,
            realized_pnl: Some(realized_pnl),
        })
    }

    /// Flattens the filled leg into the current book.
    pub async fn close_leg(
        &self,
        position_id: Uuid,
        rationale: Option<&str>,
    ) -> Result<CloseLegOutcome, ExecutionError> {
        let PositionWithPair { position, pair } = self.load_resolvable(position_id).await?;

        let (leg, entry_order_id, slot) = match position.status {
            PositionStatus::SingleLegExposed => (
                position.primary_leg.clone(),
                position.primary_order_id.clone(),
                OrderSlot::ExitPrimary,
            ),
            PositionStatus::ExitPartial => {
                if position.exit_primary_order_id.is_none() {
                    (
                        position.primary_leg.clone(),
                        position.primary_order_id.clone(),
                        OrderSlot::ExitPrimary,
                    )
                } else {
                    (
                        position.secondary_leg.clone(),
                        position.secondary_order_id.clone(),
                        OrderSlot::ExitSecondary,
                    )
                }
            }
            _ => unreachable!("load_resolvable admits only resolvable states"),
        };

        let entry_order = self.entry_order(entry_order_id.as_deref()).await;
        let entry_fill = entry_order
            .as_ref()
            .map_or(leg.entry_price, PersistedOrder::effective_fill_price);
        let size = entry_order
            .as_ref()
            .map_or(leg.size, PersistedOrder::effective_fill_size);

        // Price the close off the opposing best of the filled venue's book.
        let book = match tokio::time::timeout(
            self.book_timeout(),
            self.connectors.get(leg.venue).get_order_book(&leg.contract_id),
        )
        .await
        {
            Ok(Ok(book)) => book,
            _ => {
                return Err(ExecutionError::new(
                    ExecutionErrorCode::CloseFailed,
                    format!("{} book unavailable; cannot price the close", leg.venue),
                )
                .with_severity(Severity::Warning));
            }
        };
        let close_price = match leg.side {
            Side::Buy => book.best_bid(),
            Side::Sell => book.best_ask(),
        }
        .ok_or_else(|| {
            ExecutionError::new(
                ExecutionErrorCode::CloseFailed,
                format!("no opposing depth on {} to close into", leg.venue),
            )
            .with_severity(Severity::Warning)
        })?;

        let params =
            OrderParams::limit(leg.contract_id.clone(), leg.side.opposite(), size, close_price);
        let result = match tokio::time::timeout(
            self.submit_timeout(),
            self.connectors.get(leg.venue).submit_order(params.clone()),
        )
        .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                return Err(ExecutionError::new(
                    ExecutionErrorCode::CloseFailed,
                    format!("close submission failed: {e}"),
                ));
            }
            Err(_) => {
                return Err(ExecutionError::new(
                    ExecutionErrorCode::CloseFailed,
                    "close submission timed out",
                ));
            }
        };

        if !result.has_fills() {
            return Err(ExecutionError::new(
                ExecutionErrorCode::CloseFailed,
                format!("close order did not fill (status {:?})", result.status),
            ));
        }

        let closed_size = Decimal::from(result.filled_quantity);
        let gross = match leg.side {
            Side::Buy => (result.filled_price - entry_fill) * closed_size,
            Side::Sell => (entry_fill - result.filled_price) * closed_size,
        };
        let taker_fee = pair.fees(leg.venue).taker;
        let realized_pnl = gross - result.filled_price * closed_size * taker_fee;

        self.persist(&result, &params, &position).await;
        let expected = position.status;
        let transitioned = self
            .positions
            .update_with_order(
                position.position_id,
                expected,
                PositionStatus::Closed,
                &result.order_id,
                slot,
            )
            .await
            .unwrap_or(false);
        if !transitioned {
            warn!(
                position_id = %position.position_id,
                "close filled but the position moved concurrently"
            );
        }

        let entry_capital = entry_fill * closed_size;
        if let Err(e) = self
            .risk
            .close_position(entry_capital + realized_pnl, realized_pnl)
            .await
        {
            error!(position_id = %position.position_id, error = %e, "close_position failed");
        }

        self.emit_fill(&position, &result, params.side);
        self.bus.publish(Event::SingleLegResolved(SingleLegResolvedEvent {
            header: EventHeader::new(position.correlation_id),
            position_id: position.position_id,
            pair_id: position.pair_id.clone(),
            resolution: ResolutionType::Closed,
            original_edge: position.expected_edge,
            new_edge: None,
            retry_price: None,
            realized_pnl: Some(realized_pnl),
        }));

        info!(
            position_id = %position.position_id,
            realized_pnl = %realized_pnl,
            rationale = rationale.unwrap_or("-"),
            "exposed leg closed"
        );
        Ok(CloseLegOutcome {
            order: result,
            realized_pnl,
        })
    }

    /// Current exposure context for an exposed position (the monitor
    /// endpoint, and the payload behind not-filled retries).
    pub async fn exposure_report(
        &self,
        position_id: Uuid,
    ) -> Result<ExposureReport, ExecutionError> {
        let PositionWithPair { position, pair } = self.load_resolvable(position_id).await?;
        self.build_exposure_report(&position, &pair).await
    }

    async fn build_exposure_report(
        &self,
        position: &Position,
        pair: &ContractPair,
    ) -> Result<ExposureReport, ExecutionError> {
        let primary_order = self.entry_order(position.primary_order_id.as_deref()).await;
        let secondary_order = self
            .entry_order(position.secondary_order_id.as_deref())
            .await;
        let (filled, failed) =
            exposure_legs(position, primary_order.as_ref(), secondary_order.as_ref())?;

        let prices =
            fetch_market_snapshot(&self.connectors, pair, self.book_timeout()).await;
        let filled_view = FilledLegView {
            venue: filled.venue,
            side: filled.side,
            fill_price: filled.price,
            size: filled.size,
            taker_fee: pair.fees(filled.venue).taker,
        };
        let secondary_view = SecondaryLegView {
            venue: failed.venue,
            side: failed.side,
            taker_fee: pair.fees(failed.venue).taker,
        };
        let report = pnl::build_report(position.position_id, &filled_view, &secondary_view, &prices);

        Ok(ExposureReport {
            position_id: position.position_id,
            pair_id: position.pair_id.clone(),
            status: position.status,
            filled_leg: filled,
            failed_leg: failed,
            current_prices: prices,
            pnl_scenarios: report.scenarios,
            recommended_actions: report.recommended_actions,
        })
    }

    async fn fresh_scenarios(
        &self,
        position: &Position,
        pair: &ContractPair,
    ) -> Result<RetryLegOutcome, ExecutionError> {
        let report = self.build_exposure_report(position, pair).await?;
        Ok(RetryLegOutcome::NotFilled {
            pnl_scenarios: report.pnl_scenarios,
            recommended_actions: report.recommended_actions,
        })
    }

    /// P&L of a completed two-leg exit: per-leg entry-vs-exit minus exit
    /// fees on both venues.
    async fn exit_partial_realized_pnl(
        &self,
        position: &Position,
        pair: &ContractPair,
        retried_leg: &PositionLeg,
        retried_exit: &OrderResult,
        other_exit_id: Option<&str>,
    ) -> Decimal {
        let other_leg = if retried_leg.venue == position.primary_leg.venue {
            &position.secondary_leg
        } else {
            &position.primary_leg
        };
        let other_exit = self.entry_order(other_exit_id).await;
        let other_exit_price = other_exit
            .as_ref()
            .map_or(other_leg.entry_price, PersistedOrder::effective_fill_price);
        let other_exit_size = other_exit
            .as_ref()
            .map_or(other_leg.size, PersistedOrder::effective_fill_size);

        let leg_pnl = |side: Side, entry: Decimal, exit: Decimal, size: u64| {
            let size = Decimal::from(size);
            match side {
                Side::Buy => (exit - entry) * size,
                Side::Sell => (entry - exit) * size,
            }
        };

        let retried_entry = self
            .entry_order(position.entry_order_id_on(retried_leg.venue))
            .await
            .map_or(retried_leg.entry_price, |o| o.effective_fill_price());
        let other_entry = self
            .entry_order(position.entry_order_id_on(other_leg.venue))
            .await
            .map_or(other_leg.entry_price, |o| o.effective_fill_price());

        let gross = leg_pnl(
            retried_leg.side,
            retried_entry,
            retried_exit.filled_price,
            retried_exit.filled_quantity,
        ) + leg_pnl(other_leg.side, other_entry, other_exit_price, other_exit_size);

        let fees = retried_exit.filled_price
            * Decimal::from(retried_exit.filled_quantity)
            * pair.fees(retried_leg.venue).taker
            + other_exit_price * Decimal::from(other_exit_size) * pair.fees(other_leg.venue).taker;

        gross - fees
    }

    async fn submit_retry(
        &self,
        position: &Position,
        params: &OrderParams,
    ) -> Result<OrderResult, ExecutionError> {
        let venue = if params.contract_id == position.primary_leg.contract_id {
            position.primary_leg.venue
        } else {
            position.secondary_leg.venue
        };
        match tokio::time::timeout(
            self.submit_timeout(),
            self.connectors.get(venue).submit_order(params.clone()),
        )
        .await
        {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(ExecutionError::new(
                ExecutionErrorCode::RetryFailed,
                format!("retry submission failed: {e}"),
            )),
            Err(_) => Err(ExecutionError::new(
                ExecutionErrorCode::RetryFailed,
                "retry submission timed out",
            )),
        }
    }

    async fn persist(&self, result: &OrderResult, params: &OrderParams, position: &Position) {
        let stored =
            PersistedOrder::from_result(result, params, &position.pair_id, position.is_paper);
        if let Err(e) = self.orders.create(&stored).await {
            error!(order_id = %result.order_id, error = %e, "failed to persist order");
        }
    }

    fn emit_fill(&self, position: &Position, result: &OrderResult, side: Side) {
        let (is_paper, _) = self.connectors.mode_flags();
        self.bus.publish(Event::OrderFilled(OrderFilledEvent {
            header: EventHeader::new(position.correlation_id),
            pair_id: position.pair_id.clone(),
            position_id: Some(position.position_id),
            order: result.clone(),
            side,
            is_paper,
        }));
    }
}
