//! Exit monitor.
//!
//! Scans open positions on a fixed tick, prices both legs off the current
//! books, and evaluates the exit thresholds. A triggered exit runs two
//! opposing limit orders, primary leg first per the pair configuration;
//! a failed first leg keeps the position open for the next cycle, a failed
//! second leg becomes an `EXIT_PARTIAL` exposure. A circuit breaker skips
//! one tick after too many consecutive fully-failed cycles.

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use arb_connectors::ConnectorRegistry;
use arb_core::bus::EventBus;
use arb_core::config::ExitConfig;
use arb_core::error::ExecutionErrorCode;
use arb_core::events::{Event, EventHeader, ExitTriggeredEvent, ExitType, LegSnapshot};
use arb_core::traits::{OrderRepository, PositionRepository, RiskManager};
use arb_core::types::{
    OrderParams, OrderResult, OrderSlot, PersistedOrder, PositionLeg, PositionStatus,
    PositionWithOrders, Side, Venue,
};
use arb_execution::snapshot::{build_exposure_event, fetch_market_snapshot};

use crate::threshold::{evaluate, LegInput, ThresholdConfig, ThresholdVerdict};

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failed_ticks: u32,
    skip_next: bool,
}

/// Close prices for both legs of a position, keyed by venue.
#[derive(Debug, Clone, Copy)]
struct ClosePrices {
    kalshi: Decimal,
    polymarket: Decimal,
}

impl ClosePrices {
    fn on(&self, venue: Venue) -> Decimal {
        match venue {
            Venue::Kalshi => self.kalshi,
            Venue::Polymarket => self.polymarket,
        }
    }
}

/// Periodic exit scanner over open positions.
pub struct ExitMonitor {
    positions: Arc<dyn PositionRepository>,
    orders: Arc<dyn OrderRepository>,
    connectors: Arc<ConnectorRegistry>,
    risk: Arc<dyn RiskManager>,
    bus: Arc<EventBus>,
    config: ExitConfig,
    book_fetch_timeout: Duration,
    submit_timeout: Duration,
    is_paper: bool,
    breaker: Mutex<BreakerState>,
}

impl ExitMonitor {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        positions: Arc<dyn PositionRepository>,
        orders: Arc<dyn OrderRepository>,
        connectors: Arc<ConnectorRegistry>,
        risk: Arc<dyn RiskManager>,
        bus: Arc<EventBus>,
        config: ExitConfig,
        book_fetch_timeout: Duration,
        submit_timeout: Duration,
        is_paper: bool,
    ) -> Self {
        Self {
            positions,
            orders,
            connectors,
            risk,
            bus,
            config,
            book_fetch_timeout,
            submit_timeout,
            is_paper,
            breaker: Mutex::new(BreakerState::default()),
        }
    }

    fn threshold_config(&self) -> ThresholdConfig {
        ThresholdConfig {
            stop_loss_multiple: self.config.stop_loss_multiple,
            take_profit_fraction: self.config.take_profit_fraction,
            time_based_hours: self.config.time_based_hours,
        }
    }

    /// One monitor tick: evaluate every open position sequentially.
    pub async fn tick(&self) {
        {
            let mut breaker = self.breaker.lock();
            if breaker.skip_next {
                breaker.skip_next = false;
                warn!("exit monitor tick skipped by circuit breaker");
                return;
            }
        }

        let open = match self
            .positions
            .find_by_status_with_orders(&[PositionStatus::Open], self.is_paper)
            .await
        {
            Ok(open) => open,
            Err(e) => {
                error!(error = %e, "exit monitor could not load open positions");
                self.finish_tick(true, 0);
                return;
            }
        };
        if open.is_empty() {
            return;
        }

        let mut evaluated_ok = 0u32;
        for item in &open {
            let position_id = item.position.position_id;
            match self.process_position(item).await {
                Ok(true) => evaluated_ok += 1,
                Ok(false) => {}
                Err(e) => {
                    // One bad position must not poison the tick.
                    error!(position_id = %position_id, error = %e, "exit evaluation failed");
                }
            }
        }

        self.finish_tick(false, evaluated_ok);
    }

    fn finish_tick(&self, load_failed: bool, evaluated_ok: u32) {
        let mut breaker = self.breaker.lock();
        if !load_failed && evaluated_ok > 0 {
            breaker.consecutive_failed_ticks = 0;
            return;
        }
        breaker.consecutive_failed_ticks += 1;
        if breaker.consecutive_failed_ticks >= self.config.circuit_breaker_threshold {
            warn!(
                failed_ticks = breaker.consecutive_failed_ticks,
                "exit monitor circuit breaker tripped; next tick will be skipped"
            );
            breaker.skip_next = true;
            breaker.consecutive_failed_ticks = 0;
        }
    }

    /// Returns whether the position's thresholds were evaluated.
    async fn process_position(&self, item: &PositionWithOrders) -> anyhow::Result<bool> {
        let position = &item.position;

        if self.connectors.is_disconnected(Venue::Kalshi)
            || self.connectors.is_disconnected(Venue::Polymarket)
        {
            return Ok(false);
        }

        // Required fill data: both entry orders with recorded fills.
        let (Some(primary_order), Some(secondary_order)) =
            (item.primary_order.as_ref(), item.secondary_order.as_ref())
        else {
            return Ok(false);
        };
        if primary_order.fill_price.is_none() || secondary_order.fill_price.is_none() {
            return Ok(false);
        }

        // Current close prices: best bid for legs we bought, best ask for
        // legs we sold.
        let Some(close_prices) = self.fetch_close_prices(item).await else {
            return Ok(false);
        };

        let leg_input = |leg: &PositionLeg, order: &PersistedOrder| LegInput {
            side: leg.side,
            entry_price: order.effective_fill_price(),
            current_price: close_prices.on(leg.venue),
            size: order.effective_fill_size(),
            fee: item.pair.fees(leg.venue).taker,
        };
        let primary_input = leg_input(&position.primary_leg, primary_order);
        let secondary_input = leg_input(&position.secondary_leg, secondary_order);

        let verdict = evaluate(
            &self.threshold_config(),
            &primary_input,
            &secondary_input,
            position.expected_edge,
            item.pair.resolution_date,
            Utc::now(),
        );

        if let Some(exit_type) = verdict.exit_type {
            info!(
                position_id = %position.position_id,
                exit_type = %exit_type,
                current_pnl = %verdict.current_pnl,
                captured_edge_pct = %verdict.captured_edge_pct,
                "exit threshold triggered"
            );
            self.execute_exit(item, &verdict, exit_type, close_prices).await;
        }
        Ok(true)
    }

    async fn fetch_close_prices(&self, item: &PositionWithOrders) -> Option<ClosePrices> {
        let snapshot =
            fetch_market_snapshot(&self.connectors, &item.pair, self.book_fetch_timeout).await;
        let close_on = |leg: &PositionLeg| match leg.side {
            Side::Buy => snapshot.best_bid(leg.venue),
            Side::Sell => snapshot.best_ask(leg.venue),
        };
        let primary = close_on(&item.position.primary_leg)?;
        let secondary = close_on(&item.position.secondary_leg)?;
        let (kalshi, polymarket) = if item.position.primary_leg.venue == Venue::Kalshi {
            (primary, secondary)
        } else {
            (secondary, primary)
        };
        Some(ClosePrices { kalshi, polymarket })
    }

    /// Runs the two-leg exit, first leg per `pair.primary_leg`.
    async fn execute_exit(
        &self,
        item: &PositionWithOrders,
        verdict: &ThresholdVerdict,
        exit_type: ExitType,
        close_prices: ClosePrices,
    ) {
        let position = &item.position;
        let first_venue = item.pair.primary_leg;
        let first_leg = position.leg_on(first_venue).clone();
        let second_leg = position.leg_on(first_venue.other()).clone();

        let order_for = |leg: &PositionLeg, stored: &PersistedOrder| {
            OrderParams::limit(
                leg.contract_id.clone(),
                leg.side.opposite(),
                stored.effective_fill_size(),
                close_prices.on(leg.venue),
            )
        };
        let stored_for = |leg: &PositionLeg| {
            if position.primary_leg.venue == leg.venue {
                item.primary_order.as_ref()
            } else {
                item.secondary_order.as_ref()
            }
        };
        let slot_for = |leg: &PositionLeg| {
            if position.primary_leg.venue == leg.venue {
                OrderSlot::ExitPrimary
            } else {
                OrderSlot::ExitSecondary
            }
        };

        let Some(first_stored) = stored_for(&first_leg) else {
            return;
        };
        let Some(second_stored) = stored_for(&second_leg) else {
            return;
        };
        let first_params = order_for(&first_leg, first_stored);
        let second_params = order_for(&second_leg, second_stored);

        // First exit leg. Failure here is not a state change: stay OPEN and
        // retry next cycle.
        let first_result = match self.submit_exit(first_venue, &first_params).await {
            Some(result) if result.has_fills() => result,
            other => {
                warn!(
                    position_id = %position.position_id,
                    outcome = ?other.map(|r| r.status),
                    "exit first leg did not fill; keeping position open"
                );
                return;
            }
        };
        self.persist_exit(&first_result, &first_params, position).await;
        let linked = self
            .positions
            .update_with_order(
                position.position_id,
                PositionStatus::Open,
                PositionStatus::Open,
                &first_result.order_id,
                slot_for(&first_leg),
            )
            .await
            .unwrap_or(false);
        if !linked {
            warn!(position_id = %position.position_id, "could not link first exit order");
        }

        // Second exit leg. Failure here is EXIT_PARTIAL.
        let second_result = match self.submit_exit(first_venue.other(), &second_params).await {
            Some(result) if result.has_fills() => result,
            _ => {
                self.partial_exit(item, &first_leg, &first_result, &second_leg, &second_params)
                    .await;
                return;
            }
        };
        self.persist_exit(&second_result, &second_params, position).await;

        let closed = self
            .positions
            .update_with_order(
                position.position_id,
                PositionStatus::Open,
                PositionStatus::Closed,
                &second_result.order_id,
                slot_for(&second_leg),
            )
            .await
            .unwrap_or(false);
        if !closed {
            warn!(position_id = %position.position_id, "exit filled but the position moved concurrently");
        }

        // Realized P&L: per-leg entry vs exit fills minus exit fees.
        let leg_realized = |leg: &PositionLeg, stored: &PersistedOrder, exit: &OrderResult| {
            let size = Decimal::from(exit.filled_quantity);
            let entry = stored.effective_fill_price();
            let gross = match leg.side {
                Side::Buy => (exit.filled_price - entry) * size,
                Side::Sell => (entry - exit.filled_price) * size,
            };
            gross - exit.filled_price * size * item.pair.fees(leg.venue).taker
        };
        let realized_pnl = leg_realized(&first_leg, first_stored, &first_result)
            + leg_realized(&second_leg, second_stored, &second_result);

        let entry_capital = first_stored.effective_fill_price()
            * Decimal::from(first_stored.effective_fill_size())
            + second_stored.effective_fill_price()
                * Decimal::from(second_stored.effective_fill_size());
        if let Err(e) = self
            .risk
            .close_position(entry_capital + realized_pnl, realized_pnl)
            .await
        {
            error!(position_id = %position.position_id, error = %e, "close_position failed");
        }

        self.bus.publish(Event::ExitTriggered(ExitTriggeredEvent {
            header: EventHeader::new(position.correlation_id),
            position_id: position.position_id,
            pair_id: position.pair_id.clone(),
            exit_type,
            initial_edge: position.expected_edge,
            final_edge: verdict.current_edge,
            realized_pnl,
            exit_primary_order_id: if first_venue == position.primary_leg.venue {
                first_result.order_id.clone()
            } else {
                second_result.order_id.clone()
            },
            exit_secondary_order_id: if first_venue == position.primary_leg.venue {
                second_result.order_id.clone()
            } else {
                first_result.order_id.clone()
            },
        }));

        info!(
            position_id = %position.position_id,
            exit_type = %exit_type,
            realized_pnl = %realized_pnl,
            "position exited"
        );
    }

    /// Second exit leg failed after the first filled.
    async fn partial_exit(
        &self,
        item: &PositionWithOrders,
        first_leg: &PositionLeg,
        first_result: &OrderResult,
        second_leg: &PositionLeg,
        second_params: &OrderParams,
    ) {
        let position = &item.position;
        let slot = if position.primary_leg.venue == first_leg.venue {
            OrderSlot::ExitPrimary
        } else {
            OrderSlot::ExitSecondary
        };
        // The first exit order was already linked under OPEN; now flip the
        // status with the same precondition.
        let transitioned = self
            .positions
            .update_with_order(
                position.position_id,
                PositionStatus::Open,
                PositionStatus::ExitPartial,
                &first_result.order_id,
                slot,
            )
            .await
            .unwrap_or(false);
        if !transitioned {
            warn!(position_id = %position.position_id, "could not mark EXIT_PARTIAL");
        }

        let prices =
            fetch_market_snapshot(&self.connectors, &item.pair, self.book_fetch_timeout).await;
        let filled_leg = LegSnapshot {
            venue: first_leg.venue,
            contract_id: first_leg.contract_id.clone(),
            side: first_leg.side.opposite(),
            price: first_result.filled_price,
            size: first_result.filled_quantity,
            order_id: Some(first_result.order_id.clone()),
        };
        // Attempted values of the failed exit leg: its intended price/size.
        let failed_leg = LegSnapshot {
            venue: second_leg.venue,
            contract_id: second_leg.contract_id.clone(),
            side: second_params.side,
            price: second_params.price,
            size: second_params.quantity,
            order_id: None,
        };
        let event = build_exposure_event(
            position.correlation_id,
            position.position_id,
            &item.pair,
            filled_leg,
            failed_leg,
            prices,
            self.connectors.mode_flags(),
            ExecutionErrorCode::PartialExitFailure,
            format!(
                "partial exit: {} exit filled, {} exit failed",
                first_leg.venue, second_leg.venue
            ),
        );
        self.bus.publish(Event::SingleLegExposure(event));

        warn!(
            position_id = %position.position_id,
            filled_venue = %first_leg.venue,
            failed_venue = %second_leg.venue,
            "exit is partial; position marked EXIT_PARTIAL"
        );
    }

    async fn submit_exit(&self, venue: Venue, params: &OrderParams) -> Option<OrderResult> {
        match tokio::time::timeout(
            self.submit_timeout,
            self.connectors.get(venue).submit_order(params.clone()),
        )
        .await
        {
            Ok(Ok(result)) => Some(result),
            Ok(Err(e)) => {
                warn!(venue = %venue, error = %e, "exit submission failed");
                None
            }
            Err(_) => {
                warn!(venue = %venue, "exit submission timed out");
                None
            }
        }
    }

    async fn persist_exit(
        &self,
        result: &OrderResult,
        params: &OrderParams,
        position: &arb_core::types::Position,
    ) {
        let stored =
            PersistedOrder::from_result(result, params, &position.pair_id, position.is_paper);
        if let Err(e) = self.orders.create(&stored).await {
            error!(order_id = %result.order_id, error = %e, "failed to persist exit order");
        }
    }

    #[cfg(test)]
    fn breaker_snapshot(&self) -> (u32, bool) {
        let breaker = self.breaker.lock();
        (breaker.consecutive_failed_ticks, breaker.skip_next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_connectors::{FillBehavior, PaperConnector};
    use arb_core::config::RiskConfig;
    use arb_core::traits::PairRepository;
    use arb_core::types::{ContractPair, FeeSchedule, NormalizedOrderBook, Position, PriceLevel};
    use arb_data::{InMemoryOrderRepository, InMemoryPairRepository, InMemoryPositionRepository};
    use arb_execution::SimpleRiskManager;
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;
    use tokio::sync::broadcast;
    use uuid::Uuid;

    const KALSHI_CONTRACT: &str = "KXBTC-26FEB02-B100000";
    const POLYMARKET_CONTRACT: &str = "0xbtc100k-yes";

    struct Harness {
        kalshi: Arc<PaperConnector>,
        polymarket: Arc<PaperConnector>,
        orders: Arc<InMemoryOrderRepository>,
        positions: Arc<InMemoryPositionRepository>,
        risk: Arc<SimpleRiskManager>,
        monitor: ExitMonitor,
        rx: broadcast::Receiver<Event>,
    }

    fn book(
        venue: Venue,
        contract: &str,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
    ) -> NormalizedOrderBook {
        NormalizedOrderBook {
            venue,
            contract_id: contract.to_string(),
            bids: bids.iter().map(|&(p, q)| PriceLevel::new(p, q)).collect(),
            asks: asks.iter().map(|&(p, q)| PriceLevel::new(p, q)).collect(),
            timestamp: Utc::now(),
            seq: None,
        }
    }

    fn pair() -> ContractPair {
        ContractPair {
            pair_id: "btc-100k".to_string(),
            kalshi_contract_id: KALSHI_CONTRACT.to_string(),
            polymarket_contract_id: POLYMARKET_CONTRACT.to_string(),
            primary_leg: Venue::Kalshi,
            resolution_date: None,
            kalshi_fees: FeeSchedule::new(dec!(0), dec!(0.02)),
            polymarket_fees: FeeSchedule::new(dec!(0), dec!(0.02)),
        }
    }

    fn stored_order(
        order_id: &str,
        venue: Venue,
        contract: &str,
        side: Side,
        fill_price: Decimal,
        fill_size: u64,
    ) -> PersistedOrder {
        let now = Utc::now();
        PersistedOrder {
            order_id: order_id.to_string(),
            venue,
            contract_id: contract.to_string(),
            pair_id: "btc-100k".to_string(),
            side,
            price: fill_price,
            size: fill_size,
            status: arb_core::types::PersistedOrderStatus::Filled,
            fill_price: Some(fill_price),
            fill_size: Some(fill_size),
            is_paper: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// S5 entry: Kalshi buy 0.62x100, Polymarket sell 0.65x100, edge 0.03.
    fn open_position(created_at: DateTime<Utc>) -> Position {
        Position {
            position_id: Uuid::new_v4(),
            pair_id: "btc-100k".to_string(),
            status: PositionStatus::Open,
            primary_leg: PositionLeg {
                venue: Venue::Kalshi,
                contract_id: KALSHI_CONTRACT.to_string(),
                side: Side::Buy,
                entry_price: dec!(0.62),
                size: 100,
            },
            secondary_leg: PositionLeg {
                venue: Venue::Polymarket,
                contract_id: POLYMARKET_CONTRACT.to_string(),
                side: Side::Sell,
                entry_price: dec!(0.65),
                size: 100,
            },
            primary_order_id: Some("k-entry".to_string()),
            secondary_order_id: Some("p-entry".to_string()),
            exit_primary_order_id: None,
            exit_secondary_order_id: None,
            expected_edge: dec!(0.03),
            is_paper: true,
            correlation_id: Uuid::new_v4(),
            created_at,
            updated_at: created_at,
        }
    }

    async fn harness() -> Harness {
        let bus = Arc::new(EventBus::new());
        let rx = bus.subscribe();

        let kalshi = Arc::new(PaperConnector::new(Venue::Kalshi));
        let polymarket = Arc::new(PaperConnector::new(Venue::Polymarket));
        // S5 current prices: Kalshi bid 0.66, Polymarket ask 0.62.
        kalshi.seed_book(book(
            Venue::Kalshi,
            KALSHI_CONTRACT,
            &[(dec!(0.66), dec!(500))],
            &[(dec!(0.67), dec!(500))],
        ));
        polymarket.seed_book(book(
            Venue::Polymarket,
            POLYMARKET_CONTRACT,
            &[(dec!(0.61), dec!(500))],
            &[(dec!(0.62), dec!(500))],
        ));
        let registry = Arc::new(ConnectorRegistry::new(kalshi.clone(), polymarket.clone()));

        let pairs = Arc::new(InMemoryPairRepository::new());
        pairs.upsert(&pair()).await.unwrap();
        let orders = Arc::new(InMemoryOrderRepository::new());
        let positions = Arc::new(InMemoryPositionRepository::new(pairs, orders.clone()));

        let risk = Arc::new(SimpleRiskManager::new(RiskConfig {
            total_capital_usd: dec!(1000),
            max_reservation_usd: dec!(250),
        }));

        let monitor = ExitMonitor::new(
            positions.clone(),
            orders.clone(),
            registry,
            risk.clone(),
            bus,
            ExitConfig {
                tick_secs: 30,
                stop_loss_multiple: dec!(2),
                take_profit_fraction: dec!(0.80),
                time_based_hours: 48,
                circuit_breaker_threshold: 3,
            },
            Duration::from_secs(2),
            Duration::from_secs(5),
            true,
        );

        Harness {
            kalshi,
            polymarket,
            orders,
            positions,
            risk,
            monitor,
            rx,
        }
    }

    async fn seed_open_position(h: &Harness) -> Uuid {
        let position = open_position(Utc::now());
        let id = position.position_id;
        h.orders
            .create(&stored_order(
                "k-entry",
                Venue::Kalshi,
                KALSHI_CONTRACT,
                Side::Buy,
                dec!(0.62),
                100,
            ))
            .await
            .unwrap();
        h.orders
            .create(&stored_order(
                "p-entry",
                Venue::Polymarket,
                POLYMARKET_CONTRACT,
                Side::Sell,
                dec!(0.65),
                100,
            ))
            .await
            .unwrap();
        h.positions.create(&position).await.unwrap();
        id
    }

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    // ==================== S5: Take-Profit Exit ====================

    #[tokio::test]
    async fn test_take_profit_exit_closes_position() {
        let mut h = harness().await;
        let id = seed_open_position(&h).await;

        h.monitor.tick().await;

        let position = h.positions.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(position.status, PositionStatus::Closed);
        assert!(position.exit_primary_order_id.is_some());
        assert!(position.exit_secondary_order_id.is_some());

        let events = drain(&mut h.rx);
        let triggered: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::ExitTriggered(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(triggered.len(), 1);
        let exit = triggered[0];
        assert_eq!(exit.exit_type, arb_core::events::ExitType::TakeProfit);
        assert_eq!(exit.initial_edge, dec!(0.03));
        // S5: per-leg 4.0 + 3.0 minus fees 2.56.
        assert_eq!(exit.realized_pnl, dec!(4.44));
        assert_eq!(exit.final_edge, dec!(0.0444));

        // Entry capital 62 + 65 returned with the P&L.
        assert_eq!(h.risk.realized_pnl(), dec!(4.44));
        assert_eq!(h.risk.available_capital(), dec!(1000) + dec!(131.44));

        // Both exit orders persisted (plus the two seeded entries).
        assert_eq!(h.orders.len(), 4);
    }

    #[tokio::test]
    async fn test_no_exit_when_thresholds_not_met() {
        let mut h = harness().await;
        let id = seed_open_position(&h).await;

        // Mild prices: Kalshi bid 0.625, Polymarket ask 0.645.
        h.kalshi.seed_book(book(
            Venue::Kalshi,
            KALSHI_CONTRACT,
            &[(dec!(0.625), dec!(500))],
            &[(dec!(0.67), dec!(500))],
        ));
        h.polymarket.seed_book(book(
            Venue::Polymarket,
            POLYMARKET_CONTRACT,
            &[(dec!(0.61), dec!(500))],
            &[(dec!(0.645), dec!(500))],
        ));

        h.monitor.tick().await;

        let position = h.positions.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(position.status, PositionStatus::Open);
        assert!(drain(&mut h.rx).is_empty());
    }

    // ==================== S6: Partial Exit ====================

    #[tokio::test]
    async fn test_partial_exit_marks_exit_partial() {
        let mut h = harness().await;
        let id = seed_open_position(&h).await;

        // First exit leg (Kalshi, pair primary) fills; second throws.
        h.polymarket
            .push_behavior(FillBehavior::Transport("socket reset".to_string()));

        h.monitor.tick().await;

        let position = h.positions.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(position.status, PositionStatus::ExitPartial);
        assert!(position.exit_primary_order_id.is_some());
        assert!(position.exit_secondary_order_id.is_none());

        let events = drain(&mut h.rx);
        let names: Vec<_> = events.iter().map(Event::name).collect();
        assert!(names.contains(&"execution.single_leg.exposure"));
        assert!(!names.contains(&"execution.exit.triggered"));

        let exposure = events
            .iter()
            .find_map(|e| match e {
                Event::SingleLegExposure(x) => Some(x),
                _ => None,
            })
            .unwrap();
        // Attempted values of the failed exit leg: buy back 100 at the
        // 0.62 ask.
        assert_eq!(exposure.failed_leg.venue, Venue::Polymarket);
        assert_eq!(exposure.failed_leg.price, dec!(0.62));
        assert_eq!(exposure.failed_leg.size, 100);
        assert_eq!(
            exposure.error.code,
            ExecutionErrorCode::PartialExitFailure
        );
    }

    #[tokio::test]
    async fn test_first_leg_failure_keeps_position_open() {
        let mut h = harness().await;
        let id = seed_open_position(&h).await;

        h.kalshi
            .push_behavior(FillBehavior::Reject("halted".to_string()));

        h.monitor.tick().await;

        let position = h.positions.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(position.status, PositionStatus::Open);
        assert!(position.exit_primary_order_id.is_none());
        assert!(drain(&mut h.rx).is_empty());
    }

    // ==================== Skips and Circuit Breaker ====================

    #[tokio::test]
    async fn test_disconnected_venue_skips_position() {
        let h = harness().await;
        let id = seed_open_position(&h).await;
        h.polymarket.set_connected(false);

        h.monitor.tick().await;

        let position = h.positions.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(position.status, PositionStatus::Open);
    }

    #[tokio::test]
    async fn test_missing_fill_data_skips_position() {
        let h = harness().await;
        let mut position = open_position(Utc::now());
        position.primary_order_id = None;
        let id = position.position_id;
        h.positions.create(&position).await.unwrap();

        h.monitor.tick().await;

        let stored = h.positions.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.status, PositionStatus::Open);
    }

    #[tokio::test]
    async fn test_circuit_breaker_skips_fourth_tick() {
        let h = harness().await;
        let _ = seed_open_position(&h).await;
        // Every position skips while a venue is down: fully-failed ticks.
        h.polymarket.set_connected(false);

        for _ in 0..3 {
            h.monitor.tick().await;
        }
        let (failed, skip_next) = h.monitor.breaker_snapshot();
        assert_eq!(failed, 0);
        assert!(skip_next, "three failed ticks must arm the skip");

        h.monitor.tick().await;
        let (_, skip_next) = h.monitor.breaker_snapshot();
        assert!(!skip_next, "the armed skip is consumed by the next tick");
    }

    #[tokio::test]
    async fn test_idle_ticks_do_not_trip_breaker() {
        let h = harness().await;
        for _ in 0..5 {
            h.monitor.tick().await;
        }
        let (failed, skip_next) = h.monitor.breaker_snapshot();
        assert_eq!(failed, 0);
        assert!(!skip_next);
    }
}
