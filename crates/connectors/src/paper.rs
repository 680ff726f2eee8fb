//! Paper venue connector.
//!
//! A deterministic in-process venue: books are seeded by the caller, orders
//! fill against the seeded depth at their limit price, and fill behavior can
//! be scripted per submission. The engine treats this connector exactly like
//! a live one, which is what makes it useful both for paper trading and for
//! exercising the execution paths in tests.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use arb_core::traits::{BookCallback, ConnectorError, PlatformConnector};
use arb_core::types::{
    CancelResult, ConnectorMode, FeeSchedule, HealthStatus, NormalizedOrderBook, OrderParams,
    OrderResult, OrderStatus, Side, Venue, VenueHealth, VenuePosition,
};

/// Scripted behavior for the next order submission.
#[derive(Debug, Clone)]
pub enum FillBehavior {
    /// Fill against seeded depth at the limit price (the default).
    FillAtLimit,
    /// Fill exactly this many contracts at the limit price.
    Partial(u64),
    /// Reject with the given venue message.
    Reject(String),
    /// Accept but leave unresolved.
    Pending,
    /// Fail the submission at the transport level.
    Transport(String),
}

/// In-process simulated venue.
pub struct PaperConnector {
    venue: Venue,
    connected: AtomicBool,
    books: RwLock<HashMap<String, NormalizedOrderBook>>,
    fees: RwLock<FeeSchedule>,
    script: Mutex<VecDeque<FillBehavior>>,
    orders: RwLock<HashMap<String, OrderResult>>,
    positions: RwLock<HashMap<String, VenuePosition>>,
    callbacks: RwLock<Vec<BookCallback>>,
    order_seq: AtomicU64,
    /// Artificial latency applied to book fetches and submissions.
    call_delay: Mutex<Option<Duration>>,
}

impl PaperConnector {
    #[must_use]
    pub fn new(venue: Venue) -> Self {
        Self {
            venue,
            connected: AtomicBool::new(true),
            books: RwLock::new(HashMap::new()),
            fees: RwLock::new(FeeSchedule::free()),
            script: Mutex::new(VecDeque::new()),
            orders: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
            callbacks: RwLock::new(Vec::new()),
            order_seq: AtomicU64::new(1),
            call_delay: Mutex::new(None),
        }
    }

    /// Seeds (or replaces) the book for a contract and notifies live
    /// subscribers.
    pub fn seed_book(&self, book: NormalizedOrderBook) {
        let callbacks = self.callbacks.read().clone();
        for callback in &callbacks {
            callback(book.clone());
        }
        self.books.write().insert(book.contract_id.clone(), book);
    }

    /// Removes the book for a contract.
    pub fn clear_book(&self, contract_id: &str) {
        self.books.write().remove(contract_id);
    }

    /// Queues a scripted behavior for the next submission; unscripted
    /// submissions fill at their limit against seeded depth.
    pub fn push_behavior(&self, behavior: FillBehavior) {
        self.script.lock().push_back(behavior);
    }

    pub fn set_fee_schedule(&self, fees: FeeSchedule) {
        *self.fees.write() = fees;
    }

    /// Flips the simulated connection state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Applies artificial latency to book fetches and submissions, for
    /// exercising caller-side deadlines.
    pub fn set_call_delay(&self, delay: Option<Duration>) {
        *self.call_delay.lock() = delay;
    }

    /// Overwrites the venue-truth record of an order (reconciliation tests
    /// use this to diverge venue state from local state).
    pub fn set_order_result(&self, result: OrderResult) {
        self.orders.write().insert(result.order_id.clone(), result);
    }

    /// Drops the venue-truth record of an order entirely.
    pub fn forget_order(&self, order_id: &str) {
        self.orders.write().remove(order_id);
    }

    async fn apply_delay(&self) {
        let delay = *self.call_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn next_order_id(&self) -> String {
        let seq = self.order_seq.fetch_add(1, Ordering::SeqCst);
        format!("{}-paper-{seq}", self.venue.as_str())
    }

    fn record_fill(&self, params: &OrderParams, result: &OrderResult) {
        if !result.has_fills() {
            return;
        }
        let mut positions = self.positions.write();
        let entry = positions
            .entry(params.contract_id.clone())
            .or_insert_with(|| VenuePosition {
                venue: self.venue,
                contract_id: params.contract_id.clone(),
                side: params.side,
                quantity: 0,
                avg_price: Decimal::ZERO,
            });
        let old_notional = entry.avg_price * Decimal::from(entry.quantity);
        let fill_notional = result.filled_price * Decimal::from(result.filled_quantity);
        entry.quantity += result.filled_quantity;
        if entry.quantity > 0 {
            entry.avg_price = (old_notional + fill_notional) / Decimal::from(entry.quantity);
        }
    }

    fn fill_against_book(&self, params: &OrderParams) -> OrderResult {
        let books = self.books.read();
        let depth = books
            .get(&params.contract_id)
            .map(|book| book.eligible_depth(params.side, params.price))
            .unwrap_or(Decimal::ZERO);
        let depth_contracts = depth.floor().to_u64().unwrap_or(0);

        let (status, filled) = if depth_contracts == 0 {
            (OrderStatus::Rejected, 0)
        } else if depth_contracts < params.quantity {
            (OrderStatus::Partial, depth_contracts)
        } else {
            (OrderStatus::Filled, params.quantity)
        };

        OrderResult {
            order_id: self.next_order_id(),
            venue: self.venue,
            status,
            filled_quantity: filled,
            filled_price: if filled > 0 { params.price } else { Decimal::ZERO },
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl PlatformConnector for PaperConnector {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn mode(&self) -> ConnectorMode {
        ConnectorMode::Paper
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<(), ConnectorError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn submit_order(&self, params: OrderParams) -> Result<OrderResult, ConnectorError> {
        if !self.is_connected() {
            return Err(ConnectorError::NotConnected);
        }
        self.apply_delay().await;

        let scripted = self.script.lock().pop_front();
        let result = match scripted.unwrap_or(FillBehavior::FillAtLimit) {
            FillBehavior::FillAtLimit => self.fill_against_book(&params),
            FillBehavior::Partial(quantity) => OrderResult {
                order_id: self.next_order_id(),
                venue: self.venue,
                status: OrderStatus::Partial,
                filled_quantity: quantity.min(params.quantity),
                filled_price: params.price,
                timestamp: Utc::now(),
            },
            FillBehavior::Reject(message) => {
                return Err(ConnectorError::Rejected(message));
            }
            FillBehavior::Pending => OrderResult {
                order_id: self.next_order_id(),
                venue: self.venue,
                status: OrderStatus::Pending,
                filled_quantity: 0,
                filled_price: Decimal::ZERO,
                timestamp: Utc::now(),
            },
            FillBehavior::Transport(message) => {
                return Err(ConnectorError::Transport(message));
            }
        };

        debug!(
            venue = %self.venue,
            contract_id = %params.contract_id,
            side = %params.side,
            status = ?result.status,
            filled = result.filled_quantity,
            "paper order"
        );

        self.record_fill(&params, &result);
        self.orders.write().insert(result.order_id.clone(), result.clone());
        Ok(result)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelResult, ConnectorError> {
        let mut orders = self.orders.write();
        let cancelled = match orders.get_mut(order_id) {
            Some(order) if order.status == OrderStatus::Pending => {
                order.status = OrderStatus::Rejected;
                true
            }
            Some(_) => false,
            None => return Err(ConnectorError::NotFound(order_id.to_string())),
        };
        Ok(CancelResult {
            order_id: order_id.to_string(),
            cancelled,
        })
    }

    async fn get_order_book(
        &self,
        contract_id: &str,
    ) -> Result<NormalizedOrderBook, ConnectorError> {
        if !self.is_connected() {
            return Err(ConnectorError::NotConnected);
        }
        self.apply_delay().await;
        self.books
            .read()
            .get(contract_id)
            .cloned()
            .ok_or_else(|| ConnectorError::NotFound(contract_id.to_string()))
    }

    async fn get_order_status(
        &self,
        order_id: &str,
    ) -> Result<Option<OrderResult>, ConnectorError> {
        if !self.is_connected() {
            return Err(ConnectorError::NotConnected);
        }
        Ok(self.orders.read().get(order_id).cloned())
    }

    async fn get_positions(&self) -> Result<Vec<VenuePosition>, ConnectorError> {
        Ok(self.positions.read().values().cloned().collect())
    }

    async fn get_health(&self) -> VenueHealth {
        VenueHealth {
            venue: self.venue,
            status: if self.is_connected() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Disconnected
            },
            last_heartbeat: Some(Utc::now()),
            latency_ms_p95: None,
            mode: ConnectorMode::Paper,
        }
    }

    async fn get_fee_schedule(&self) -> Result<FeeSchedule, ConnectorError> {
        Ok(*self.fees.read())
    }

    fn on_book_update(&self, callback: BookCallback) {
        self.callbacks.write().push(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_core::types::PriceLevel;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn seeded_connector() -> PaperConnector {
        let connector = PaperConnector::new(Venue::Kalshi);
        connector.seed_book(NormalizedOrderBook {
            venue: Venue::Kalshi,
            contract_id: "KXBTC-TEST".to_string(),
            bids: vec![PriceLevel::new(dec!(0.44), dec!(500))],
            asks: vec![PriceLevel::new(dec!(0.45), dec!(500))],
            timestamp: Utc::now(),
            seq: None,
        });
        connector
    }

    #[tokio::test]
    async fn test_fill_at_limit_against_seeded_depth() {
        let connector = seeded_connector();
        let result = connector
            .submit_order(OrderParams::limit("KXBTC-TEST", Side::Buy, 200, dec!(0.45)))
            .await
            .unwrap();

        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.filled_quantity, 200);
        assert_eq!(result.filled_price, dec!(0.45));
    }

    #[tokio::test]
    async fn test_partial_fill_when_depth_short() {
        let connector = seeded_connector();
        let result = connector
            .submit_order(OrderParams::limit("KXBTC-TEST", Side::Buy, 800, dec!(0.45)))
            .await
            .unwrap();

        assert_eq!(result.status, OrderStatus::Partial);
        assert_eq!(result.filled_quantity, 500);
    }

    #[tokio::test]
    async fn test_reject_when_no_eligible_depth() {
        let connector = seeded_connector();
        // Limit below the only ask.
        let result = connector
            .submit_order(OrderParams::limit("KXBTC-TEST", Side::Buy, 100, dec!(0.40)))
            .await
            .unwrap();
        assert_eq!(result.status, OrderStatus::Rejected);
    }

    #[tokio::test]
    async fn test_scripted_behaviors_take_precedence() {
        let connector = seeded_connector();
        connector.push_behavior(FillBehavior::Pending);
        connector.push_behavior(FillBehavior::Reject("venue says no".to_string()));

        let pending = connector
            .submit_order(OrderParams::limit("KXBTC-TEST", Side::Buy, 100, dec!(0.45)))
            .await
            .unwrap();
        assert_eq!(pending.status, OrderStatus::Pending);

        let rejected = connector
            .submit_order(OrderParams::limit("KXBTC-TEST", Side::Buy, 100, dec!(0.45)))
            .await;
        assert!(matches!(rejected, Err(ConnectorError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_disconnected_connector_refuses_orders() {
        let connector = seeded_connector();
        connector.set_connected(false);

        let result = connector
            .submit_order(OrderParams::limit("KXBTC-TEST", Side::Buy, 100, dec!(0.45)))
            .await;
        assert!(matches!(result, Err(ConnectorError::NotConnected)));

        let health = connector.get_health().await;
        assert_eq!(health.status, HealthStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_order_status_reflects_venue_truth() {
        let connector = seeded_connector();
        let result = connector
            .submit_order(OrderParams::limit("KXBTC-TEST", Side::Buy, 100, dec!(0.45)))
            .await
            .unwrap();

        let status = connector.get_order_status(&result.order_id).await.unwrap();
        assert_eq!(status.unwrap().status, OrderStatus::Filled);

        connector.forget_order(&result.order_id);
        let status = connector.get_order_status(&result.order_id).await.unwrap();
        assert!(status.is_none());
    }

    #[tokio::test]
    async fn test_cancel_pending_order() {
        let connector = seeded_connector();
        connector.push_behavior(FillBehavior::Pending);
        let pending = connector
            .submit_order(OrderParams::limit("KXBTC-TEST", Side::Buy, 100, dec!(0.45)))
            .await
            .unwrap();

        let cancel = connector.cancel_order(&pending.order_id).await.unwrap();
        assert!(cancel.cancelled);

        let again = connector.cancel_order(&pending.order_id).await.unwrap();
        assert!(!again.cancelled);
    }

    #[tokio::test]
    async fn test_book_callbacks_fire_on_seed() {
        let connector = PaperConnector::new(Venue::Polymarket);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        connector.on_book_update(Arc::new(move |book| {
            sink.lock().push(book.contract_id);
        }));

        connector.seed_book(NormalizedOrderBook {
            venue: Venue::Polymarket,
            contract_id: "0xabc".to_string(),
            bids: vec![],
            asks: vec![],
            timestamp: Utc::now(),
            seq: None,
        });

        assert_eq!(seen.lock().as_slice(), ["0xabc"]);
    }

    #[tokio::test]
    async fn test_fills_accumulate_into_positions() {
        let connector = seeded_connector();
        for _ in 0..2 {
            connector
                .submit_order(OrderParams::limit("KXBTC-TEST", Side::Buy, 100, dec!(0.45)))
                .await
                .unwrap();
        }

        let positions = connector.get_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, 200);
        assert_eq!(positions[0].avg_price, dec!(0.45));
    }
}
