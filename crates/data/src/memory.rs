//! In-memory repository implementations.
//!
//! Used for paper trading without a database and as the persistence doubles
//! in tests. Semantics mirror the Postgres repositories, including the
//! status-precondition behavior of position mutations.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use arb_core::traits::{
    HealthLogRepository, OrderRepository, PairRepository, PositionRepository,
};
use arb_core::types::{
    ContractPair, HealthStatus, OrderSlot, PersistedOrder, PersistedOrderStatus, Position,
    PositionStatus, PositionWithOrders, PositionWithPair, Venue,
};

// =============================================================================
// Orders
// =============================================================================

/// Lock-guarded order store.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<String, PersistedOrder>>,
}

impl InMemoryOrderRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    /// True when no orders are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: &PersistedOrder) -> Result<()> {
        self.orders
            .write()
            .insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn find_by_id(&self, order_id: &str) -> Result<Option<PersistedOrder>> {
        Ok(self.orders.read().get(order_id).cloned())
    }

    async fn find_by_pair_id(&self, pair_id: &str) -> Result<Vec<PersistedOrder>> {
        let mut orders: Vec<PersistedOrder> = self
            .orders
            .read()
            .values()
            .filter(|o| o.pair_id == pair_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: PersistedOrderStatus,
        fill_price: Option<Decimal>,
        fill_size: Option<u64>,
    ) -> Result<()> {
        if let Some(order) = self.orders.write().get_mut(order_id) {
            order.status = status;
            if fill_price.is_some() {
                order.fill_price = fill_price;
            }
            if fill_size.is_some() {
                order.fill_size = fill_size;
            }
            order.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn find_pending_orders(&self, is_paper: bool) -> Result<Vec<PersistedOrder>> {
        let mut orders: Vec<PersistedOrder> = self
            .orders
            .read()
            .values()
            .filter(|o| o.status == PersistedOrderStatus::Pending && o.is_paper == is_paper)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}

// =============================================================================
// Pairs
// =============================================================================

/// Lock-guarded pair store.
#[derive(Default)]
pub struct InMemoryPairRepository {
    pairs: RwLock<HashMap<String, ContractPair>>,
}

impl InMemoryPairRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PairRepository for InMemoryPairRepository {
    async fn upsert(&self, pair: &ContractPair) -> Result<()> {
        self.pairs
            .write()
            .insert(pair.pair_id.clone(), pair.clone());
        Ok(())
    }

    async fn find_by_id(&self, pair_id: &str) -> Result<Option<ContractPair>> {
        Ok(self.pairs.read().get(pair_id).cloned())
    }
}

// =============================================================================
// Positions
// =============================================================================

/// Lock-guarded position store joined against the in-memory pair and order
/// stores.
pub struct InMemoryPositionRepository {
    positions: RwLock<HashMap<Uuid, Position>>,
    pairs: Arc<InMemoryPairRepository>,
    orders: Arc<InMemoryOrderRepository>,
}

impl InMemoryPositionRepository {
    #[must_use]
    pub fn new(pairs: Arc<InMemoryPairRepository>, orders: Arc<InMemoryOrderRepository>) -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
            pairs,
            orders,
        }
    }

    fn sorted_matching(&self, statuses: &[PositionStatus], is_paper: bool) -> Vec<Position> {
        let mut positions: Vec<Position> = self
            .positions
            .read()
            .values()
            .filter(|p| statuses.contains(&p.status) && p.is_paper == is_paper)
            .cloned()
            .collect();
        positions.sort_by_key(|p| p.created_at);
        positions
    }
}

#[async_trait]
impl PositionRepository for InMemoryPositionRepository {
    async fn create(&self, position: &Position) -> Result<()> {
        self.positions
            .write()
            .insert(position.position_id, position.clone());
        Ok(())
    }

    async fn find_by_id(&self, position_id: Uuid) -> Result<Option<Position>> {
        Ok(self.positions.read().get(&position_id).cloned())
    }

    async fn find_by_id_with_pair(&self, position_id: Uuid) -> Result<Option<PositionWithPair>> {
        let Some(position) = self.find_by_id(position_id).await? else {
            return Ok(None);
        };
        let pair = self
            .pairs
            .find_by_id(&position.pair_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("missing pair {:?}", position.pair_id))?;
        Ok(Some(PositionWithPair { position, pair }))
    }

    async fn find_by_status(
        &self,
        statuses: &[PositionStatus],
        is_paper: bool,
    ) -> Result<Vec<Position>> {
        Ok(self.sorted_matching(statuses, is_paper))
    }

    async fn find_by_status_with_pair(
        &self,
        statuses: &[PositionStatus],
        is_paper: bool,
    ) -> Result<Vec<PositionWithPair>> {
        let mut joined = Vec::new();
        for position in self.sorted_matching(statuses, is_paper) {
            let pair = self
                .pairs
                .find_by_id(&position.pair_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("missing pair {:?}", position.pair_id))?;
            joined.push(PositionWithPair { position, pair });
        }
        Ok(joined)
    }

    async fn find_by_status_with_orders(
        &self,
        statuses: &[PositionStatus],
        is_paper: bool,
    ) -> Result<Vec<PositionWithOrders>> {
        let mut joined = Vec::new();
        for PositionWithPair { position, pair } in
            self.find_by_status_with_pair(statuses, is_paper).await?
        {
            let primary_order = match &position.primary_order_id {
                Some(id) => self.orders.find_by_id(id).await?,
                None => None,
            };
            let secondary_order = match &position.secondary_order_id {
                Some(id) => self.orders.find_by_id(id).await?,
                None => None,
            };
            joined.push(PositionWithOrders {
                position,
                pair,
                primary_order,
                secondary_order,
            });
        }
        Ok(joined)
    }

    async fn find_active_positions(&self, is_paper: bool) -> Result<Vec<Position>> {
        Ok(self.sorted_matching(
            &[
                PositionStatus::Open,
                PositionStatus::SingleLegExposed,
                PositionStatus::ExitPartial,
                PositionStatus::ReconciliationRequired,
            ],
            is_paper,
        ))
    }

    async fn update_status(
        &self,
        position_id: Uuid,
        expected: PositionStatus,
        next: PositionStatus,
    ) -> Result<bool> {
        let mut positions = self.positions.write();
        match positions.get_mut(&position_id) {
            Some(position) if position.status == expected => {
                position.status = next;
                position.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_with_order(
        &self,
        position_id: Uuid,
        expected: PositionStatus,
        next: PositionStatus,
        order_id: &str,
        slot: OrderSlot,
    ) -> Result<bool> {
        let mut positions = self.positions.write();
        match positions.get_mut(&position_id) {
            Some(position) if position.status == expected => {
                position.status = next;
                let slot_ref = match slot {
                    OrderSlot::SecondaryEntry => &mut position.secondary_order_id,
                    OrderSlot::ExitPrimary => &mut position.exit_primary_order_id,
                    OrderSlot::ExitSecondary => &mut position.exit_secondary_order_id,
                };
                *slot_ref = Some(order_id.to_string());
                position.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_order_ids(&self, order_ids: &[String]) -> Result<Vec<Position>> {
        let wanted: Vec<&str> = order_ids.iter().map(String::as_str).collect();
        let mut positions: Vec<Position> = self
            .positions
            .read()
            .values()
            .filter(|p| p.linked_order_ids().iter().any(|id| wanted.contains(id)))
            .cloned()
            .collect();
        positions.sort_by_key(|p| p.created_at);
        Ok(positions)
    }
}

// =============================================================================
// Health Log
// =============================================================================

/// In-memory health log; keeps rows for inspection.
#[derive(Default)]
pub struct InMemoryHealthLogRepository {
    rows: RwLock<Vec<(Venue, HealthStatus, Option<String>, DateTime<Utc>)>>,
}

impl InMemoryHealthLogRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of logged rows.
    #[must_use]
    pub fn rows(&self) -> Vec<(Venue, HealthStatus, Option<String>, DateTime<Utc>)> {
        self.rows.read().clone()
    }
}

#[async_trait]
impl HealthLogRepository for InMemoryHealthLogRepository {
    async fn insert(
        &self,
        venue: Venue,
        status: HealthStatus,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.rows
            .write()
            .push((venue, status, reason.map(str::to_string), at));
        Ok(())
    }
}
