//! Postgres position repository.
//!
//! Status transitions are guarded at the database level: the expected status
//! is part of the `WHERE` clause, so a concurrent mutation loses the race
//! instead of clobbering state.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use arb_core::traits::PositionRepository;
use arb_core::types::{
    ContractPair, OrderSlot, PersistedOrder, Position, PositionStatus, PositionWithOrders,
    PositionWithPair,
};

use crate::models::{OrderRow, PairRow, PositionRow};

const POSITION_COLUMNS: &str = "position_id, pair_id, status, \
    primary_venue, primary_contract_id, primary_side, primary_entry_price, primary_size, \
    secondary_venue, secondary_contract_id, secondary_side, secondary_entry_price, secondary_size, \
    primary_order_id, secondary_order_id, exit_primary_order_id, exit_secondary_order_id, \
    expected_edge, is_paper, correlation_id, created_at, updated_at";

/// Repository for position rows.
#[derive(Debug, Clone)]
pub struct PgPositionRepository {
    pool: PgPool,
}

impl PgPositionRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_pairs(&self, pair_ids: &[String]) -> Result<HashMap<String, ContractPair>> {
        let rows = sqlx::query_as::<_, PairRow>(
            "SELECT pair_id, kalshi_contract_id, polymarket_contract_id, primary_leg, \
             resolution_date, kalshi_maker_fee, kalshi_taker_fee, kalshi_gas_usd, \
             polymarket_maker_fee, polymarket_taker_fee, polymarket_gas_usd \
             FROM pairs WHERE pair_id = ANY($1)",
        )
        .bind(pair_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut pairs = HashMap::new();
        for row in rows {
            let pair = row.into_domain()?;
            pairs.insert(pair.pair_id.clone(), pair);
        }
        Ok(pairs)
    }

    async fn load_orders(&self, order_ids: &[String]) -> Result<HashMap<String, PersistedOrder>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT order_id, venue, contract_id, pair_id, side, price, size, status, \
             fill_price, fill_size, is_paper, created_at, updated_at \
             FROM orders WHERE order_id = ANY($1)",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = HashMap::new();
        for row in rows {
            let order = row.into_domain()?;
            orders.insert(order.order_id.clone(), order);
        }
        Ok(orders)
    }

    async fn fetch_by_status(
        &self,
        statuses: &[PositionStatus],
        is_paper: bool,
    ) -> Result<Vec<Position>> {
        let status_strings: Vec<String> =
            statuses.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, PositionRow>(&format!(
            "SELECT {POSITION_COLUMNS} FROM positions \
             WHERE status = ANY($1) AND is_paper = $2 ORDER BY created_at ASC"
        ))
        .bind(&status_strings)
        .bind(is_paper)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PositionRow::into_domain).collect()
    }

    fn join_pairs(
        positions: Vec<Position>,
        pairs: &HashMap<String, ContractPair>,
    ) -> Result<Vec<PositionWithPair>> {
        positions
            .into_iter()
            .map(|position| {
                let pair = pairs
                    .get(&position.pair_id)
                    .cloned()
                    .ok_or_else(|| anyhow!("missing pair {:?}", position.pair_id))?;
                Ok(PositionWithPair { position, pair })
            })
            .collect()
    }
}

#[async_trait]
impl PositionRepository for PgPositionRepository {
    async fn create(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO positions
                (position_id, pair_id, status,
                 primary_venue, primary_contract_id, primary_side, primary_entry_price, primary_size,
                 secondary_venue, secondary_contract_id, secondary_side, secondary_entry_price, secondary_size,
                 primary_order_id, secondary_order_id, exit_primary_order_id, exit_secondary_order_id,
                 expected_edge, is_paper, correlation_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(position.position_id)
        .bind(&position.pair_id)
        .bind(position.status.as_str())
        .bind(position.primary_leg.venue.as_str())
        .bind(&position.primary_leg.contract_id)
        .bind(position.primary_leg.side.as_str())
        .bind(position.primary_leg.entry_price)
        .bind(position.primary_leg.size as i64)
        .bind(position.secondary_leg.venue.as_str())
        .bind(&position.secondary_leg.contract_id)
        .bind(position.secondary_leg.side.as_str())
        .bind(position.secondary_leg.entry_price)
        .bind(position.secondary_leg.size as i64)
        .bind(&position.primary_order_id)
        .bind(&position.secondary_order_id)
        .bind(&position.exit_primary_order_id)
        .bind(&position.exit_secondary_order_id)
        .bind(position.expected_edge)
        .bind(position.is_paper)
        .bind(position.correlation_id)
        .bind(position.created_at)
        .bind(position.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, position_id: Uuid) -> Result<Option<Position>> {
        let row = sqlx::query_as::<_, PositionRow>(&format!(
            "SELECT {POSITION_COLUMNS} FROM positions WHERE position_id = $1"
        ))
        .bind(position_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PositionRow::into_domain).transpose()
    }

    async fn find_by_id_with_pair(&self, position_id: Uuid) -> Result<Option<PositionWithPair>> {
        let Some(position) = self.find_by_id(position_id).await? else {
            return Ok(None);
        };
        let pairs = self.load_pairs(&[position.pair_id.clone()]).await?;
        Ok(Some(Self::join_pairs(vec![position], &pairs)?.remove(0)))
    }

    async fn find_by_status(
        &self,
        statuses: &[PositionStatus],
        is_paper: bool,
    ) -> Result<Vec<Position>> {
        self.fetch_by_status(statuses, is_paper).await
    }

    async fn find_by_status_with_pair(
        &self,
        statuses: &[PositionStatus],
        is_paper: bool,
    ) -> Result<Vec<PositionWithPair>> {
        let positions = self.fetch_by_status(statuses, is_paper).await?;
        let pair_ids: Vec<String> = positions.iter().map(|p| p.pair_id.clone()).collect();
        let pairs = self.load_pairs(&pair_ids).await?;
        Self::join_pairs(positions, &pairs)
    }

    async fn find_by_status_with_orders(
        &self,
        statuses: &[PositionStatus],
        is_paper: bool,
    ) -> Result<Vec<PositionWithOrders>> {
        let with_pairs = self.find_by_status_with_pair(statuses, is_paper).await?;

        let order_ids: Vec<String> = with_pairs
            .iter()
            .flat_map(|p| p.position.linked_order_ids())
            .map(str::to_string)
            .collect();
        let orders = self.load_orders(&order_ids).await?;

        Ok(with_pairs
            .into_iter()
            .map(|PositionWithPair { position, pair }| {
                let primary_order = position
                    .primary_order_id
                    .as_ref()
                    .and_then(|id| orders.get(id).cloned());
                let secondary_order = position
                    .secondary_order_id
                    .as_ref()
                    .and_then(|id| orders.get(id).cloned());
                PositionWithOrders {
                    position,
                    pair,
                    primary_order,
                    secondary_order,
                }
            })
            .collect())
    }

    async fn find_active_positions(&self, is_paper: bool) -> Result<Vec<Position>> {
        self.fetch_by_status(
            &[
                PositionStatus::Open,
                PositionStatus::SingleLegExposed,
                PositionStatus::ExitPartial,
                PositionStatus::ReconciliationRequired,
            ],
            is_paper,
        )
        .await
    }

    async fn update_status(
        &self,
        position_id: Uuid,
        expected: PositionStatus,
        next: PositionStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE positions SET status = $3, updated_at = $4 \
             WHERE position_id = $1 AND status = $2",
        )
        .bind(position_id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_with_order(
        &self,
        position_id: Uuid,
        expected: PositionStatus,
        next: PositionStatus,
        order_id: &str,
        slot: OrderSlot,
    ) -> Result<bool> {
        let sql = match slot {
            OrderSlot::SecondaryEntry => {
                "UPDATE positions SET status = $3, secondary_order_id = $4, updated_at = $5 \
                 WHERE position_id = $1 AND status = $2"
            }
            OrderSlot::ExitPrimary => {
                "UPDATE positions SET status = $3, exit_primary_order_id = $4, updated_at = $5 \
                 WHERE position_id = $1 AND status = $2"
            }
            OrderSlot::ExitSecondary => {
                "UPDATE positions SET status = $3, exit_secondary_order_id = $4, updated_at = $5 \
                 WHERE position_id = $1 AND status = $2"
            }
        };

        let result = sqlx::query(sql)
            .bind(position_id)
            .bind(expected.as_str())
            .bind(next.as_str())
            .bind(order_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_order_ids(&self, order_ids: &[String]) -> Result<Vec<Position>> {
        let rows = sqlx::query_as::<_, PositionRow>(&format!(
            "SELECT {POSITION_COLUMNS} FROM positions \
             WHERE primary_order_id = ANY($1) OR secondary_order_id = ANY($1) \
                OR exit_primary_order_id = ANY($1) OR exit_secondary_order_id = ANY($1)"
        ))
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PositionRow::into_domain).collect()
    }
}
