//! Postgres order repository.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;

use arb_core::traits::OrderRepository;
use arb_core::types::{PersistedOrder, PersistedOrderStatus};

use crate::models::OrderRow;

const ORDER_COLUMNS: &str = "order_id, venue, contract_id, pair_id, side, price, size, status, \
                             fill_price, fill_size, is_paper, created_at, updated_at";

/// Repository for order rows.
#[derive(Debug, Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create(&self, order: &PersistedOrder) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders
                (order_id, venue, contract_id, pair_id, side, price, size, status,
                 fill_price, fill_size, is_paper, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&order.order_id)
        .bind(order.venue.as_str())
        .bind(&order.contract_id)
        .bind(&order.pair_id)
        .bind(order.side.as_str())
        .bind(order.price)
        .bind(order.size as i64)
        .bind(order.status.as_str())
        .bind(order.fill_price)
        .bind(order.fill_size.map(|s| s as i64))
        .bind(order.is_paper)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, order_id: &str) -> Result<Option<PersistedOrder>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(OrderRow::into_domain).transpose()
    }

    async fn find_by_pair_id(&self, pair_id: &str) -> Result<Vec<PersistedOrder>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE pair_id = $1 ORDER BY created_at ASC"
        ))
        .bind(pair_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderRow::into_domain).collect()
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: PersistedOrderStatus,
        fill_price: Option<Decimal>,
        fill_size: Option<u64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2,
                fill_price = COALESCE($3, fill_price),
                fill_size = COALESCE($4, fill_size),
                updated_at = $5
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .bind(status.as_str())
        .bind(fill_price)
        .bind(fill_size.map(|s| s as i64))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_pending_orders(&self, is_paper: bool) -> Result<Vec<PersistedOrder>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE status = 'PENDING' AND is_paper = $1 ORDER BY created_at ASC"
        ))
        .bind(is_paper)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderRow::into_domain).collect()
    }
}
