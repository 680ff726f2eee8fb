//! Postgres pair repository.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

use arb_core::traits::PairRepository;
use arb_core::types::ContractPair;

use crate::models::PairRow;

/// Repository for pair definitions.
#[derive(Debug, Clone)]
pub struct PgPairRepository {
    pool: PgPool,
}

impl PgPairRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PairRepository for PgPairRepository {
    async fn upsert(&self, pair: &ContractPair) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pairs
                (pair_id, kalshi_contract_id, polymarket_contract_id, primary_leg,
                 resolution_date, kalshi_maker_fee, kalshi_taker_fee, kalshi_gas_usd,
                 polymarket_maker_fee, polymarket_taker_fee, polymarket_gas_usd)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (pair_id) DO UPDATE SET
                kalshi_contract_id = EXCLUDED.kalshi_contract_id,
                polymarket_contract_id = EXCLUDED.polymarket_contract_id,
                primary_leg = EXCLUDED.primary_leg,
                resolution_date = EXCLUDED.resolution_date,
                kalshi_maker_fee = EXCLUDED.kalshi_maker_fee,
                kalshi_taker_fee = EXCLUDED.kalshi_taker_fee,
                kalshi_gas_usd = EXCLUDED.kalshi_gas_usd,
                polymarket_maker_fee = EXCLUDED.polymarket_maker_fee,
                polymarket_taker_fee = EXCLUDED.polymarket_taker_fee,
                polymarket_gas_usd = EXCLUDED.polymarket_gas_usd
            "#,
        )
        .bind(&pair.pair_id)
        .bind(&pair.kalshi_contract_id)
        .bind(&pair.polymarket_contract_id)
        .bind(pair.primary_leg.as_str())
        .bind(pair.resolution_date)
        .bind(pair.kalshi_fees.maker)
        .bind(pair.kalshi_fees.taker)
        .bind(pair.kalshi_fees.gas_usd)
        .bind(pair.polymarket_fees.maker)
        .bind(pair.polymarket_fees.taker)
        .bind(pair.polymarket_fees.gas_usd)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, pair_id: &str) -> Result<Option<ContractPair>> {
        let row = sqlx::query_as::<_, PairRow>(
            "SELECT pair_id, kalshi_contract_id, polymarket_contract_id, primary_leg, \
             resolution_date, kalshi_maker_fee, kalshi_taker_fee, kalshi_gas_usd, \
             polymarket_maker_fee, polymarket_taker_fee, polymarket_gas_usd \
             FROM pairs WHERE pair_id = $1",
        )
        .bind(pair_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PairRow::into_domain).transpose()
    }
}
