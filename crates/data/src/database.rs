//! Postgres pool bootstrap and schema.

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use arb_core::config::DatabaseConfig;

/// Connects a pool using the configured URL and connection cap.
///
/// # Errors
/// Returns an error when the database is unreachable.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;
    Ok(pool)
}

/// Creates the engine tables when they do not exist yet.
///
/// # Errors
/// Returns an error when DDL execution fails.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pairs (
            pair_id TEXT PRIMARY KEY,
            kalshi_contract_id TEXT NOT NULL,
            polymarket_contract_id TEXT NOT NULL,
            primary_leg TEXT NOT NULL,
            resolution_date TIMESTAMPTZ,
            kalshi_maker_fee NUMERIC NOT NULL,
            kalshi_taker_fee NUMERIC NOT NULL,
            kalshi_gas_usd NUMERIC,
            polymarket_maker_fee NUMERIC NOT NULL,
            polymarket_taker_fee NUMERIC NOT NULL,
            polymarket_gas_usd NUMERIC
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            order_id TEXT PRIMARY KEY,
            venue TEXT NOT NULL,
            contract_id TEXT NOT NULL,
            pair_id TEXT NOT NULL,
            side TEXT NOT NULL,
            price NUMERIC NOT NULL,
            size BIGINT NOT NULL,
            status TEXT NOT NULL,
            fill_price NUMERIC,
            fill_size BIGINT,
            is_paper BOOLEAN NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS positions (
            position_id UUID PRIMARY KEY,
            pair_id TEXT NOT NULL,
            status TEXT NOT NULL,
            primary_venue TEXT NOT NULL,
            primary_contract_id TEXT NOT NULL,
            primary_side TEXT NOT NULL,
            primary_entry_price NUMERIC NOT NULL,
            primary_size BIGINT NOT NULL,
            secondary_venue TEXT NOT NULL,
            secondary_contract_id TEXT NOT NULL,
            secondary_side TEXT NOT NULL,
            secondary_entry_price NUMERIC NOT NULL,
            secondary_size BIGINT NOT NULL,
            primary_order_id TEXT,
            secondary_order_id TEXT,
            exit_primary_order_id TEXT,
            exit_secondary_order_id TEXT,
            expected_edge NUMERIC NOT NULL,
            is_paper BOOLEAN NOT NULL,
            correlation_id UUID NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS venue_health_log (
            id BIGSERIAL PRIMARY KEY,
            venue TEXT NOT NULL,
            status TEXT NOT NULL,
            reason TEXT,
            recorded_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_positions_status ON positions (status, is_paper)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_pair ON orders (pair_id)")
        .execute(pool)
        .await?;

    Ok(())
}
