//! Row models and conversions between storage rows and domain types.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use arb_core::types::{
    ContractPair, FeeSchedule, PersistedOrder, PersistedOrderStatus, Position, PositionLeg,
    PositionStatus, Side, Venue,
};

/// One row of the `orders` table.
#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub order_id: String,
    pub venue: String,
    pub contract_id: String,
    pub pair_id: String,
    pub side: String,
    pub price: Decimal,
    pub size: i64,
    pub status: String,
    pub fill_price: Option<Decimal>,
    pub fill_size: Option<i64>,
    pub is_paper: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    /// Converts a stored row into the domain type.
    ///
    /// # Errors
    /// Returns an error on unknown venue/side/status strings.
    pub fn into_domain(self) -> Result<PersistedOrder> {
        Ok(PersistedOrder {
            venue: Venue::parse(&self.venue)
                .ok_or_else(|| anyhow!("unknown venue {:?}", self.venue))?,
            side: Side::parse(&self.side).ok_or_else(|| anyhow!("unknown side {:?}", self.side))?,
            status: PersistedOrderStatus::parse(&self.status)
                .ok_or_else(|| anyhow!("unknown order status {:?}", self.status))?,
            order_id: self.order_id,
            contract_id: self.contract_id,
            pair_id: self.pair_id,
            price: self.price,
            size: self.size as u64,
            fill_price: self.fill_price,
            fill_size: self.fill_size.map(|s| s as u64),
            is_paper: self.is_paper,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// One row of the `positions` table.
#[derive(Debug, Clone, FromRow)]
pub struct PositionRow {
    pub position_id: Uuid,
    pub pair_id: String,
    pub status: String,
    pub primary_venue: String,
    pub primary_contract_id: String,
    pub primary_side: String,
    pub primary_entry_price: Decimal,
    pub primary_size: i64,
    pub secondary_venue: String,
    pub secondary_contract_id: String,
    pub secondary_side: String,
    pub secondary_entry_price: Decimal,
    pub secondary_size: i64,
    pub primary_order_id: Option<String>,
    pub secondary_order_id: Option<String>,
    pub exit_primary_order_id: Option<String>,
    pub exit_secondary_order_id: Option<String>,
    pub expected_edge: Decimal,
    pub is_paper: bool,
    pub correlation_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PositionRow {
    /// Converts a stored row into the domain type.
    ///
    /// # Errors
    /// Returns an error on unknown venue/side/status strings.
    pub fn into_domain(self) -> Result<Position> {
        let primary_leg = PositionLeg {
            venue: Venue::parse(&self.primary_venue)
                .ok_or_else(|| anyhow!("unknown venue {:?}", self.primary_venue))?,
            contract_id: self.primary_contract_id,
            side: Side::parse(&self.primary_side)
                .ok_or_else(|| anyhow!("unknown side {:?}", self.primary_side))?,
            entry_price: self.primary_entry_price,
            size: self.primary_size as u64,
        };
        let secondary_leg = PositionLeg {
            venue: Venue::parse(&self.secondary_venue)
                .ok_or_else(|| anyhow!("unknown venue {:?}", self.secondary_venue))?,
            contract_id: self.secondary_contract_id,
            side: Side::parse(&self.secondary_side)
                .ok_or_else(|| anyhow!("unknown side {:?}", self.secondary_side))?,
            entry_price: self.secondary_entry_price,
            size: self.secondary_size as u64,
        };
        Ok(Position {
            position_id: self.position_id,
            pair_id: self.pair_id,
            status: PositionStatus::parse(&self.status)
                .ok_or_else(|| anyhow!("unknown position status {:?}", self.status))?,
            primary_leg,
            secondary_leg,
            primary_order_id: self.primary_order_id,
            secondary_order_id: self.secondary_order_id,
            exit_primary_order_id: self.exit_primary_order_id,
            exit_secondary_order_id: self.exit_secondary_order_id,
            expected_edge: self.expected_edge,
            is_paper: self.is_paper,
            correlation_id: self.correlation_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// One row of the `pairs` table.
#[derive(Debug, Clone, FromRow)]
pub struct PairRow {
    pub pair_id: String,
    pub kalshi_contract_id: String,
    pub polymarket_contract_id: String,
    pub primary_leg: String,
    pub resolution_date: Option<DateTime<Utc>>,
    pub kalshi_maker_fee: Decimal,
    pub kalshi_taker_fee: Decimal,
    pub kalshi_gas_usd: Option<Decimal>,
    pub polymarket_maker_fee: Decimal,
    pub polymarket_taker_fee: Decimal,
    pub polymarket_gas_usd: Option<Decimal>,
}

impl PairRow {
    /// Converts a stored row into the domain type.
    ///
    /// # Errors
    /// Returns an error on an unknown primary-leg venue string.
    pub fn into_domain(self) -> Result<ContractPair> {
        Ok(ContractPair {
            primary_leg: Venue::parse(&self.primary_leg)
                .ok_or_else(|| anyhow!("unknown venue {:?}", self.primary_leg))?,
            pair_id: self.pair_id,
            kalshi_contract_id: self.kalshi_contract_id,
            polymarket_contract_id: self.polymarket_contract_id,
            resolution_date: self.resolution_date,
            kalshi_fees: FeeSchedule {
                maker: self.kalshi_maker_fee,
                taker: self.kalshi_taker_fee,
                gas_usd: self.kalshi_gas_usd,
            },
            polymarket_fees: FeeSchedule {
                maker: self.polymarket_maker_fee,
                taker: self.polymarket_taker_fee,
                gas_usd: self.polymarket_gas_usd,
            },
        })
    }
}
