//! Budget-capped risk manager.
//!
//! A reservation ledger over a fixed capital pool: reserve deducts from the
//! available pool, commit marks the capital deployed, release returns it.
//! Each reservation settles exactly once; a release that races a commit is
//! treated as best-effort and logged rather than errored.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use arb_core::config::RiskConfig;
use arb_core::error::{ExecutionError, ExecutionErrorCode};
use arb_core::traits::RiskManager;
use arb_core::types::{BudgetReservation, ReservationRequest};

#[derive(Debug)]
struct RiskState {
    available: Decimal,
    deployed: Decimal,
    realized_pnl: Decimal,
    reservations: HashMap<Uuid, BudgetReservation>,
}

/// In-process [`RiskManager`] over a configured capital pool.
pub struct SimpleRiskManager {
    config: RiskConfig,
    state: Mutex<RiskState>,
}

impl SimpleRiskManager {
    #[must_use]
    pub fn new(config: RiskConfig) -> Self {
        let available = config.total_capital_usd;
        Self {
            config,
            state: Mutex::new(RiskState {
                available,
                deployed: Decimal::ZERO,
                realized_pnl: Decimal::ZERO,
                reservations: HashMap::new(),
            }),
        }
    }

    /// Capital currently available for new reservations.
    #[must_use]
    pub fn available_capital(&self) -> Decimal {
        self.state.lock().available
    }

    /// Capital committed into open positions.
    #[must_use]
    pub fn deployed_capital(&self) -> Decimal {
        self.state.lock().deployed
    }

    /// Cumulative realized P&L from closed positions.
    #[must_use]
    pub fn realized_pnl(&self) -> Decimal {
        self.state.lock().realized_pnl
    }

    /// Number of live (uncommitted, unreleased) reservations.
    #[must_use]
    pub fn open_reservations(&self) -> usize {
        self.state.lock().reservations.len()
    }
}

#[async_trait]
impl RiskManager for SimpleRiskManager {
    async fn reserve_budget(
        &self,
        request: &ReservationRequest,
    ) -> Result<BudgetReservation, ExecutionError> {
        let amount = request.requested_capital_usd;
        if amount <= Decimal::ZERO {
            return Err(ExecutionError::new(
                ExecutionErrorCode::LimitExceeded,
                format!("non-positive reservation request: {amount}"),
            ));
        }
        if amount > self.config.max_reservation_usd {
            return Err(ExecutionError::new(
                ExecutionErrorCode::LimitExceeded,
                format!(
                    "requested ${amount} exceeds per-opportunity cap ${}",
                    self.config.max_reservation_usd
                ),
            ));
        }

        let mut state = self.state.lock();
        if amount > state.available {
            return Err(ExecutionError::new(
                ExecutionErrorCode::LimitExceeded,
                format!("requested ${amount} exceeds available ${}", state.available),
            ));
        }

        state.available -= amount;
        let reservation = BudgetReservation {
            reservation_id: Uuid::new_v4(),
            opportunity_id: request.opportunity_id,
            reserved_capital_usd: amount,
            created_at: Utc::now(),
        };
        state
            .reservations
            .insert(reservation.reservation_id, reservation.clone());

        info!(
            reservation_id = %reservation.reservation_id,
            opportunity_id = %request.opportunity_id,
            amount = %amount,
            available = %state.available,
            "budget reserved"
        );
        Ok(reservation)
    }

    async fn commit_reservation(&self, reservation_id: Uuid) -> Result<(), ExecutionError> {
        let mut state = self.state.lock();
        let Some(reservation) = state.reservations.remove(&reservation_id) else {
            return Err(ExecutionError::new(
                ExecutionErrorCode::GenericExecutionFailure,
                format!("commit of unknown or already settled reservation {reservation_id}"),
            ));
        };
        state.deployed += reservation.reserved_capital_usd;
        info!(
            reservation_id = %reservation_id,
            deployed = %state.deployed,
            "reservation committed"
        );
        Ok(())
    }

    async fn release_reservation(&self, reservation_id: Uuid) -> Result<(), ExecutionError> {
        let mut state = self.state.lock();
        let Some(reservation) = state.reservations.remove(&reservation_id) else {
            // Release after commit loses the race; nothing to undo.
            warn!(
                reservation_id = %reservation_id,
                "release of unknown or already settled reservation; treating as no-op"
            );
            return Ok(());
        };
        state.available += reservation.reserved_capital_usd;
        info!(
            reservation_id = %reservation_id,
            available = %state.available,
            "reservation released"
        );
        Ok(())
    }

    async fn close_position(
        &self,
        capital_returned: Decimal,
        realized_pnl: Decimal,
    ) -> Result<(), ExecutionError> {
        let mut state = self.state.lock();
        state.available += capital_returned;
        state.deployed = (state.deployed - (capital_returned - realized_pnl)).max(Decimal::ZERO);
        state.realized_pnl += realized_pnl;
        info!(
            capital_returned = %capital_returned,
            realized_pnl = %realized_pnl,
            available = %state.available,
            "position closed"
        );
        Ok(())
    }
}
