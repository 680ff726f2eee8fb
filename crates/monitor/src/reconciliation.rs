//! Reconciliation of local positions against venue truth.
//!
//! Runs at startup and on operator request, never more than once per
//! debounce window. Every order referenced by an active position is queried
//! at its venue; divergences are classified, recorded, and flip the owning
//! position into `RECONCILIATION_REQUIRED` until an operator resolves it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use arb_connectors::ConnectorRegistry;
use arb_core::bus::EventBus;
use arb_core::config::ReconciliationConfig;
use arb_core::error::{ExecutionError, ExecutionErrorCode};
use arb_core::events::{
    DiscrepancyEvent, Event, EventHeader, ReconciliationCompleteEvent,
};
use arb_core::traits::{OrderRepository, PositionRepository};
use arb_core::types::{
    DiscrepancyKind, PersistedOrder, PersistedOrderStatus, Position, PositionStatus,
    ReconciliationDiscrepancy,
};
use chrono::Utc;

/// Why a reconciliation pass was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Startup,
    Operator,
}

/// Errors from starting a run.
#[derive(Debug, Error)]
pub enum ReconciliationError {
    /// A run started less than the debounce window ago.
    #[error("reconciliation debounced; retry in {retry_after_secs}s")]
    Debounced { retry_after_secs: u64 },

    /// The position query itself failed.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Summary of one completed pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub trigger: RunTrigger,
    pub positions_checked: u32,
    pub orders_verified: u32,
    pub pending_orders_resolved: u32,
    pub discrepancies_found: u32,
    pub duration_ms: u64,
    pub summary: String,
    pub discrepancies: Vec<ReconciliationDiscrepancy>,
}

/// Operator resolution for a flagged position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    MarkOpen,
    MarkClosed,
    MarkSingleLegExposed,
    MarkExitPartial,
}

impl ResolutionAction {
    #[must_use]
    pub fn target_status(self) -> PositionStatus {
        match self {
            Self::MarkOpen => PositionStatus::Open,
            Self::MarkClosed => PositionStatus::Closed,
            Self::MarkSingleLegExposed => PositionStatus::SingleLegExposed,
            Self::MarkExitPartial => PositionStatus::ExitPartial,
        }
    }
}

/// Snapshot for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationStatus {
    pub last_run_secs_ago: Option<u64>,
    pub open_discrepancies: Vec<ReconciliationDiscrepancy>,
    pub last_report: Option<ReconciliationReport>,
}

/// Cross-checks local positions against venue truth.
pub struct ReconciliationEngine {
    positions: Arc<dyn PositionRepository>,
    orders: Arc<dyn OrderRepository>,
    connectors: Arc<ConnectorRegistry>,
    bus: Arc<EventBus>,
    config: ReconciliationConfig,
    query_timeout: Duration,
    is_paper: bool,
    last_run: Mutex<Option<Instant>>,
    open_discrepancies: Mutex<HashMap<Uuid, Vec<ReconciliationDiscrepancy>>>,
    last_report: Mutex<Option<ReconciliationReport>>,
}

impl ReconciliationEngine {
    #[must_use]
    pub fn new(
        positions: Arc<dyn PositionRepository>,
        orders: Arc<dyn OrderRepository>,
        connectors: Arc<ConnectorRegistry>,
        bus: Arc<EventBus>,
        config: ReconciliationConfig,
        query_timeout: Duration,
        is_paper: bool,
    ) -> Self {
        Self {
            positions,
            orders,
            connectors,
            bus,
            config,
            query_timeout,
            is_paper,
            last_run: Mutex::new(None),
            open_discrepancies: Mutex::new(HashMap::new()),
            last_report: Mutex::new(None),
        }
    }

    /// Runs one reconciliation pass.
    ///
    /// # Errors
    /// `Debounced` when a run started within the debounce window;
    /// `Storage` when positions cannot be loaded.
    pub async fn run(&self, trigger: RunTrigger) -> Result<ReconciliationReport, ReconciliationError> {
        {
            let mut last_run = self.last_run.lock();
            let debounce = Duration::from_secs(self.config.debounce_secs);
            if let Some(last) = *last_run {
                let elapsed = last.elapsed();
                if elapsed < debounce {
                    return Err(ReconciliationError::Debounced {
                        retry_after_secs: (debounce - elapsed).as_secs().max(1),
                    });
                }
            }
            *last_run = Some(Instant::now());
        }

        let started = Instant::now();
        info!(trigger = ?trigger, "reconciliation pass started");

        let active = self
            .positions
            .find_by_status(
                &[
                    PositionStatus::Open,
                    PositionStatus::SingleLegExposed,
                    PositionStatus::ExitPartial,
                    PositionStatus::ReconciliationRequired,
                ],
                self.is_paper,
            )
            .await?;

        let mut orders_verified = 0u32;
        let mut pending_orders_resolved = 0u32;
        let mut all_discrepancies = Vec::new();

        for position in &active {
            let discrepancies = self
                .check_position(position, &mut orders_verified, &mut pending_orders_resolved)
                .await;
            if discrepancies.is_empty() {
                continue;
            }

            // Flag the position; skip the transition when it is already
            // flagged from a previous pass.
            if position.status != PositionStatus::ReconciliationRequired {
                let transitioned = self
                    .positions
                    .update_status(
                        position.position_id,
                        position.status,
                        PositionStatus::ReconciliationRequired,
                    )
                    .await
                    .unwrap_or(false);
                if !transitioned {
                    warn!(
                        position_id = %position.position_id,
                        "could not flag position for reconciliation"
                    );
                }
            }

            for discrepancy in &discrepancies {
                self.bus
                    .publish(Event::ReconciliationDiscrepancy(DiscrepancyEvent {
                        header: EventHeader::new(position.correlation_id),
                        discrepancy: discrepancy.clone(),
                    }));
            }
            self.open_discrepancies
                .lock()
                .insert(position.position_id, discrepancies.clone());
            all_discrepancies.extend(discrepancies);
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let report = ReconciliationReport {
            trigger,
            positions_checked: active.len() as u32,
            orders_verified,
            pending_orders_resolved,
            discrepancies_found: all_discrepancies.len() as u32,
            duration_ms,
            summary: format!(
                "{} positions checked, {} orders verified, {} pending resolved, {} discrepancies",
                active.len(),
                orders_verified,
                pending_orders_resolved,
                all_discrepancies.len()
            ),
            discrepancies: all_discrepancies,
        };

        self.bus
            .publish(Event::ReconciliationComplete(ReconciliationCompleteEvent {
                header: EventHeader::root(),
                positions_checked: report.positions_checked,
                orders_verified: report.orders_verified,
                pending_orders_resolved: report.pending_orders_resolved,
                discrepancies_found: report.discrepancies_found,
                duration_ms,
                summary: report.summary.clone(),
            }));
        info!(
            positions_checked = report.positions_checked,
            discrepancies_found = report.discrepancies_found,
            duration_ms,
            "reconciliation pass complete"
        );

        *self.last_report.lock() = Some(report.clone());
        Ok(report)
    }

    async fn check_position(
        &self,
        position: &Position,
        orders_verified: &mut u32,
        pending_orders_resolved: &mut u32,
    ) -> Vec<ReconciliationDiscrepancy> {
        let mut discrepancies = Vec::new();

        for order_id in position.linked_order_ids() {
            let local = match self.orders.find_by_id(order_id).await {
                Ok(Some(order)) => order,
                Ok(None) => {
                    warn!(order_id, "position references an order with no local record");
                    continue;
                }
                Err(e) => {
                    error!(order_id, error = %e, "order lookup failed");
                    continue;
                }
            };

            match self.query_venue(&local).await {
                VenueAnswer::Unavailable(reason) => {
                    discrepancies.push(self.discrepancy(
                        position,
                        &local,
                        DiscrepancyKind::PlatformUnavailable,
                        reason,
                        "retry reconciliation once the venue is reachable",
                    ));
                }
                VenueAnswer::NotFound => {
                    discrepancies.push(self.discrepancy(
                        position,
                        &local,
                        DiscrepancyKind::OrderNotFound,
                        "not_found".to_string(),
                        "verify the order at the venue and correct the position state",
                    ));
                }
                VenueAnswer::Status(result) => {
                    *orders_verified += 1;
                    let venue_status = PersistedOrderStatus::from_order_status(result.status);

                    if local.status == PersistedOrderStatus::Pending && result.has_fills() {
                        if let Err(e) = self
                            .orders
                            .update_status(
                                &local.order_id,
                                venue_status,
                                Some(result.filled_price),
                                Some(result.filled_quantity),
                            )
                            .await
                        {
                            error!(order_id = %local.order_id, error = %e, "pending order sync failed");
                        }
                        *pending_orders_resolved += 1;
                        discrepancies.push(self.discrepancy(
                            position,
                            &local,
                            DiscrepancyKind::PendingFilled,
                            venue_status.as_str().to_string(),
                            "pending order filled at the venue; confirm the position state",
                        ));
                    } else if venue_status != local.status {
                        discrepancies.push(self.discrepancy(
                            position,
                            &local,
                            DiscrepancyKind::OrderStatusMismatch,
                            venue_status.as_str().to_string(),
                            "align the local order status with venue truth",
                        ));
                    }
                }
            }
        }

        discrepancies
    }

    async fn query_venue(&self, order: &PersistedOrder) -> VenueAnswer {
        let connector = self.connectors.get(order.venue);
        match tokio::time::timeout(self.query_timeout, connector.get_order_status(&order.order_id))
            .await
        {
            Ok(Ok(Some(result))) => VenueAnswer::Status(result),
            Ok(Ok(None)) => VenueAnswer::NotFound,
            Ok(Err(e)) => VenueAnswer::Unavailable(e.to_string()),
            Err(_) => VenueAnswer::Unavailable("query timed out".to_string()),
        }
    }

    fn discrepancy(
        &self,
        position: &Position,
        order: &PersistedOrder,
        kind: DiscrepancyKind,
        venue_state: String,
        recommended_action: &str,
    ) -> ReconciliationDiscrepancy {
        ReconciliationDiscrepancy {
            position_id: position.position_id,
            pair_id: position.pair_id.clone(),
            kind,
            order_id: Some(order.order_id.clone()),
            local_state: order.status.as_str().to_string(),
            venue_state,
            recommended_action: recommended_action.to_string(),
            detected_at: Utc::now(),
        }
    }

    /// Operator path: applies a resolution to a flagged position and clears
    /// its recorded discrepancies.
    pub async fn resolve_discrepancy(
        &self,
        position_id: Uuid,
        action: ResolutionAction,
        rationale: Option<&str>,
    ) -> Result<(), ExecutionError> {
        let position = self
            .positions
            .find_by_id(position_id)
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

        if position.status != PositionStatus::ReconciliationRequired {
            return Err(ExecutionError::new(
                ExecutionErrorCode::InvalidPositionState,
                format!(
                    "position {position_id} is {}, expected RECONCILIATION_REQUIRED",
                    position.status
                ),
            ));
        }

        let transitioned = self
            .positions
            .update_status(
                position_id,
                PositionStatus::ReconciliationRequired,
                action.target_status(),
            )
            .await
            .map_err(|e| {
                ExecutionError::new(
                    ExecutionErrorCode::GenericExecutionFailure,
                    format!("status update failed: {e}"),
                )
            })?;
        if !transitioned {
            return Err(ExecutionError::new(
                ExecutionErrorCode::InvalidPositionState,
                format!("position {position_id} moved concurrently"),
            ));
        }

        self.open_discrepancies.lock().remove(&position_id);
        info!(
            position_id = %position_id,
            action = ?action,
            rationale = rationale.unwrap_or("-"),
            "reconciliation discrepancy resolved"
        );
        Ok(())
    }

    /// Snapshot for the status endpoint.
    #[must_use]
    pub fn status(&self) -> ReconciliationStatus {
        ReconciliationStatus {
            last_run_secs_ago: self.last_run.lock().map(|t| t.elapsed().as_secs()),
            open_discrepancies: self
                .open_discrepancies
                .lock()
                .values()
                .flatten()
                .cloned()
                .collect(),
            last_report: self.last_report.lock().clone(),
        }
    }
}

enum VenueAnswer {
    Status(arb_core::types::OrderResult),
    NotFound,
    Unavailable(String),
}
