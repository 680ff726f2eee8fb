//! Serial opportunity driver.
//!
//! Processes a pre-ranked batch of opportunities strictly in input order.
//! Each opportunity runs its full lifecycle under the execution lock:
//! reserve, execute, then commit or release. Failures land in the
//! per-opportunity outcome and never poison the rest of the batch.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use arb_core::error::ExecutionError;
use arb_core::traits::RiskManager;
use arb_core::types::RankedOpportunity;

use crate::core::ExecutionCore;
use crate::lock::ExecutionLock;

/// Result of driving one opportunity through the queue.
#[derive(Debug, Clone)]
pub struct OpportunityOutcome {
    pub opportunity_id: Uuid,
    pub pair_id: String,
    pub reserved: bool,
    pub executed: bool,
    pub committed: bool,
    pub position_id: Option<Uuid>,
    pub error: Option<ExecutionError>,
}

/// Per-opportunity serial driver.
pub struct ExecutionQueue {
    lock: Arc<ExecutionLock>,
    risk: Arc<dyn RiskManager>,
    core: Arc<ExecutionCore>,
}

impl ExecutionQueue {
    #[must_use]
    pub fn new(
        lock: Arc<ExecutionLock>,
        risk: Arc<dyn RiskManager>,
        core: Arc<ExecutionCore>,
    ) -> Self {
        Self { lock, risk, core }
    }

    /// Processes opportunities serially; input order is execution order.
    pub async fn process(&self, opportunities: &[RankedOpportunity]) -> Vec<OpportunityOutcome> {
        let mut outcomes = Vec::with_capacity(opportunities.len());
        for opportunity in opportunities {
            let permit = self.lock.acquire().await;
            let outcome = self.process_one(opportunity).await;
            permit.release();
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn process_one(&self, opportunity: &RankedOpportunity) -> OpportunityOutcome {
        let reservation = match self
            .risk
            .reserve_budget(&opportunity.reservation_request())
            .await
        {
            Ok(reservation) => reservation,
            Err(error) => {
                info!(
                    opportunity_id = %opportunity.opportunity_id,
                    error = %error,
                    "reservation denied; skipping opportunity"
                );
                return OpportunityOutcome {
                    opportunity_id: opportunity.opportunity_id,
                    pair_id: opportunity.pair_id.clone(),
                    reserved: false,
                    executed: false,
                    committed: false,
                    position_id: None,
                    error: Some(error),
                };
            }
        };

        let report = self.core.execute(opportunity, &reservation).await;

        // Success or single-leg exposure keeps capital deployed; everything
        // else returns it. A release racing a commit is best-effort.
        let keep_capital = report.success || report.partial_fill;
        let mut committed = false;
        if keep_capital {
            match self.risk.commit_reservation(reservation.reservation_id).await {
                Ok(()) => committed = true,
                Err(e) => warn!(
                    reservation_id = %reservation.reservation_id,
                    error = %e,
                    "commit failed"
                ),
            }
        } else if let Err(e) = self
            .risk
            .release_reservation(reservation.reservation_id)
            .await
        {
            warn!(
                reservation_id = %reservation.reservation_id,
                error = %e,
                "release failed"
            );
        }

        OpportunityOutcome {
            opportunity_id: opportunity.opportunity_id,
            pair_id: opportunity.pair_id.clone(),
            reserved: true,
            executed: report.success,
            committed,
            position_id: report.position_id,
            error: report.error,
        }
    }
}
