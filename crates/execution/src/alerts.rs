//! Exposure reminder scheduler.
//!
//! Re-emits a reminder for every position still exposed, at a fixed
//! interval, with a per-position debounce so overlapping schedules do not
//! double-alert. Positions on a disconnected venue are skipped; one bad
//! position never poisons the rest of the tick.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use uuid::Uuid;

use arb_connectors::ConnectorRegistry;
use arb_core::bus::EventBus;
use arb_core::config::ExposureLimitsConfig;
use arb_core::error::ExecutionErrorCode;
use arb_core::events::Event;
use arb_core::traits::PositionRepository;
use arb_core::types::{PositionStatus, PositionWithOrders, Venue};

use crate::resolution::exposure_legs;
use crate::snapshot::{build_exposure_event, fetch_market_snapshot};

/// Periodic reminder emitter for exposed positions.
pub struct ExposureAlertScheduler {
    positions: Arc<dyn PositionRepository>,
    connectors: Arc<ConnectorRegistry>,
    bus: Arc<EventBus>,
    config: ExposureLimitsConfig,
    book_fetch_timeout: Duration,
    is_paper: bool,
    last_reminded: Mutex<HashMap<Uuid, Instant>>,
}

impl ExposureAlertScheduler {
    #[must_use]
    pub fn new(
        positions: Arc<dyn PositionRepository>,
        connectors: Arc<ConnectorRegistry>,
        bus: Arc<EventBus>,
        config: ExposureLimitsConfig,
        book_fetch_timeout: Duration,
        is_paper: bool,
    ) -> Self {
        Self {
            positions,
            connectors,
            bus,
            config,
            book_fetch_timeout,
            is_paper,
            last_reminded: Mutex::new(HashMap::new()),
        }
    }

    /// One scheduler tick over all exposed positions.
    pub async fn tick(&self) {
        let exposed = match self
            .positions
            .find_by_status_with_orders(
                &[PositionStatus::SingleLegExposed, PositionStatus::ExitPartial],
                self.is_paper,
            )
            .await
        {
            Ok(exposed) => exposed,
            Err(e) => {
                error!(error = %e, "exposure alert tick could not load positions");
                return;
            }
        };

        // Prune debounce entries whose positions no longer match the query.
        let live: HashSet<Uuid> = exposed.iter().map(|p| p.position.position_id).collect();
        self.last_reminded.lock().retain(|id, _| live.contains(id));

        for item in &exposed {
            let position_id = item.position.position_id;
            if let Err(e) = self.remind_one(item).await {
                error!(position_id = %position_id, error = %e, "exposure reminder failed");
            }
        }
    }

    async fn remind_one(&self, item: &PositionWithOrders) -> anyhow::Result<()> {
        let position = &item.position;

        if self.connectors.is_disconnected(Venue::Kalshi)
            || self.connectors.is_disconnected(Venue::Polymarket)
        {
            debug!(position_id = %position.position_id, "venue disconnected; reminder skipped");
            return Ok(());
        }

        let debounce = Duration::from_secs(self.config.alert_debounce_secs);
        if let Some(last) = self.last_reminded.lock().get(&position.position_id) {
            if last.elapsed() < debounce {
                debug!(position_id = %position.position_id, "reminder debounced");
                return Ok(());
            }
        }

        let (filled_leg, failed_leg) = exposure_legs(
            position,
            item.primary_order.as_ref(),
            item.secondary_order.as_ref(),
        )
        .map_err(|e| anyhow::anyhow!(e.message))?;

        let prices =
            fetch_market_snapshot(&self.connectors, &item.pair, self.book_fetch_timeout).await;

        let event = build_exposure_event(
            position.correlation_id,
            position.position_id,
            &item.pair,
            filled_leg,
            failed_leg,
            prices,
            self.connectors.mode_flags(),
            ExecutionErrorCode::SingleLegExposure,
            format!(
                "position still exposed ({}); operator action pending",
                position.status
            ),
        );
        self.bus.publish(Event::SingleLegExposureReminder(event));
        self.last_reminded
            .lock()
            .insert(position.position_id, Instant::now());

        info!(
            position_id = %position.position_id,
            status = %position.status,
            "exposure reminder emitted"
        );
        Ok(())
    }
}
