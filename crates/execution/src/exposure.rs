//! Single-leg exposure counters and limit events.
//!
//! Counts exposure incidents per calendar month and per ISO week (Monday
//! start, UTC), emits `limit.approached` when the monthly count passes its
//! threshold and `limit.breached` when enough consecutive weeks breach the
//! weekly threshold. Counters rebuild from persisted positions at startup.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use arb_core::bus::EventBus;
use arb_core::config::ExposureLimitsConfig;
use arb_core::events::{Event, EventHeader, LimitApproachedEvent, LimitBreachedEvent};
use arb_core::timeutil::{iso_week_key, iso_week_key_back, month_key};
use arb_core::traits::PositionRepository;
use arb_core::types::PositionStatus;

/// Exposure counters, snapshot-cloneable for inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExposureCounters {
    pub per_month: HashMap<String, u32>,
    pub per_iso_week: HashMap<String, u32>,
    pub consecutive_breached_weeks: u32,
    pub last_evaluated_week: Option<String>,
}

/// Tracks single-leg exposure incidence against configured limits.
pub struct ExposureTracker {
    bus: Arc<EventBus>,
    positions: Arc<dyn PositionRepository>,
    limits: ExposureLimitsConfig,
    is_paper: bool,
    state: Mutex<ExposureCounters>,
}

impl ExposureTracker {
    #[must_use]
    pub fn new(
        bus: Arc<EventBus>,
        positions: Arc<dyn PositionRepository>,
        limits: ExposureLimitsConfig,
        is_paper: bool,
    ) -> Self {
        Self {
            bus,
            positions,
            limits,
            is_paper,
            state: Mutex::new(ExposureCounters::default()),
        }
    }

    /// Rebuilds counters from persisted exposed positions, then seeds the
    /// consecutive-breach streak by walking previous weeks backward until a
    /// non-breached week appears.
    ///
    /// # Errors
    /// Returns an error when the position query fails.
    pub async fn rebuild(&self) -> anyhow::Result<()> {
        let exposed = self
            .positions
            .find_by_status(&[PositionStatus::SingleLegExposed], self.is_paper)
            .await?;

        let now = Utc::now();
        let mut state = self.state.lock();
        *state = ExposureCounters::default();
        for position in &exposed {
            *state
                .per_month
                .entry(month_key(position.created_at))
                .or_insert(0) += 1;
            *state
                .per_iso_week
                .entry(iso_week_key(position.created_at))
                .or_insert(0) += 1;
        }

        let mut streak = 0;
        for weeks_back in 1.. {
            let key = iso_week_key_back(now, weeks_back);
            let count = state.per_iso_week.get(&key).copied().unwrap_or(0);
            if count > self.limits.weekly_threshold {
                streak += 1;
            } else {
                break;
            }
        }
        state.consecutive_breached_weeks = streak;
        state.last_evaluated_week = Some(iso_week_key(now));

        info!(
            exposed_positions = exposed.len(),
            consecutive_breached_weeks = streak,
            "exposure counters rebuilt"
        );
        Ok(())
    }

    /// Records one exposure incident and emits any limit events it causes.
    pub fn record_exposure(&self, at: DateTime<Utc>) {
        let month = month_key(at);
        let week = iso_week_key(at);
        let mut events = Vec::new();

        {
            let mut state = self.state.lock();

            let month_count = {
                let entry = state.per_month.entry(month).or_insert(0);
                *entry += 1;
                *entry
            };

            // Week rollover: before judging the current week, settle the
            // previous one into the streak.
            if state.last_evaluated_week.as_deref() != Some(week.as_str()) {
                let previous_week = iso_week_key_back(at, 1);
                let previous_count =
                    state.per_iso_week.get(&previous_week).copied().unwrap_or(0);
                if previous_count > self.limits.weekly_threshold {
                    state.consecutive_breached_weeks += 1;
                } else {
                    state.consecutive_breached_weeks = 0;
                }
                state.last_evaluated_week = Some(week.clone());
            }

            let week_count = {
                let entry = state.per_iso_week.entry(week).or_insert(0);
                *entry += 1;
                *entry
            };

            if month_count > self.limits.monthly_threshold {
                warn!(
                    count = month_count,
                    threshold = self.limits.monthly_threshold,
                    "monthly exposure limit approached"
                );
                events.push(Event::LimitApproached(LimitApproachedEvent {
                    header: EventHeader::root(),
                    limit_type: "monthly_exposure".to_string(),
                    count: month_count,
                    threshold: self.limits.monthly_threshold,
                }));
            }

            if week_count > self.limits.weekly_threshold
                && state.consecutive_breached_weeks + 1 >= self.limits.consecutive_weeks
            {
                warn!(
                    consecutive_weeks = state.consecutive_breached_weeks + 1,
                    "weekly consecutive exposure limit breached"
                );
                events.push(Event::LimitBreached(LimitBreachedEvent {
                    header: EventHeader::root(),
                    limit_type: "weekly_consecutive_exposure".to_string(),
                    consecutive_weeks: state.consecutive_breached_weeks + 1,
                }));
            }
        }

        for event in events {
            self.bus.publish(event);
        }
    }

    /// Snapshot of the current counters.
    #[must_use]
    pub fn counters(&self) -> ExposureCounters {
        self.state.lock().clone()
    }

    /// Subscribes to the bus and counts every `execution.single_leg.exposure`.
    pub fn spawn_subscriber(self: &Arc<Self>) -> JoinHandle<()> {
        let tracker = self.clone();
        let mut rx = tracker.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(Event::SingleLegExposure(event)) => {
                        tracker.record_exposure(event.header.timestamp);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        error!(missed, "exposure tracker lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_data::{InMemoryOrderRepository, InMemoryPairRepository, InMemoryPositionRepository};
    use arb_core::types::{Position, PositionLeg, Side, Venue};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn limits() -> ExposureLimitsConfig {
        ExposureLimitsConfig {
            monthly_threshold: 5,
            weekly_threshold: 1,
            consecutive_weeks: 3,
            alert_interval_secs: 60,
            alert_debounce_secs: 55,
        }
    }

    fn tracker_with_bus() -> (Arc<ExposureTracker>, tokio::sync::broadcast::Receiver<Event>) {
        let bus = Arc::new(EventBus::new());
        let rx = bus.subscribe();
        let pairs = Arc::new(InMemoryPairRepository::new());
        let orders = Arc::new(InMemoryOrderRepository::new());
        let positions = Arc::new(InMemoryPositionRepository::new(pairs, orders));
        (
            Arc::new(ExposureTracker::new(bus, positions, limits(), true)),
            rx,
        )
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn exposed_position(created_at: DateTime<Utc>) -> Position {
        Position {
            position_id: Uuid::new_v4(),
            pair_id: "btc-100k".to_string(),
            status: PositionStatus::SingleLegExposed,
            primary_leg: PositionLeg {
                venue: Venue::Kalshi,
                contract_id: "KXBTC-TEST".to_string(),
                side: Side::Buy,
                entry_price: dec!(0.45),
                size: 100,
            },
            secondary_leg: PositionLeg {
                venue: Venue::Polymarket,
                contract_id: "0xbtc".to_string(),
                side: Side::Sell,
                entry_price: dec!(0.55),
                size: 100,
            },
            primary_order_id: Some("k-1".to_string()),
            secondary_order_id: None,
            exit_primary_order_id: None,
            exit_secondary_order_id: None,
            expected_edge: dec!(0.06),
            is_paper: true,
            correlation_id: Uuid::new_v4(),
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn test_counters_increment_per_event() {
        let (tracker, _rx) = tracker_with_bus();
        let at = utc(2026, 8, 1);

        tracker.record_exposure(at);
        tracker.record_exposure(at);

        let counters = tracker.counters();
        assert_eq!(counters.per_month.get("2026-08"), Some(&2));
        assert_eq!(counters.per_iso_week.get("2026-W31"), Some(&2));
    }

    #[tokio::test]
    async fn test_monthly_threshold_fires_above_five() {
        let (tracker, mut rx) = tracker_with_bus();
        let at = utc(2026, 8, 1);

        for _ in 0..5 {
            tracker.record_exposure(at);
        }
        assert!(drain(&mut rx)
            .iter()
            .all(|e| e.name() != "limit.approached"));

        tracker.record_exposure(at);
        let events = drain(&mut rx);
        let approached: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::LimitApproached(a) => Some(a),
                _ => None,
            })
            .collect();
        assert_eq!(approached.len(), 1);
        assert_eq!(approached[0].count, 6);
        assert_eq!(approached[0].threshold, 5);
    }

    #[tokio::test]
    async fn test_three_consecutive_breached_weeks_fire_breach() {
        let (tracker, mut rx) = tracker_with_bus();

        // Weeks 31, 32, 33 of 2026, two exposures each.
        for week_start in [utc(2026, 7, 27), utc(2026, 8, 3), utc(2026, 8, 10)] {
            tracker.record_exposure(week_start);
            tracker.record_exposure(week_start + Duration::days(1));
        }

        let events = drain(&mut rx);
        let breached: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::LimitBreached(b) => Some(b),
                _ => None,
            })
            .collect();
        assert!(!breached.is_empty());
        assert_eq!(breached[0].consecutive_weeks, 3);
    }

    #[tokio::test]
    async fn test_quiet_week_resets_streak() {
        let (tracker, mut rx) = tracker_with_bus();

        // Two breached weeks, then a gap week with nothing, then another
        // breached week: streak restarts, no breach event.
        for week_start in [utc(2026, 7, 27), utc(2026, 8, 3)] {
            tracker.record_exposure(week_start);
            tracker.record_exposure(week_start + Duration::days(1));
        }
        // Week of Aug 17; the week of Aug 10 stayed quiet.
        tracker.record_exposure(utc(2026, 8, 17));
        tracker.record_exposure(utc(2026, 8, 18));

        let events = drain(&mut rx);
        assert!(events.iter().all(|e| e.name() != "limit.breached"));
        assert_eq!(tracker.counters().consecutive_breached_weeks, 0);
    }

    #[tokio::test]
    async fn test_rebuild_from_persisted_positions() {
        let bus = Arc::new(EventBus::new());
        let pairs = Arc::new(InMemoryPairRepository::new());
        let orders = Arc::new(InMemoryOrderRepository::new());
        let positions = Arc::new(InMemoryPositionRepository::new(pairs, orders));

        // Two exposures in each of the two previous ISO weeks.
        let now = Utc::now();
        for weeks_back in 1..=2 {
            for _ in 0..2 {
                let created = now - Duration::weeks(weeks_back);
                positions.create(&exposed_position(created)).await.unwrap();
            }
        }

        let tracker = ExposureTracker::new(bus, positions, limits(), true);
        tracker.rebuild().await.unwrap();

        let counters = tracker.counters();
        assert_eq!(counters.consecutive_breached_weeks, 2);
        assert_eq!(counters.last_evaluated_week, Some(iso_week_key(now)));
        assert_eq!(counters.per_iso_week.values().sum::<u32>(), 4);
    }

    #[tokio::test]
    async fn test_subscriber_counts_exposure_events() {
        use arb_core::error::{ExecutionError, ExecutionErrorCode};
        use arb_core::events::{
            LegSnapshot, MarketSnapshot, PnlScenarios, SingleLegExposureEvent,
        };

        let (tracker, _rx) = tracker_with_bus();
        let handle = tracker.spawn_subscriber();

        let leg = LegSnapshot {
            venue: Venue::Kalshi,
            contract_id: "KXBTC-TEST".to_string(),
            side: Side::Buy,
            price: dec!(0.45),
            size: 200,
            order_id: None,
        };
        tracker.bus.publish(Event::SingleLegExposure(SingleLegExposureEvent {
            header: EventHeader::root(),
            position_id: Uuid::new_v4(),
            pair_id: "btc-100k".to_string(),
            filled_leg: leg.clone(),
            failed_leg: leg,
            current_prices: MarketSnapshot::default(),
            pnl_scenarios: PnlScenarios {
                close_now: "UNAVAILABLE".to_string(),
                retry_at_current: "UNAVAILABLE".to_string(),
                hold_risk_assessment: "EXPOSED".to_string(),
            },
            recommended_actions: vec![],
            error: ExecutionError::new(ExecutionErrorCode::SingleLegExposure, "test"),
            is_paper: true,
            mixed_mode: false,
        }));

        // Give the subscriber task a moment to drain.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(tracker.counters().per_month.values().sum::<u32>(), 1);
        handle.abort();
    }
}
