//! Per-venue health tracking with hysteresis.
//!
//! Every feed update lands in `record_update`; a 30-second tick classifies
//! each venue as healthy / degraded / disconnected, requires two consecutive
//! observations before confirming a transition in either direction, persists
//! a health-log row whenever the observed status changes, and drives the
//! degradation protocol on confirmed transitions.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, warn};

use arb_connectors::ConnectorRegistry;
use arb_core::bus::EventBus;
use arb_core::config::HealthConfig;
use arb_core::events::{Event, EventHeader, HealthTransitionEvent, HealthUpdatedEvent};
use arb_core::traits::HealthLogRepository;
use arb_core::types::{HealthStatus, Venue, VenueHealth};
use arb_orderbook::LatencyWindow;

use crate::degradation::DegradationProtocol;

/// Samples kept in the per-venue feed-latency window.
const LATENCY_WINDOW_SIZE: usize = 100;

#[derive(Debug)]
struct VenueState {
    last_update: Option<Instant>,
    last_update_wall: Option<DateTime<Utc>>,
    latency: LatencyWindow,
    /// Hysteresis-confirmed status.
    confirmed: HealthStatus,
    unhealthy_streak: u32,
    healthy_streak: u32,
    /// Last status written to the health log.
    last_logged: Option<HealthStatus>,
}

impl VenueState {
    fn new() -> Self {
        Self {
            last_update: None,
            last_update_wall: None,
            latency: LatencyWindow::new(LATENCY_WINDOW_SIZE),
            confirmed: HealthStatus::Healthy,
            unhealthy_streak: 0,
            healthy_streak: 0,
            last_logged: None,
        }
    }

    fn data_age(&self) -> Option<Duration> {
        self.last_update.map(|t| t.elapsed())
    }
}

/// One observation of a venue, before hysteresis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Observation {
    status: HealthStatus,
    reason: Option<&'static str>,
}

/// Tracks venue health and drives degradation transitions.
pub struct PlatformHealthTracker {
    registry: Arc<ConnectorRegistry>,
    degradation: Arc<DegradationProtocol>,
    bus: Arc<EventBus>,
    health_log: Arc<dyn HealthLogRepository>,
    config: HealthConfig,
    state: Mutex<HashMap<Venue, VenueState>>,
}

impl PlatformHealthTracker {
    #[must_use]
    pub fn new(
        registry: Arc<ConnectorRegistry>,
        degradation: Arc<DegradationProtocol>,
        bus: Arc<EventBus>,
        health_log: Arc<dyn HealthLogRepository>,
        config: HealthConfig,
    ) -> Self {
        let mut state = HashMap::new();
        state.insert(Venue::Kalshi, VenueState::new());
        state.insert(Venue::Polymarket, VenueState::new());
        Self {
            registry,
            degradation,
            bus,
            health_log,
            config,
            state: Mutex::new(state),
        }
    }

    /// Records a feed update for a venue: advances the data-age clock and
    /// the rolling latency window.
    pub fn record_update(&self, venue: Venue, latency_ms: f64) {
        let mut state = self.state.lock();
        if let Some(venue_state) = state.get_mut(&venue) {
            venue_state.last_update = Some(Instant::now());
            venue_state.last_update_wall = Some(Utc::now());
            venue_state.latency.record(latency_ms);
        }
    }

    /// Confirmed status of a venue.
    #[must_use]
    pub fn status(&self, venue: Venue) -> HealthStatus {
        self.state
            .lock()
            .get(&venue)
            .map_or(HealthStatus::Healthy, |s| s.confirmed)
    }

    /// One health tick across both venues.
    pub async fn tick(&self) {
        for venue in [Venue::Kalshi, Venue::Polymarket] {
            self.tick_venue(venue).await;
        }
    }

    async fn tick_venue(&self, venue: Venue) {
        let (observation, snapshot, transition, log_row) = {
            let mut state = self.state.lock();
            let venue_state = state
                .get_mut(&venue)
                .expect("tracker state holds both venues");

            let observation = self.observe(venue, venue_state);
            let log_row = if venue_state.last_logged != Some(observation.status) {
                venue_state.last_logged = Some(observation.status);
                true
            } else {
                false
            };

            let transition = self.apply_hysteresis(venue, venue_state, observation);

            let snapshot = VenueHealth {
                venue,
                status: venue_state.confirmed,
                last_heartbeat: venue_state.last_update_wall,
                latency_ms_p95: venue_state.latency.p95(),
                mode: self.registry.mode(venue),
            };
            (observation, snapshot, transition, log_row)
        };

        if log_row {
            // Monitoring must not block monitoring: persistence failures are
            // logged and the tick continues.
            if let Err(e) = self
                .health_log
                .insert(venue, observation.status, observation.reason, Utc::now())
                .await
            {
                error!(venue = %venue, error = %e, "failed to persist health log row");
            }
        }

        if let Some((from, to, reason)) = transition {
            let event = HealthTransitionEvent {
                header: EventHeader::root(),
                venue,
                from,
                to,
                reason: reason.to_string(),
            };
            match to {
                HealthStatus::Degraded => self.bus.publish(Event::HealthDegraded(event)),
                HealthStatus::Disconnected => self.bus.publish(Event::HealthDisconnected(event)),
                HealthStatus::Healthy => self.bus.publish(Event::HealthRecovered(event)),
            }
        }

        self.bus.publish(Event::HealthUpdated(HealthUpdatedEvent {
            header: EventHeader::root(),
            health: snapshot,
            reason: observation.reason.map(str::to_string),
        }));
    }

    fn observe(&self, venue: Venue, state: &VenueState) -> Observation {
        if self.registry.is_disconnected(venue) {
            return Observation {
                status: HealthStatus::Disconnected,
                reason: Some("disconnected"),
            };
        }

        let stale_after = Duration::from_secs(self.config.stale_after_secs);
        let stale = match state.data_age() {
            Some(age) => age > stale_after,
            // Never updated counts as stale: there is no data to trade on.
            None => true,
        };
        if stale {
            return Observation {
                status: HealthStatus::Degraded,
                reason: Some("stale_data"),
            };
        }

        if let Some(p95) = state.latency.p95() {
            if p95 > self.config.p95_latency_threshold_ms {
                return Observation {
                    status: HealthStatus::Degraded,
                    reason: Some("high_latency"),
                };
            }
        }

        Observation {
            status: HealthStatus::Healthy,
            reason: None,
        }
    }

    /// Applies the two-tick hysteresis and degradation coupling. Returns the
    /// confirmed transition `(from, to, reason)`, if one happened this tick.
    fn apply_hysteresis(
        &self,
        venue: Venue,
        state: &mut VenueState,
        observation: Observation,
    ) -> Option<(HealthStatus, HealthStatus, &'static str)> {
        let reason = observation.reason.unwrap_or("recovered");

        if state.confirmed == HealthStatus::Healthy {
            if observation.status == HealthStatus::Healthy {
                state.unhealthy_streak = 0;
                return None;
            }
            state.unhealthy_streak += 1;
            if state.unhealthy_streak < self.config.hysteresis_ticks {
                return None;
            }

            let from = state.confirmed;
            state.confirmed = observation.status;
            state.unhealthy_streak = 0;
            state.healthy_streak = 0;
            self.degradation
                .activate(venue, reason, state.last_update_wall);
            return Some((from, observation.status, reason));
        }

        // Confirmed unhealthy.
        if observation.status == HealthStatus::Healthy {
            state.healthy_streak += 1;
            if state.healthy_streak < self.config.hysteresis_ticks {
                return None;
            }

            // Data-freshness gate: recovery is only accepted on fresh data.
            let fresh_within = Duration::from_secs(self.config.recovery_freshness_secs);
            let fresh = state.data_age().is_some_and(|age| age <= fresh_within);
            if !fresh {
                warn!(
                    venue = %venue,
                    "recovery confirmed by hysteresis but data is not fresh; keeping degradation active"
                );
                return None;
            }

            let from = state.confirmed;
            state.confirmed = HealthStatus::Healthy;
            state.healthy_streak = 0;
            state.unhealthy_streak = 0;
            self.degradation.deactivate(venue);
            return Some((from, HealthStatus::Healthy, "recovered"));
        }

        state.healthy_streak = 0;
        // Flavor change (degraded <-> disconnected) takes effect without
        // hysteresis; the venue is already confirmed unhealthy.
        if observation.status != state.confirmed {
            let from = state.confirmed;
            state.confirmed = observation.status;
            return Some((from, observation.status, reason));
        }
        None
    }

    /// Rewinds a venue's last-update instant, as if the update had happened
    /// `age` ago. Test hook for staleness paths.
    #[cfg(test)]
    pub(crate) fn backdate_update(&self, venue: Venue, age: Duration) {
        let mut state = self.state.lock();
        if let Some(venue_state) = state.get_mut(&venue) {
            venue_state.last_update = Instant::now().checked_sub(age);
            venue_state.last_update_wall = Some(Utc::now() - chrono::Duration::from_std(age).unwrap());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use arb_connectors::PaperConnector;
    use async_trait::async_trait;
    use tokio::sync::broadcast;

    struct RecordingHealthLog {
        rows: Mutex<Vec<(Venue, HealthStatus)>>,
    }

    impl RecordingHealthLog {
        fn new() -> Self {
            Self {
                rows: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HealthLogRepository for RecordingHealthLog {
        async fn insert(
            &self,
            venue: Venue,
            status: HealthStatus,
            _reason: Option<&str>,
            _at: DateTime<Utc>,
        ) -> Result<()> {
            self.rows.lock().push((venue, status));
            Ok(())
        }
    }

    struct Harness {
        kalshi: Arc<PaperConnector>,
        tracker: PlatformHealthTracker,
        degradation: Arc<DegradationProtocol>,
        log: Arc<RecordingHealthLog>,
        rx: broadcast::Receiver<Event>,
    }

    fn harness() -> Harness {
        let bus = Arc::new(EventBus::new());
        let rx = bus.subscribe();
        let kalshi = Arc::new(PaperConnector::new(Venue::Kalshi));
        let polymarket = Arc::new(PaperConnector::new(Venue::Polymarket));
        let registry = Arc::new(ConnectorRegistry::new(kalshi.clone(), polymarket));
        let degradation = Arc::new(DegradationProtocol::new(bus.clone()));
        let log = Arc::new(RecordingHealthLog::new());
        let tracker = PlatformHealthTracker::new(
            registry,
            degradation.clone(),
            bus,
            log.clone(),
            HealthConfig {
                tick_secs: 30,
                stale_after_secs: 60,
                p95_latency_threshold_ms: 2000.0,
                hysteresis_ticks: 2,
                recovery_freshness_secs: 30,
            },
        );
        Harness {
            kalshi,
            tracker,
            degradation,
            log,
            rx,
        }
    }

    fn drain_names(rx: &mut broadcast::Receiver<Event>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        names
    }

    fn fresh_both(harness: &Harness) {
        harness.tracker.record_update(Venue::Kalshi, 50.0);
        harness.tracker.record_update(Venue::Polymarket, 50.0);
    }

    #[tokio::test]
    async fn test_fresh_venue_stays_healthy() {
        let mut h = harness();
        fresh_both(&h);
        h.tracker.tick().await;

        assert_eq!(h.tracker.status(Venue::Kalshi), HealthStatus::Healthy);
        let names = drain_names(&mut h.rx);
        assert_eq!(
            names,
            vec!["platform.health.updated", "platform.health.updated"]
        );
    }

    #[tokio::test]
    async fn test_stale_data_needs_two_ticks_to_degrade() {
        let mut h = harness();
        // Kalshi never updated; Polymarket fresh.
        h.tracker.record_update(Venue::Polymarket, 50.0);

        h.tracker.tick().await;
        assert_eq!(h.tracker.status(Venue::Kalshi), HealthStatus::Healthy);
        assert!(!h.degradation.is_degraded(Venue::Kalshi));

        h.tracker.tick().await;
        assert_eq!(h.tracker.status(Venue::Kalshi), HealthStatus::Degraded);
        assert!(h.degradation.is_degraded(Venue::Kalshi));

        let names = drain_names(&mut h.rx);
        assert_eq!(
            names
                .iter()
                .filter(|n| **n == "platform.health.degraded")
                .count(),
            1
        );
        assert!(names.contains(&"degradation.activated"));
    }

    #[tokio::test]
    async fn test_opposite_observation_resets_streak() {
        let h = harness();
        h.tracker.record_update(Venue::Polymarket, 50.0);

        // One stale tick for Kalshi, then fresh data, then stale again:
        // never two consecutive, so no transition.
        h.tracker.tick().await;
        fresh_both(&h);
        h.tracker.tick().await;
        h.tracker.backdate_update(Venue::Kalshi, Duration::from_secs(120));
        h.tracker.tick().await;

        assert_eq!(h.tracker.status(Venue::Kalshi), HealthStatus::Healthy);
        assert!(!h.degradation.is_degraded(Venue::Kalshi));
    }

    #[tokio::test]
    async fn test_disconnect_confirms_as_disconnected() {
        let mut h = harness();
        fresh_both(&h);
        h.kalshi.set_connected(false);

        h.tracker.tick().await;
        h.tracker.tick().await;

        assert_eq!(h.tracker.status(Venue::Kalshi), HealthStatus::Disconnected);
        let names = drain_names(&mut h.rx);
        assert!(names.contains(&"platform.health.disconnected"));
    }

    #[tokio::test]
    async fn test_recovery_requires_two_healthy_ticks_and_fresh_data() {
        let mut h = harness();
        h.tracker.record_update(Venue::Polymarket, 50.0);

        // Degrade Kalshi (stale).
        h.tracker.tick().await;
        h.tracker.tick().await;
        assert_eq!(h.tracker.status(Venue::Kalshi), HealthStatus::Degraded);
        let _ = drain_names(&mut h.rx);

        // Fresh data now flows.
        fresh_both(&h);
        h.tracker.tick().await;
        assert_eq!(h.tracker.status(Venue::Kalshi), HealthStatus::Degraded);

        fresh_both(&h);
        h.tracker.tick().await;
        assert_eq!(h.tracker.status(Venue::Kalshi), HealthStatus::Healthy);
        assert!(!h.degradation.is_degraded(Venue::Kalshi));

        let names = drain_names(&mut h.rx);
        assert!(names.contains(&"platform.health.recovered"));
        assert!(names.contains(&"degradation.deactivated"));
    }

    #[tokio::test]
    async fn test_recovery_rejected_when_data_not_fresh() {
        let mut h = harness();
        h.tracker.record_update(Venue::Polymarket, 50.0);

        // Degrade Kalshi.
        h.tracker.tick().await;
        h.tracker.tick().await;
        let _ = drain_names(&mut h.rx);

        // Data 45s old: within the 60s staleness bound (observed healthy)
        // but outside the 30s freshness gate.
        for _ in 0..2 {
            h.tracker.backdate_update(Venue::Kalshi, Duration::from_secs(45));
            h.tracker.record_update(Venue::Polymarket, 50.0);
            h.tracker.tick().await;
        }

        assert_eq!(h.tracker.status(Venue::Kalshi), HealthStatus::Degraded);
        assert!(h.degradation.is_degraded(Venue::Kalshi));
        let names = drain_names(&mut h.rx);
        assert!(!names.contains(&"platform.health.recovered"));
        assert!(!names.contains(&"degradation.deactivated"));
    }

    #[tokio::test]
    async fn test_high_latency_degrades() {
        let h = harness();
        fresh_both(&h);
        for _ in 0..20 {
            h.tracker.record_update(Venue::Kalshi, 5000.0);
        }

        h.tracker.backdate_update(Venue::Kalshi, Duration::from_secs(1));
        h.tracker.tick().await;
        h.tracker.backdate_update(Venue::Kalshi, Duration::from_secs(1));
        h.tracker.record_update(Venue::Polymarket, 50.0);
        h.tracker.tick().await;

        assert_eq!(h.tracker.status(Venue::Kalshi), HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_health_log_rows_only_on_observed_change() {
        let h = harness();
        fresh_both(&h);

        for _ in 0..3 {
            h.tracker.tick().await;
        }

        // One initial row per venue, no repeats while status is unchanged.
        let rows = h.log.rows.lock().clone();
        assert_eq!(rows.len(), 2);
    }
}
