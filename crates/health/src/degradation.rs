//! Per-venue degradation protocol.
//!
//! An idempotent on/off guard flag. While active for a venue, downstream
//! executors must avoid trading that venue. State is driven entirely by the
//! health tracker's confirmed transitions; there are no timers here, and the
//! switch methods cannot fail.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use arb_core::bus::EventBus;
use arb_core::events::{
    DegradationActivatedEvent, DegradationDeactivatedEvent, Event, EventHeader,
};
use arb_core::types::Venue;

#[derive(Debug, Clone)]
struct ActiveOutage {
    since: Instant,
    reason: String,
}

/// Idempotent per-venue trading guard.
pub struct DegradationProtocol {
    bus: Arc<EventBus>,
    active: Mutex<HashMap<Venue, ActiveOutage>>,
}

impl DegradationProtocol {
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Activates the guard for a venue. No-op when already active.
    pub fn activate(&self, venue: Venue, reason: &str, last_data_timestamp: Option<DateTime<Utc>>) {
        {
            let mut active = self.active.lock();
            if active.contains_key(&venue) {
                return;
            }
            active.insert(
                venue,
                ActiveOutage {
                    since: Instant::now(),
                    reason: reason.to_string(),
                },
            );
        }

        warn!(venue = %venue, reason, "degradation protocol activated");
        self.bus
            .publish(Event::DegradationActivated(DegradationActivatedEvent {
                header: EventHeader::root(),
                venue,
                reason: reason.to_string(),
                last_data_timestamp,
            }));
    }

    /// Deactivates the guard for a venue. No-op when not active.
    pub fn deactivate(&self, venue: Venue) {
        let outage = self.active.lock().remove(&venue);
        let Some(outage) = outage else {
            return;
        };

        let outage_duration_ms = outage.since.elapsed().as_millis() as u64;
        info!(
            venue = %venue,
            outage_duration_ms,
            reason = %outage.reason,
            "degradation protocol deactivated"
        );
        self.bus
            .publish(Event::DegradationDeactivated(DegradationDeactivatedEvent {
                header: EventHeader::root(),
                venue,
                outage_duration_ms,
            }));
    }

    /// True while the guard is active for the venue.
    #[must_use]
    pub fn is_degraded(&self, venue: Venue) -> bool {
        self.active.lock().contains_key(&venue)
    }

    /// Venues currently guarded.
    #[must_use]
    pub fn degraded_venues(&self) -> Vec<Venue> {
        self.active.lock().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol_with_bus() -> (DegradationProtocol, tokio::sync::broadcast::Receiver<Event>) {
        let bus = Arc::new(EventBus::new());
        let rx = bus.subscribe();
        (DegradationProtocol::new(bus), rx)
    }

    #[tokio::test]
    async fn test_activate_sets_flag_and_emits_once() {
        let (protocol, mut rx) = protocol_with_bus();

        protocol.activate(Venue::Kalshi, "stale_data", None);
        protocol.activate(Venue::Kalshi, "stale_data", None);

        assert!(protocol.is_degraded(Venue::Kalshi));
        assert!(!protocol.is_degraded(Venue::Polymarket));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "degradation.activated");
        // Second activate was a no-op; nothing else on the bus.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deactivate_clears_flag_and_reports_duration() {
        let (protocol, mut rx) = protocol_with_bus();

        protocol.activate(Venue::Polymarket, "high_latency", None);
        let _ = rx.recv().await.unwrap();

        protocol.deactivate(Venue::Polymarket);
        assert!(!protocol.is_degraded(Venue::Polymarket));

        match rx.recv().await.unwrap() {
            Event::DegradationDeactivated(e) => {
                assert_eq!(e.venue, Venue::Polymarket);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deactivate_inactive_is_noop() {
        let (protocol, mut rx) = protocol_with_bus();
        protocol.deactivate(Venue::Kalshi);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_venues_are_independent() {
        let (protocol, _rx) = protocol_with_bus();
        protocol.activate(Venue::Kalshi, "stale_data", None);

        assert!(protocol.is_degraded(Venue::Kalshi));
        assert!(!protocol.is_degraded(Venue::Polymarket));
        assert_eq!(protocol.degraded_venues(), vec![Venue::Kalshi]);
    }
}
