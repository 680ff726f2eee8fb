//! In-process event bus.
//!
//! A thin wrapper around `tokio::sync::broadcast`: publishing never blocks,
//! every subscriber sees every event exactly once, and delivery order matches
//! publish order per subscriber. Slow subscribers that fall more than the
//! channel capacity behind lose the oldest events (`RecvError::Lagged`), which
//! is acceptable for monitoring consumers and must not happen for the
//! in-process trackers given the capacity below.

use tokio::sync::broadcast;
use tracing::debug;

use crate::events::Event;

/// Default channel capacity; sized well above any realistic burst.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Named, typed, in-process publish/subscribe.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Creates a bus with an explicit capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to all current subscribers.
    ///
    /// Never blocks and never fails: an event published with no subscribers
    /// is dropped silently, matching fire-and-forget semantics.
    pub fn publish(&self, event: Event) {
        debug!(event = event.name(), correlation_id = %event.header().correlation_id, "publish");
        // Err only means no receivers exist right now.
        let _ = self.tx.send(event);
    }

    /// Registers a new subscriber receiving all events from this point on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
