//! Connector registry keyed by venue.

use std::collections::HashMap;
use std::sync::Arc;

use arb_core::traits::PlatformConnector;
use arb_core::types::{ConnectorMode, Venue};

/// Holds one connector per venue and answers the cross-venue questions the
/// engine keeps asking (is either side down, what modes are involved).
#[derive(Clone)]
pub struct ConnectorRegistry {
    connectors: HashMap<Venue, Arc<dyn PlatformConnector>>,
}

impl ConnectorRegistry {
    /// Creates a registry from one connector per venue.
    #[must_use]
    pub fn new(
        kalshi: Arc<dyn PlatformConnector>,
        polymarket: Arc<dyn PlatformConnector>,
    ) -> Self {
        let mut connectors: HashMap<Venue, Arc<dyn PlatformConnector>> = HashMap::new();
        connectors.insert(Venue::Kalshi, kalshi);
        connectors.insert(Venue::Polymarket, polymarket);
        Self { connectors }
    }

    /// Returns the connector for a venue.
    ///
    /// # Panics
    /// Never: the constructor guarantees both venues are present.
    #[must_use]
    pub fn get(&self, venue: Venue) -> Arc<dyn PlatformConnector> {
        self.connectors
            .get(&venue)
            .cloned()
            .unwrap_or_else(|| unreachable!("registry always holds both venues"))
    }

    /// Returns all connectors.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<dyn PlatformConnector>> {
        self.connectors.values().cloned().collect()
    }

    /// True when the given venue's connector reports disconnected.
    #[must_use]
    pub fn is_disconnected(&self, venue: Venue) -> bool {
        !self.get(venue).is_connected()
    }

    /// True when any connector reports disconnected.
    #[must_use]
    pub fn any_disconnected(&self) -> bool {
        self.connectors.values().any(|c| !c.is_connected())
    }

    /// Reported mode of the given venue's connector.
    #[must_use]
    pub fn mode(&self, venue: Venue) -> ConnectorMode {
        self.get(venue).mode()
    }

    /// `(is_paper, mixed_mode)` across both venues, computed from the
    /// currently reported connector modes.
    #[must_use]
    pub fn mode_flags(&self) -> (bool, bool) {
        arb_core::events::mode_flags(self.mode(Venue::Kalshi), self.mode(Venue::Polymarket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::PaperConnector;

    fn paper_registry() -> (Arc<PaperConnector>, Arc<PaperConnector>, ConnectorRegistry) {
        let kalshi = Arc::new(PaperConnector::new(Venue::Kalshi));
        let polymarket = Arc::new(PaperConnector::new(Venue::Polymarket));
        let registry = ConnectorRegistry::new(kalshi.clone(), polymarket.clone());
        (kalshi, polymarket, registry)
    }

    #[test]
    fn test_get_returns_matching_venue() {
        let (_, _, registry) = paper_registry();
        assert_eq!(registry.get(Venue::Kalshi).venue(), Venue::Kalshi);
        assert_eq!(registry.get(Venue::Polymarket).venue(), Venue::Polymarket);
    }

    #[test]
    fn test_disconnection_checks() {
        let (kalshi, _, registry) = paper_registry();
        assert!(!registry.any_disconnected());

        kalshi.set_connected(false);
        assert!(registry.is_disconnected(Venue::Kalshi));
        assert!(!registry.is_disconnected(Venue::Polymarket));
        assert!(registry.any_disconnected());
    }

    #[test]
    fn test_mode_flags_all_paper() {
        let (_, _, registry) = paper_registry();
        assert_eq!(registry.mode_flags(), (true, false));
    }
}
