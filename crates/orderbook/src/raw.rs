//! Venue-native order book payloads, as delivered by the feed handlers.

use serde::{Deserialize, Serialize};

/// Kalshi book snapshot: YES and NO sides as `[price_cents, quantity]`
/// pairs. Either side may be absent, which means empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawKalshiBook {
    pub ticker: String,
    pub yes: Option<Vec<[i64; 2]>>,
    pub no: Option<Vec<[i64; 2]>>,
    #[serde(default)]
    pub seq: Option<u64>,
}

/// One Polymarket CLOB level; prices and sizes arrive as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPolymarketLevel {
    pub price: String,
    pub size: String,
}

/// Polymarket book snapshot for a single token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPolymarketBook {
    pub asset_id: String,
    pub bids: Option<Vec<RawPolymarketLevel>>,
    pub asks: Option<Vec<RawPolymarketLevel>>,
    #[serde(default)]
    pub seq: Option<u64>,
}
