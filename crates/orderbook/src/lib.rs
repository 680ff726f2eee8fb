//! Order book normalization pipeline.
//!
//! Converts venue-native books (Kalshi cents, Polymarket decimal strings)
//! into the unified normalized shape, validating prices into [0, 1],
//! flagging crossed/zero-spread books, and tracking normalization latency
//! against a 500 ms P95 SLA.

pub mod latency;
pub mod normalizer;
pub mod raw;

pub use latency::LatencyWindow;
pub use normalizer::OrderBookNormalizer;
pub use raw::{RawKalshiBook, RawPolymarketBook, RawPolymarketLevel};
