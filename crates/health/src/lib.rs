//! Venue health tracking and the degradation protocol.
//!
//! The tracker classifies each venue every tick (staleness, latency,
//! connection), confirms transitions through two-tick hysteresis, and flips
//! the per-venue [`DegradationProtocol`] guard that downstream executors
//! consult before trading.

pub mod degradation;
pub mod tracker;

pub use degradation::DegradationProtocol;
pub use tracker::PlatformHealthTracker;
