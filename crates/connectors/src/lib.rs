//! Platform connector implementations.
//!
//! The engine consumes venues exclusively through
//! [`arb_core::traits::PlatformConnector`]; this crate provides the
//! [`PaperConnector`] simulation and the per-venue [`ConnectorRegistry`].
//! Live venue clients plug in behind the same trait.

pub mod paper;
pub mod registry;

pub use paper::{FillBehavior, PaperConnector};
pub use registry::ConnectorRegistry;
