//! Execution core for the cross-venue arbitrage engine.
//!
//! Everything between a ranked opportunity and a persisted position lives
//! here: the global [`lock::ExecutionLock`], the serial [`queue::ExecutionQueue`],
//! the two-leg [`core::ExecutionCore`], operator
//! [`resolution::SingleLegResolution`], the [`exposure::ExposureTracker`]
//! counters, the [`alerts::ExposureAlertScheduler`] reminders, and the
//! [`risk::SimpleRiskManager`] reservation ledger.

pub mod alerts;
pub mod core;
pub mod exposure;
pub mod lock;
pub mod pnl;
pub mod queue;
pub mod resolution;
pub mod risk;
pub mod snapshot;

pub use alerts::ExposureAlertScheduler;
pub use core::{ExecutionCore, ExecutionReport};
pub use exposure::{ExposureCounters, ExposureTracker};
pub use lock::{ExecutionLock, ExecutionPermit};
pub use queue::{ExecutionQueue, OpportunityOutcome};
pub use resolution::{CloseLegOutcome, ExposureReport, RetryLegOutcome, SingleLegResolution};
pub use risk::SimpleRiskManager;
