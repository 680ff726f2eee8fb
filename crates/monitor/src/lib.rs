//! Position monitoring: exit thresholds and reconciliation.
//!
//! The [`exit::ExitMonitor`] scans open positions for take-profit,
//! stop-loss, and time-based exits; the pure [`threshold`] module holds the
//! evaluation math; the [`reconciliation::ReconciliationEngine`] cross-checks
//! local positions against venue truth and exposes the operator resolution
//! path.

pub mod exit;
pub mod reconciliation;
pub mod threshold;

pub use exit::ExitMonitor;
pub use reconciliation::{
    ReconciliationEngine, ReconciliationError, ReconciliationReport, ReconciliationStatus,
    ResolutionAction, RunTrigger,
};
pub use threshold::{evaluate, LegInput, ThresholdConfig, ThresholdVerdict};
