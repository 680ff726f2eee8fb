//! REST API for the cross-venue arbitrage engine.
//!
//! A thin axum layer over the operator actions: single-leg retry/close,
//! exposure inspection, and reconciliation runs.

pub mod handlers;
pub mod server;

pub use handlers::ApiState;
pub use server::ApiServer;
