//! Core types, traits, and event system for the cross-venue arbitrage engine.
//!
//! Everything shared across the engine lives here: the domain model
//! ([`types`]), execution errors as values ([`error`]), the event vocabulary
//! and bus ([`events`], [`bus`]), the seams to venues / risk / persistence
//! ([`traits`]), configuration ([`config`]), the periodic-task scheduler
//! ([`scheduler`]) and calendar keys ([`timeutil`]).

pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod scheduler;
pub mod timeutil;
pub mod traits;
pub mod types;

pub use bus::EventBus;
pub use config::AppConfig;
pub use error::{ExecutionError, ExecutionErrorCode, Severity};
pub use events::{Event, EventHeader};
pub use traits::{
    ConnectorError, HealthLogRepository, OrderRepository, PairRepository, PlatformConnector,
    PositionRepository, RiskManager,
};
pub use types::{
    BudgetReservation, ContractPair, NormalizedOrderBook, OrderParams, OrderResult, OrderStatus,
    PersistedOrder, PersistedOrderStatus, Position, PositionStatus, PriceLevel, RankedOpportunity,
    Side, Venue,
};
