//! Persistence layer: Postgres repositories behind the narrow traits in
//! `arb_core::traits`, plus in-memory equivalents for paper mode and tests.

pub mod database;
pub mod memory;
pub mod models;
pub mod repositories;

pub use database::{connect, init_schema};
pub use memory::{
    InMemoryHealthLogRepository, InMemoryOrderRepository, InMemoryPairRepository,
    InMemoryPositionRepository,
};
pub use repositories::{
    PgHealthLogRepository, PgOrderRepository, PgPairRepository, PgPositionRepository,
};
