//! Postgres repository implementations.

pub mod health_log_repo;
pub mod order_repo;
pub mod pair_repo;
pub mod position_repo;

pub use health_log_repo::PgHealthLogRepository;
pub use order_repo::PgOrderRepository;
pub use pair_repo::PgPairRepository;
pub use position_repo::PgPositionRepository;
