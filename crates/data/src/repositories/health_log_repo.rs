//! Postgres health log repository (append-only).

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use arb_core::traits::HealthLogRepository;
use arb_core::types::{HealthStatus, Venue};

/// Append-only venue health log.
#[derive(Debug, Clone)]
pub struct PgHealthLogRepository {
    pool: PgPool,
}

impl PgHealthLogRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HealthLogRepository for PgHealthLogRepository {
    async fn insert(
        &self,
        venue: Venue,
        status: HealthStatus,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO venue_health_log (venue, status, reason, recorded_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(venue.as_str())
        .bind(status.as_str())
        .bind(reason)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
