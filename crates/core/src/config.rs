//! Engine configuration.
//!
//! Loaded from a TOML file merged with `ARB_`-prefixed environment variables
//! (double underscore as the section separator, e.g.
//! `ARB_EXPOSURE__MONTHLY_THRESHOLD=3`). Every section has working defaults
//! so a bare `AppConfig::default()` runs the paper engine.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub execution: ExecutionConfig,
    pub health: HealthConfig,
    pub exposure: ExposureLimitsConfig,
    pub exit: ExitConfig,
    pub reconciliation: ReconciliationConfig,
    pub risk: RiskConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Run with in-memory repositories instead of Postgres.
    pub in_memory: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Forced-release ceiling for the execution lock, seconds.
    pub lock_timeout_secs: u64,
    /// Deadline for order-book fetches, seconds.
    pub book_fetch_timeout_secs: u64,
    /// Deadline for order submissions, seconds. Must stay below the lock
    /// ceiling.
    pub submit_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    pub tick_secs: u64,
    /// Book age beyond which a venue counts as stale, seconds.
    pub stale_after_secs: u64,
    /// P95 normalization/feed latency threshold, milliseconds.
    pub p95_latency_threshold_ms: f64,
    /// Consecutive unhealthy (or healthy) ticks required to confirm a
    /// transition.
    pub hysteresis_ticks: u32,
    /// Maximum data age allowed when deactivating degradation, seconds.
    pub recovery_freshness_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureLimitsConfig {
    /// Monthly single-leg exposure count above which `limit.approached`
    /// fires.
    pub monthly_threshold: u32,
    /// Weekly exposure count above which a week counts as breached.
    pub weekly_threshold: u32,
    /// Breached-week streak length that fires `limit.breached`.
    pub consecutive_weeks: u32,
    /// Reminder scheduler interval, seconds.
    pub alert_interval_secs: u64,
    /// Per-position reminder debounce, seconds.
    pub alert_debounce_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitConfig {
    pub tick_secs: u64,
    /// Stop-loss trigger: current P&L at or below minus this multiple of the
    /// scaled initial edge.
    pub stop_loss_multiple: Decimal,
    /// Take-profit trigger: current P&L at or above this fraction of the
    /// scaled initial edge.
    pub take_profit_fraction: Decimal,
    /// Time-based trigger: hours remaining to resolution at or below this.
    pub time_based_hours: i64,
    /// Consecutive fully-failed ticks before one tick is skipped.
    pub circuit_breaker_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Minimum seconds between reconciliation runs.
    pub debounce_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Total capital available for reservations, USD.
    pub total_capital_usd: Decimal,
    /// Per-opportunity reservation cap, USD.
    pub max_reservation_usd: Decimal,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/arb_engine".to_string(),
                max_connections: 10,
                in_memory: true,
            },
            execution: ExecutionConfig {
                lock_timeout_secs: 30,
                book_fetch_timeout_secs: 2,
                submit_timeout_secs: 10,
            },
            health: HealthConfig {
                tick_secs: 30,
                stale_after_secs: 60,
                p95_latency_threshold_ms: 2000.0,
                hysteresis_ticks: 2,
                recovery_freshness_secs: 30,
            },
            exposure: ExposureLimitsConfig {
                monthly_threshold: 5,
                weekly_threshold: 1,
                consecutive_weeks: 3,
                alert_interval_secs: 60,
                alert_debounce_secs: 55,
            },
            exit: ExitConfig {
                tick_secs: 30,
                stop_loss_multiple: Decimal::TWO,
                take_profit_fraction: Decimal::new(80, 2),
                time_based_hours: 48,
                circuit_breaker_threshold: 3,
            },
            reconciliation: ReconciliationConfig { debounce_secs: 30 },
            risk: RiskConfig {
                total_capital_usd: Decimal::new(1000, 0),
                max_reservation_usd: Decimal::new(250, 0),
            },
        }
    }
}

impl AppConfig {
    /// Loads config from a TOML file layered over defaults, then applies
    /// `ARB_` environment overrides. A missing file is not an error.
    ///
    /// # Errors
    /// Returns an error when the file or environment contains values that do
    /// not deserialize.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ARB_").split("__"))
            .extract()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_match_documented_thresholds() {
        let config = AppConfig::default();
        assert_eq!(config.health.tick_secs, 30);
        assert_eq!(config.health.stale_after_secs, 60);
        assert_eq!(config.health.hysteresis_ticks, 2);
        assert_eq!(config.exposure.monthly_threshold, 5);
        assert_eq!(config.exposure.consecutive_weeks, 3);
        assert_eq!(config.exposure.alert_debounce_secs, 55);
        assert_eq!(config.exit.stop_loss_multiple, dec!(2));
        assert_eq!(config.exit.take_profit_fraction, dec!(0.80));
        assert_eq!(config.exit.time_based_hours, 48);
        assert_eq!(config.execution.lock_timeout_secs, 30);
        assert_eq!(config.reconciliation.debounce_secs, 30);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = AppConfig::load("/nonexistent/Config.toml").unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.database.in_memory);
    }

    #[test]
    fn test_submit_timeout_stays_below_lock_ceiling() {
        let config = AppConfig::default();
        assert!(config.execution.submit_timeout_secs < config.execution.lock_timeout_secs);
    }
}
