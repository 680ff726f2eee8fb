//! Engine assembly and lifecycle.
//!
//! Components are wired in a fixed order: repositories, event bus, health,
//! degradation, execution, exit/exposure, reconciliation. Schedulers own
//! every periodic tick; shutdown stops them at the next tick boundary.

use anyhow::Result;
use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use arb_connectors::{ConnectorRegistry, PaperConnector};
use arb_core::bus::EventBus;
use arb_core::config::AppConfig;
use arb_core::events::Event;
use arb_core::scheduler::Scheduler;
use arb_core::traits::{
    HealthLogRepository, OrderRepository, PairRepository, PlatformConnector, PositionRepository,
};
use arb_core::types::{ContractPair, FeeSchedule, RankedOpportunity, Venue};
use arb_data::{
    InMemoryHealthLogRepository, InMemoryOrderRepository, InMemoryPairRepository,
    InMemoryPositionRepository, PgHealthLogRepository, PgOrderRepository, PgPairRepository,
    PgPositionRepository,
};
use arb_execution::{
    ExecutionCore, ExecutionLock, ExecutionQueue, ExposureAlertScheduler, ExposureTracker,
    SimpleRiskManager, SingleLegResolution,
};
use arb_health::{DegradationProtocol, PlatformHealthTracker};
use arb_monitor::{ExitMonitor, ReconciliationEngine, RunTrigger};
use arb_orderbook::{OrderBookNormalizer, RawKalshiBook, RawPolymarketBook, RawPolymarketLevel};
use arb_web_api::ApiServer;

struct Repositories {
    orders: Arc<dyn OrderRepository>,
    positions: Arc<dyn PositionRepository>,
    pairs: Arc<dyn PairRepository>,
    health_log: Arc<dyn HealthLogRepository>,
}

async fn build_repositories(config: &AppConfig) -> Result<Repositories> {
    if config.database.in_memory {
        info!("using in-memory repositories (paper mode)");
        let pairs = Arc::new(InMemoryPairRepository::new());
        let orders = Arc::new(InMemoryOrderRepository::new());
        let positions = Arc::new(InMemoryPositionRepository::new(pairs.clone(), orders.clone()));
        return Ok(Repositories {
            orders,
            positions,
            pairs,
            health_log: Arc::new(InMemoryHealthLogRepository::new()),
        });
    }

    let pool = arb_data::connect(&config.database).await?;
    arb_data::init_schema(&pool).await?;
    info!(url = %config.database.url, "connected to Postgres");
    Ok(Repositories {
        orders: Arc::new(PgOrderRepository::new(pool.clone())),
        positions: Arc::new(PgPositionRepository::new(pool.clone())),
        pairs: Arc::new(PgPairRepository::new(pool.clone())),
        health_log: Arc::new(PgHealthLogRepository::new(pool)),
    })
}

fn build_paper_registry() -> Arc<ConnectorRegistry> {
    let kalshi: Arc<dyn PlatformConnector> = Arc::new(PaperConnector::new(Venue::Kalshi));
    let polymarket: Arc<dyn PlatformConnector> = Arc::new(PaperConnector::new(Venue::Polymarket));
    Arc::new(ConnectorRegistry::new(kalshi, polymarket))
}

/// Forwards live book updates into the health tracker's data-age and
/// latency windows.
fn wire_book_callbacks(registry: &ConnectorRegistry, health: &Arc<PlatformHealthTracker>) {
    for connector in registry.all() {
        let venue = connector.venue();
        let health = health.clone();
        connector.on_book_update(Arc::new(move |book| {
            let latency_ms = (Utc::now() - book.timestamp)
                .num_milliseconds()
                .max(0) as f64;
            health.record_update(venue, latency_ms);
        }));
    }
}

/// Logs every bus event; the monitoring tail every deployment wants.
fn spawn_event_logger(bus: &Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => info!(
                    event = event.name(),
                    correlation_id = %event.header().correlation_id,
                    "event"
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event logger lagged")
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Runs the full engine until ctrl-c.
pub async fn run(config_path: &str) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    info!(config_path, "starting arbitrage engine");

    // 1. Repositories.
    let repos = build_repositories(&config).await?;

    // 2. Event bus.
    let bus = Arc::new(EventBus::new());
    let logger = spawn_event_logger(&bus);

    // 3. Connectors, health, degradation.
    let registry = build_paper_registry();
    let degradation = Arc::new(DegradationProtocol::new(bus.clone()));
    let health = Arc::new(PlatformHealthTracker::new(
        registry.clone(),
        degradation.clone(),
        bus.clone(),
        repos.health_log.clone(),
        config.health.clone(),
    ));
    wire_book_callbacks(&registry, &health);
    let (is_paper, _) = registry.mode_flags();

    // 4. Execution stack.
    let risk = Arc::new(SimpleRiskManager::new(config.risk.clone()));
    let resolution = Arc::new(SingleLegResolution::new(
        registry.clone(),
        repos.orders.clone(),
        repos.positions.clone(),
        risk.clone(),
        bus.clone(),
        config.execution.clone(),
    ));

    // 5. Exposure tracking and exit monitoring.
    let tracker = Arc::new(ExposureTracker::new(
        bus.clone(),
        repos.positions.clone(),
        config.exposure.clone(),
        is_paper,
    ));
    tracker.rebuild().await?;
    let tracker_task = tracker.spawn_subscriber();

    let alerts = Arc::new(ExposureAlertScheduler::new(
        repos.positions.clone(),
        registry.clone(),
        bus.clone(),
        config.exposure.clone(),
        Duration::from_secs(config.execution.book_fetch_timeout_secs),
        is_paper,
    ));
    let exit_monitor = Arc::new(ExitMonitor::new(
        repos.positions.clone(),
        repos.orders.clone(),
        registry.clone(),
        risk.clone(),
        bus.clone(),
        config.exit.clone(),
        Duration::from_secs(config.execution.book_fetch_timeout_secs),
        Duration::from_secs(config.execution.submit_timeout_secs),
        is_paper,
    ));

    // 6. Reconciliation, with the startup pass.
    let reconciliation = Arc::new(ReconciliationEngine::new(
        repos.positions.clone(),
        repos.orders.clone(),
        registry.clone(),
        bus.clone(),
        config.reconciliation.clone(),
        Duration::from_secs(config.execution.book_fetch_timeout_secs),
        is_paper,
    ));
    match reconciliation.run(RunTrigger::Startup).await {
        Ok(report) => info!(summary = %report.summary, "startup reconciliation"),
        Err(e) => error!(error = %e, "startup reconciliation failed"),
    }

    // 7. Schedulers.
    let (mut scheduler, shutdown) = Scheduler::new();
    {
        let health = health.clone();
        scheduler.spawn_periodic(
            "health",
            Duration::from_secs(config.health.tick_secs),
            move || {
                let health = health.clone();
                async move { health.tick().await }
            },
        );
    }
    {
        let exit_monitor = exit_monitor.clone();
        scheduler.spawn_periodic(
            "exit-monitor",
            Duration::from_secs(config.exit.tick_secs),
            move || {
                let exit_monitor = exit_monitor.clone();
                async move { exit_monitor.tick().await }
            },
        );
    }
    {
        let alerts = alerts.clone();
        scheduler.spawn_periodic(
            "exposure-alerts",
            Duration::from_secs(config.exposure.alert_interval_secs),
            move || {
                let alerts = alerts.clone();
                async move { alerts.tick().await }
            },
        );
    }

    // 8. Web API until shutdown.
    let api = ApiServer::new(resolution, reconciliation);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tokio::select! {
        result = api.serve(&addr) => {
            if let Err(e) = result {
                error!(error = %e, "web API exited");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    shutdown.shutdown();
    scheduler.join().await;
    tracker_task.abort();
    logger.abort();
    info!("engine stopped");
    Ok(())
}

/// Serves only the web API (no schedulers), for operating against an
/// existing database.
pub async fn serve(config_path: &str) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let repos = build_repositories(&config).await?;
    let bus = Arc::new(EventBus::new());
    let logger = spawn_event_logger(&bus);
    let registry = build_paper_registry();
    let (is_paper, _) = registry.mode_flags();

    let risk = Arc::new(SimpleRiskManager::new(config.risk.clone()));
    let resolution = Arc::new(SingleLegResolution::new(
        registry.clone(),
        repos.orders.clone(),
        repos.positions.clone(),
        risk,
        bus.clone(),
        config.execution.clone(),
    ));
    let reconciliation = Arc::new(ReconciliationEngine::new(
        repos.positions,
        repos.orders,
        registry,
        bus,
        config.reconciliation.clone(),
        Duration::from_secs(config.execution.book_fetch_timeout_secs),
        is_paper,
    ));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let result = ApiServer::new(resolution, reconciliation).serve(&addr).await;
    logger.abort();
    result
}

/// Smoke-runs the execution path against seeded paper books: normalize
/// venue payloads, detect nothing fancy, execute one opportunity through
/// the lock/reserve/execute/commit lifecycle, and print the outcome.
pub async fn demo(config_path: &str) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let repos = build_repositories(&config).await?;
    let bus = Arc::new(EventBus::new());
    let logger = spawn_event_logger(&bus);

    let kalshi = Arc::new(PaperConnector::new(Venue::Kalshi));
    let polymarket = Arc::new(PaperConnector::new(Venue::Polymarket));

    let pair = ContractPair {
        pair_id: "btc-100k-demo".to_string(),
        kalshi_contract_id: "KXBTC-26FEB02-B100000".to_string(),
        polymarket_contract_id: "0xbtc100k-yes".to_string(),
        primary_leg: Venue::Kalshi,
        resolution_date: None,
        kalshi_fees: FeeSchedule::new(dec!(0), dec!(0.02)),
        polymarket_fees: FeeSchedule::new(dec!(0), dec!(0.02)),
    };
    repos.pairs.upsert(&pair).await?;

    // Feed venue-native payloads through the normalizer, exactly as the
    // live feed handlers would.
    let normalizer = OrderBookNormalizer::new();
    let kalshi_book = normalizer
        .normalize_kalshi(&RawKalshiBook {
            ticker: pair.kalshi_contract_id.clone(),
            yes: Some(vec![[44, 500]]),
            no: Some(vec![[55, 500]]),
            seq: Some(1),
        })
        .ok_or_else(|| anyhow::anyhow!("demo Kalshi book rejected by normalizer"))?;
    let polymarket_book = normalizer
        .normalize_polymarket(&RawPolymarketBook {
            asset_id: pair.polymarket_contract_id.clone(),
            bids: Some(vec![RawPolymarketLevel {
                price: "0.55".to_string(),
                size: "500".to_string(),
            }]),
            asks: Some(vec![RawPolymarketLevel {
                price: "0.56".to_string(),
                size: "500".to_string(),
            }]),
            seq: Some(1),
        })
        .ok_or_else(|| anyhow::anyhow!("demo Polymarket book rejected by normalizer"))?;
    kalshi.seed_book(kalshi_book);
    polymarket.seed_book(polymarket_book);

    let registry = Arc::new(ConnectorRegistry::new(kalshi, polymarket));
    let risk = Arc::new(SimpleRiskManager::new(config.risk.clone()));
    let lock = Arc::new(ExecutionLock::with_timeout(Duration::from_secs(
        config.execution.lock_timeout_secs,
    )));
    let core = Arc::new(ExecutionCore::new(
        registry.clone(),
        repos.orders.clone(),
        repos.positions.clone(),
        bus.clone(),
        config.execution.clone(),
    ));
    let queue = ExecutionQueue::new(lock, risk.clone(), core);

    let opportunity = RankedOpportunity {
        opportunity_id: Uuid::new_v4(),
        pair_id: pair.pair_id.clone(),
        pair,
        primary_venue: Venue::Kalshi,
        buy_venue: Venue::Kalshi,
        sell_venue: Venue::Polymarket,
        target_buy_price: dec!(0.45),
        target_sell_price: dec!(0.55),
        net_edge: dec!(0.06),
        requested_capital_usd: dec!(100),
        correlation_id: Uuid::new_v4(),
    };

    let outcomes = queue.process(&[opportunity]).await;
    for outcome in &outcomes {
        println!(
            "opportunity {}: reserved={} executed={} committed={} position={:?}",
            outcome.opportunity_id,
            outcome.reserved,
            outcome.executed,
            outcome.committed,
            outcome.position_id,
        );
        if let Some(error) = &outcome.error {
            println!("  error: {error}");
        }
    }
    println!(
        "capital: available=${} deployed=${}",
        risk.available_capital(),
        risk.deployed_capital()
    );

    logger.abort();
    Ok(())
}
