//! API server for the arbitrage engine.

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use arb_execution::SingleLegResolution;
use arb_monitor::ReconciliationEngine;

use crate::handlers::{self, ApiState};

/// HTTP surface over the operator actions.
pub struct ApiServer {
    state: ApiState,
}

impl ApiServer {
    #[must_use]
    pub fn new(
        resolution: Arc<SingleLegResolution>,
        reconciliation: Arc<ReconciliationEngine>,
    ) -> Self {
        Self {
            state: ApiState {
                resolution,
                reconciliation,
            },
        }
    }

    /// Builds the router with all routes and layers.
    #[must_use]
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/positions/:id/retry-leg", post(handlers::retry_leg))
            .route("/positions/:id/close-leg", post(handlers::close_leg))
            .route("/positions/:id/exposure", get(handlers::position_exposure))
            .route("/reconciliation/run", post(handlers::run_reconciliation))
            .route(
                "/reconciliation/:id/resolve",
                post(handlers::resolve_discrepancy),
            )
            .route(
                "/reconciliation/status",
                get(handlers::reconciliation_status),
            )
            .with_state(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Binds and serves until the process exits.
    ///
    /// # Errors
    /// Returns an error if the listener fails to bind or serving fails.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "web API listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}
