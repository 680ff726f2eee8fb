//! HTTP handlers for operator actions.
//!
//! Thin mappers over [`SingleLegResolution`] and [`ReconciliationEngine`];
//! all domain decisions stay in those components. Error mapping:
//! `INVALID_POSITION_STATE` is 409, a warning-severity `CLOSE_FAILED` is
//! 422, any other execution error is 502, anything unexpected is 500 with
//! wire code 4000.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use arb_core::error::{ExecutionError, ExecutionErrorCode, Severity};
use arb_execution::SingleLegResolution;
use arb_monitor::{ReconciliationEngine, ReconciliationError, ResolutionAction, RunTrigger};

/// Wire code for unexpected failures.
const UNEXPECTED_ERROR_CODE: u16 = 4000;

/// Shared state for all routes.
#[derive(Clone)]
pub struct ApiState {
    pub resolution: Arc<SingleLegResolution>,
    pub reconciliation: Arc<ReconciliationEngine>,
}

#[derive(Debug, Deserialize)]
pub struct RetryLegRequest {
    pub price: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloseLegRequest {
    pub rationale: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub action: ResolutionAction,
    pub rationale: Option<String>,
}

/// Maps an execution error to its HTTP status.
fn status_for(error: &ExecutionError) -> StatusCode {
    match (error.code, error.severity) {
        (ExecutionErrorCode::InvalidPositionState, _) => StatusCode::CONFLICT,
        (ExecutionErrorCode::CloseFailed, Severity::Warning) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(error: &ExecutionError) -> Response {
    let status = status_for(error);
    let body = serde_json::json!({
        "code": error.code.as_u16(),
        "message": error.message,
        "severity": error.severity,
    });
    (status, Json(body)).into_response()
}

fn unexpected_response(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "code": UNEXPECTED_ERROR_CODE, "message": message })),
    )
        .into_response()
}

/// `POST /positions/:id/retry-leg`
pub async fn retry_leg(
    State(state): State<ApiState>,
    Path(position_id): Path<Uuid>,
    Json(request): Json<RetryLegRequest>,
) -> Response {
    match state.resolution.retry_leg(position_id, request.price).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(error) => error_response(&error),
    }
}

/// `POST /positions/:id/close-leg`
pub async fn close_leg(
    State(state): State<ApiState>,
    Path(position_id): Path<Uuid>,
    request: Option<Json<CloseLegRequest>>,
) -> Response {
    let rationale = request.and_then(|Json(r)| r.rationale);
    match state
        .resolution
        .close_leg(position_id, rationale.as_deref())
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(error) => error_response(&error),
    }
}

/// `GET /positions/:id/exposure`
pub async fn position_exposure(
    State(state): State<ApiState>,
    Path(position_id): Path<Uuid>,
) -> Response {
    match state.resolution.exposure_report(position_id).await {
        Ok(report) => Json(report).into_response(),
        Err(error) => error_response(&error),
    }
}

/// `POST /reconciliation/run`
pub async fn run_reconciliation(State(state): State<ApiState>) -> Response {
    match state.reconciliation.run(RunTrigger::Operator).await {
        Ok(report) => Json(report).into_response(),
        Err(ReconciliationError::Debounced { retry_after_secs }) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "message": "reconciliation ran recently",
                "retry_after_secs": retry_after_secs,
            })),
        )
            .into_response(),
        Err(ReconciliationError::Storage(e)) => unexpected_response(&e.to_string()),
    }
}

/// `POST /reconciliation/:id/resolve`
pub async fn resolve_discrepancy(
    State(state): State<ApiState>,
    Path(position_id): Path<Uuid>,
    Json(request): Json<ResolveRequest>,
) -> Response {
    match state
        .reconciliation
        .resolve_discrepancy(position_id, request.action, request.rationale.as_deref())
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(&error),
    }
}

/// `GET /reconciliation/status`
pub async fn reconciliation_status(State(state): State<ApiState>) -> Response {
    Json(state.reconciliation.status()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_maps_to_conflict() {
        let error = ExecutionError::new(ExecutionErrorCode::InvalidPositionState, "wrong state");
        assert_eq!(status_for(&error), StatusCode::CONFLICT);
    }

    #[test]
    fn test_close_failed_warning_maps_to_unprocessable() {
        let error = ExecutionError::new(ExecutionErrorCode::CloseFailed, "no depth")
            .with_severity(Severity::Warning);
        assert_eq!(status_for(&error), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_close_failed_error_maps_to_bad_gateway() {
        let error = ExecutionError::new(ExecutionErrorCode::CloseFailed, "rejected");
        assert_eq!(status_for(&error), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_other_execution_errors_map_to_bad_gateway() {
        for code in [
            ExecutionErrorCode::RetryFailed,
            ExecutionErrorCode::OrderRejected,
            ExecutionErrorCode::GenericExecutionFailure,
        ] {
            let error = ExecutionError::new(code, "boom");
            assert_eq!(status_for(&error), StatusCode::BAD_GATEWAY, "{code:?}");
        }
    }
}
