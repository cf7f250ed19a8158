//! HTTP surface

pub mod payments;

use crate::health::{HealthChecker, HealthState, HealthStatus};
use crate::middleware::logging::UuidRequestId;
use crate::services::payment_orchestrator::PaymentOrchestrator;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub health_checker: HealthChecker,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/api/payments", post(payments::submit_payment))
        .route("/api/payments/fees", post(payments::calculate_fee))
        .route(
            "/api/payments/{idempotency_id}",
            get(payments::get_payment_status),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, (StatusCode, String)> {
    let health_status = state.health_checker.check_health().await;

    // Return 503 if any component is unhealthy
    if health_status.status == HealthState::Unhealthy {
        error!("Health check failed - service unhealthy");
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable".to_string(),
        ))
    } else {
        info!("Health check passed");
        Ok(Json(health_status))
    }
}

async fn liveness() -> &'static str {
    "OK"
}
