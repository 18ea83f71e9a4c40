//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health/ready - Readiness probe (event store reachable)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;

/// GET /health/live
///
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    if check_event_store(&state).await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health
///
/// Full health status with component details. A missing email key only
/// degrades the service; classification still works without it.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let events_ok = check_event_store(&state).await;
    let email_ok = state.config.email.is_enabled();

    let overall_status = match (events_ok, email_ok) {
        (true, true) => "healthy",
        (true, false) => "degraded",
        (false, _) => "unhealthy",
    };

    Json(HealthResponse {
        status: overall_status.to_string(),
        events: if events_ok { "ok" } else { "error" }.to_string(),
        email: if email_ok { "configured" } else { "disabled" }.to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn check_event_store(state: &AppState) -> bool {
    match state.events.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Event store health check failed");
            false
        }
    }
}
