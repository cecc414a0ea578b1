//! Health check endpoint for load balancers, monitoring, and Docker health checks.

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;
use std::time::Instant;
use tandem_signaling::{CoordinatorStats, SignalingServer};

#[derive(Clone)]
struct HealthState {
    signaling: SignalingServer,
    started: Instant,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
    #[serde(flatten)]
    signaling: Option<CoordinatorStats>,
}

/// Health check router.
pub fn router(signaling: SignalingServer) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(HealthState {
            signaling,
            started: Instant::now(),
        })
}

async fn health_check(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    // A coordinator that cannot answer means signaling is down.
    let stats = state.signaling.stats().await.ok();
    let (code, status) = match stats {
        Some(_) => (StatusCode::OK, "healthy"),
        None => (StatusCode::SERVICE_UNAVAILABLE, "degraded"),
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: state.started.elapsed().as_secs(),
            signaling: stats,
        }),
    )
}
