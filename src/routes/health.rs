// src/routes/health.rs
//! Liveness endpoints.
//!
//! Used by container orchestrators and uptime probes to verify that the
//! service is running and able to respond to HTTP requests. Both routes sit
//! outside the API key check. Exports to the gateway (`mod.rs`): a subrouter
//! containing `/` and `/health`.

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Handle `GET /`.
async fn root() -> &'static str {
    "River monitor API is running"
}

/// Handle `GET /health`.
///
/// Deliberately lightweight: does not touch the database or the forecast
/// provider.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Create a subrouter containing the liveness routes.
///
/// Generic over the application state so it merges cleanly with the gateway
/// router.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
}
