//! Device health ingest and the freshness-classified current status.

use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::freshness::classify;
use crate::models::{DeviceStatus, DeviceStatusPayload};
use crate::{ApiError, ApiResult, AppState};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/device-status", get(current).post(ingest))
}

async fn ingest(
    State(state): State<AppState>,
    payload: Result<Json<DeviceStatusPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<DeviceStatus>)> {
    // ---
    let Json(payload) = payload?;
    let status = payload.validate()?;

    let stored = state
        .store
        .insert_device_status(&status)
        .await
        .map_err(ApiError::storage("Failed to save device status"))?;

    info!("POST /device-status - '{}' at {}", stored.status, stored.timestamp);
    Ok((StatusCode::CREATED, Json(stored)))
}

/// Latest sample, reported offline when it is stale.
async fn current(State(state): State<AppState>) -> ApiResult<Response> {
    // ---
    info!("GET /device-status");
    let latest = state
        .store
        .latest_device_status()
        .await
        .map_err(ApiError::storage("Database error"))?;

    let Some(latest) = latest else {
        return Ok(Json(json!({ "message": "No device status data available" })).into_response());
    };

    let classified = classify(latest, Utc::now());
    if let Some(last_seen) = classified.last_seen {
        warn!("GET /device-status - device offline, last seen {}", last_seen);
    }
    Ok(Json(classified).into_response())
}
