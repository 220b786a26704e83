//! Device command queue.
//!
//! Devices poll `GET /commands?device_id=` to claim work and report back on
//! `POST /commands/{id}/result`; operators enqueue with `POST /commands` and
//! inspect with `GET /commands/{id}`.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::models::{Command, CommandPayload, CommandResultPayload};
use crate::{ApiError, ApiResult, AppState};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/commands", get(claim).post(enqueue))
        .route("/commands/{id}", get(status))
        .route("/commands/{id}/result", post(report))
}

#[derive(Debug, Deserialize)]
struct ClaimQuery {
    device_id: Option<String>,
}

async fn claim(
    State(state): State<AppState>,
    query: Result<Query<ClaimQuery>, QueryRejection>,
) -> ApiResult<Response> {
    // ---
    let Query(query) = query?;
    info!("GET /commands - device {:?}", query.device_id);
    let device_id = query
        .device_id
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| ApiError::validation("device_id is required"))?;

    let claimed = state
        .store
        .claim_next_command(&device_id, state.config.command_claim_timeout)
        .await
        .map_err(ApiError::storage("Failed to fetch command"))?;

    Ok(match claimed {
        Some(command) => {
            info!("GET /commands - {} claimed {} ({})", device_id, command.id, command.command);
            Json(command).into_response()
        }
        None => Json(json!({ "message": "No pending commands" })).into_response(),
    })
}

async fn report(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CommandResultPayload>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    // ---
    let Path(id) = id?;
    let Json(payload) = payload?;
    let (status, result) = payload.validate()?;

    let found = state
        .store
        .report_command_result(id, status, result.as_deref())
        .await
        .map_err(ApiError::storage("Failed to update command result"))?;
    if !found {
        return Err(ApiError::not_found("Command not found"));
    }

    info!("POST /commands/{}/result - {}", id, status);
    Ok(Json(json!({ "message": "Command result updated" })))
}

async fn enqueue(
    State(state): State<AppState>,
    payload: Result<Json<CommandPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Command>)> {
    // ---
    let Json(payload) = payload?;
    let command = payload.validate()?;

    let created = state
        .store
        .enqueue_command(&command)
        .await
        .map_err(ApiError::storage("Failed to create command"))?;

    info!(
        "POST /commands - queued {} for {} as {}",
        created.command, created.device_id, created.id
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn status(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Command>> {
    // ---
    let Path(id) = id?;
    info!("GET /commands/{}", id);
    state
        .store
        .get_command(id)
        .await
        .map_err(ApiError::storage("Failed to fetch command status"))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Command not found"))
}
