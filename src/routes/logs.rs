//! Device log ingest, filtered listing and per-level statistics.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::models::{LogEntry, LogFilter, LogLevelStats, LogPayload};
use crate::{ApiError, ApiResult, AppState};

// ---

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/logs", get(list).post(ingest))
        .route("/logs/stats", get(stats))
}

async fn ingest(
    State(state): State<AppState>,
    payload: Result<Json<LogPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<LogEntry>)> {
    // ---
    let Json(payload) = payload?;
    let entry = payload.validate(Utc::now())?;

    let stored = state
        .store
        .insert_log(&entry)
        .await
        .map_err(ApiError::storage("Failed to save log"))?;

    info!("POST /logs - [{}] from {}", stored.level, stored.source);
    Ok((StatusCode::CREATED, Json(stored)))
}

/// Paging values arrive as raw strings so that junk falls back to defaults
/// instead of rejecting the request.
#[derive(Debug, Deserialize)]
struct LogsQuery {
    level: Option<String>,
    source: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

fn lenient(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n >= 0)
        .unwrap_or(default)
}

impl LogsQuery {
    fn into_filter(self) -> LogFilter {
        // ---
        let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        LogFilter {
            limit: lenient(self.limit.as_deref(), DEFAULT_LIMIT).min(MAX_LIMIT),
            offset: lenient(self.offset.as_deref(), 0),
            level: non_blank(self.level),
            source: non_blank(self.source),
        }
    }
}

async fn list(
    State(state): State<AppState>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    // ---
    let Query(query) = query?;
    let filter = query.into_filter();
    info!("GET /logs - {:?}", filter);

    let entries = state
        .store
        .query_logs(&filter)
        .await
        .map_err(ApiError::storage("Failed to fetch logs"))?;
    Ok(Json(entries))
}

async fn stats(State(state): State<AppState>) -> ApiResult<Json<Vec<LogLevelStats>>> {
    // ---
    info!("GET /logs/stats");
    let stats = state
        .store
        .log_stats()
        .await
        .map_err(ApiError::storage("Failed to fetch log statistics"))?;
    Ok(Json(stats))
}
