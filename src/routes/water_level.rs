//! Water level ingest, current value, 24-hour summary and bucketed history.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::aggregate::{aggregate_window, round_to, Bucket, Order, Page, Sample};
use crate::models::{Trend, WaterLevelPayload, WaterLevelReading};
use crate::timewindow::{resolve_range, Resolution};
use crate::{ApiError, ApiResult, AppState};

// ---

const DEFAULT_HISTORY_RANGE: &str = "30d";
const DEFAULT_HISTORY_LIMIT: usize = 1000;
const MAX_HISTORY_LIMIT: usize = 10_000;

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/water-level", post(ingest))
        .route("/water-level/current", get(current))
        .route("/water-level/latest", get(latest))
        .route("/water-level/history", get(history))
}

async fn ingest(
    State(state): State<AppState>,
    payload: Result<Json<WaterLevelPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<WaterLevelReading>)> {
    // ---
    let Json(payload) = payload?;
    let reading = payload.validate()?;

    let stored = state
        .store
        .insert_water_level(&reading)
        .await
        .map_err(ApiError::storage("Failed to save water level"))?;

    info!(
        "POST /water-level - stored {} cm ({}) at {}",
        stored.level_cm, stored.trend, stored.timestamp
    );
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn current(State(state): State<AppState>) -> ApiResult<Response> {
    // ---
    info!("GET /water-level/current");
    let latest = state
        .store
        .latest_water_level()
        .await
        .map_err(ApiError::storage("Database error"))?;

    Ok(match latest {
        Some(reading) => Json(reading).into_response(),
        None => Json(json!({ "message": "No water level data available" })).into_response(),
    })
}

/// Latest reading flattened together with statistics over the 24 hours
/// leading up to it.
#[derive(Debug, Serialize)]
struct LatestWithStats {
    id: i64,
    level_cm: f64,
    trend: Trend,
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    stats: DayStats,
}

#[derive(Debug, Default, PartialEq, Serialize)]
struct DayStats {
    reading_count: usize,
    min_level: Option<f64>,
    max_level: Option<f64>,
    avg_level: Option<f64>,
    /// Earliest time the minimum was observed.
    min_timestamp: Option<DateTime<Utc>>,
    /// Earliest time the maximum was observed.
    max_timestamp: Option<DateTime<Utc>>,
}

/// `rows` must be ascending by timestamp.
fn day_stats(rows: &[WaterLevelReading]) -> DayStats {
    // ---
    let Some(first) = rows.first() else {
        return DayStats::default();
    };

    let mut min = first;
    let mut max = first;
    let mut sum = 0.0;
    for row in rows {
        if row.level_cm < min.level_cm {
            min = row;
        }
        if row.level_cm > max.level_cm {
            max = row;
        }
        sum += row.level_cm;
    }

    DayStats {
        reading_count: rows.len(),
        min_level: Some(min.level_cm),
        max_level: Some(max.level_cm),
        avg_level: Some(round_to(sum / rows.len() as f64, 1)),
        min_timestamp: Some(min.timestamp),
        max_timestamp: Some(max.timestamp),
    }
}

async fn latest(State(state): State<AppState>) -> ApiResult<Json<LatestWithStats>> {
    // ---
    info!("GET /water-level/latest");
    let reading = state
        .store
        .latest_water_level()
        .await
        .map_err(ApiError::storage("Failed to fetch latest water level"))?
        .ok_or_else(|| ApiError::not_found("No water level data available"))?;

    let window = state
        .store
        .water_levels_between(reading.timestamp - Duration::hours(24), reading.timestamp)
        .await
        .map_err(ApiError::storage("Failed to fetch latest water level"))?;

    let stats = day_stats(&window);
    debug!("GET /water-level/latest - {} readings in last 24h", stats.reading_count);

    Ok(Json(LatestWithStats {
        id: reading.id,
        level_cm: reading.level_cm,
        trend: reading.trend,
        timestamp: reading.timestamp,
        stats,
    }))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    range: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    resolution: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    data: Vec<Bucket>,
    meta: HistoryMeta,
}

#[derive(Debug, Serialize)]
struct HistoryMeta {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    resolution: &'static str,
    min: Option<f64>,
    max: Option<f64>,
    avg: Option<f64>,
    /// Raw rows in the whole window.
    count: usize,
    /// Buckets in this page.
    returned: usize,
}

async fn history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<HistoryResponse>> {
    // ---
    let Query(query) = query?;
    info!("GET /water-level/history - {:?}", query);
    let range = resolve_range(
        query.range.as_deref(),
        query.start_date.as_deref(),
        query.end_date.as_deref(),
        DEFAULT_HISTORY_RANGE,
        Utc::now(),
    )?;
    let resolution = query
        .resolution
        .as_deref()
        .map(str::parse::<Resolution>)
        .transpose()?
        .unwrap_or(Resolution::Raw);
    let page = Page {
        limit: query
            .limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .min(MAX_HISTORY_LIMIT),
        offset: query.offset.unwrap_or(0),
    };

    let rows = state
        .store
        .water_levels_between(range.start, range.end)
        .await
        .map_err(ApiError::storage("Failed to fetch water level history"))?;
    let samples: Vec<Sample> = rows
        .iter()
        .map(|r| Sample {
            timestamp: r.timestamp,
            value: r.level_cm,
            trend: Some(r.trend),
        })
        .collect();

    let result = aggregate_window(&samples, &range, resolution, page, Order::Descending);
    let data: Vec<Bucket> = result
        .data
        .into_iter()
        .map(|b| Bucket {
            value: round_to(b.value, 0),
            ..b
        })
        .collect();

    debug!(
        "GET /water-level/history - {} rows, {} {} buckets returned",
        result.meta.count,
        data.len(),
        resolution
    );

    Ok(Json(HistoryResponse {
        meta: HistoryMeta {
            start: range.start,
            end: range.end,
            resolution: resolution.as_str(),
            min: result.meta.min.map(|v| round_to(v, 0)),
            max: result.meta.max.map(|v| round_to(v, 0)),
            avg: result.meta.avg.map(|v| round_to(v, 0)),
            count: result.meta.count,
            returned: data.len(),
        },
        data,
    }))
}
