//! Weather forecast refresh and views.
//!
//! `POST /forecast/fetch` pulls one run from the provider and upserts it;
//! the GET views read back whatever has been stored, deduplicated so each
//! timestep comes from its most recent run.

use axum::{
    extract::rejection::QueryRejection,
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::forecast::{
    block_label, blocks, dedupe_latest, plan_window, summarize, ForecastBlock, WeatherSummary,
    DEFAULT_RANGE, SUMMARY_HORIZON_HOURS,
};
use crate::models::ForecastPoint;
use crate::timewindow::{RangeToken, Resolution};
use crate::{ApiError, ApiResult, AppState};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/forecast", get(window))
        .route("/forecast/fetch", post(fetch))
        .route("/forecast/latest", get(latest))
        .route("/forecast/summary", get(summary))
}

#[derive(Debug, Serialize)]
struct FetchResponse {
    message: &'static str,
    points: usize,
    forecast_created_at: DateTime<Utc>,
}

async fn fetch(State(state): State<AppState>) -> ApiResult<Json<FetchResponse>> {
    // ---
    // stored as microseconds; keep the response equal to what lands in the table
    let created_at = Utc::now().trunc_subsecs(6);

    let points = state
        .forecast
        .fetch(created_at)
        .await
        .map_err(ApiError::upstream("Failed to fetch weather forecast"))?;

    let stored = state
        .store
        .upsert_forecast(&points)
        .await
        .map_err(ApiError::storage("Failed to store weather forecast"))?;

    info!("POST /forecast/fetch - upserted {} points for run {}", stored, created_at);
    Ok(Json(FetchResponse {
        message: "Weather forecast data updated successfully",
        points: stored,
        forecast_created_at: created_at,
    }))
}

#[derive(Debug, Deserialize)]
struct WindowQuery {
    range: Option<String>,
    resolution: Option<String>,
}

#[derive(Debug, Serialize)]
struct WindowResponse {
    meta: WindowMeta,
    data: Vec<ForecastBlock>,
}

#[derive(Debug, Serialize)]
struct WindowMeta {
    range: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    data_points: usize,
    forecast_created_at: Option<DateTime<Utc>>,
    time_block: &'static str,
    /// True when a long range was collapsed into six-hour blocks.
    normalized: bool,
}

async fn window(
    State(state): State<AppState>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> ApiResult<Json<WindowResponse>> {
    // ---
    let Query(query) = query?;
    info!("GET /forecast - {:?}", query);
    let raw_range = query.range.as_deref().unwrap_or(DEFAULT_RANGE);
    let token: RangeToken = raw_range.parse()?;
    let resolution = query
        .resolution
        .as_deref()
        .map(str::parse::<Resolution>)
        .transpose()?;
    let plan = plan_window(&token, resolution, Utc::now())?;

    let points = state
        .store
        .forecast_between(plan.range.start, plan.range.end)
        .await
        .map_err(ApiError::storage("Failed to fetch forecast"))?;
    let points = dedupe_latest(points);

    let data: Vec<ForecastBlock> = blocks(&points, plan.resolution)
        .into_iter()
        .map(ForecastBlock::rounded)
        .collect();
    debug!(
        "GET /forecast - {} points into {} blocks of {}",
        points.len(),
        data.len(),
        block_label(plan.resolution)
    );

    Ok(Json(WindowResponse {
        meta: WindowMeta {
            range: raw_range.to_string(),
            start_time: plan.range.start,
            end_time: plan.range.end,
            data_points: data.len(),
            forecast_created_at: points.iter().map(|p| p.forecast_created_at).max(),
            time_block: block_label(plan.resolution),
            normalized: plan.normalized,
        },
        data,
    }))
}

async fn latest(State(state): State<AppState>) -> ApiResult<Json<Vec<ForecastPoint>>> {
    // ---
    info!("GET /forecast/latest");
    let points = state
        .store
        .latest_forecast_run()
        .await
        .map_err(ApiError::storage("Failed to fetch latest forecast"))?;
    Ok(Json(points))
}

async fn summary(State(state): State<AppState>) -> ApiResult<Json<WeatherSummary>> {
    // ---
    info!("GET /forecast/summary");
    let now = Utc::now();
    let points = state
        .store
        .forecast_between(now, now + Duration::hours(SUMMARY_HORIZON_HOURS))
        .await
        .map_err(ApiError::storage("Failed to fetch weather summary"))?;

    Ok(Json(summarize(&dedupe_latest(points), now)))
}
