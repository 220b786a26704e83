//! Weather provider client.
//!
//! Speaks the met.no `locationforecast/2.0/compact` schema. Only the fields
//! the dashboard uses are deserialized; everything else is ignored.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::ForecastPoint;
use crate::Config;

// ---

/// Source of forecast timeseries. One call is one forecast run.
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    /// Fetch the current forecast, stamping every point with `created_at`.
    async fn fetch(&self, created_at: DateTime<Utc>) -> Result<Vec<ForecastPoint>>;
}

#[derive(Debug, Deserialize)]
pub struct CompactResponse {
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Properties {
    #[serde(default)]
    timeseries: Vec<TimeStep>,
}

#[derive(Debug, Deserialize)]
struct TimeStep {
    time: DateTime<Utc>,
    data: StepData,
}

#[derive(Debug, Deserialize)]
struct StepData {
    instant: Instant,
    next_1_hours: Option<NextHours>,
}

#[derive(Debug, Deserialize)]
struct Instant {
    details: InstantDetails,
}

#[derive(Debug, Default, Deserialize)]
struct InstantDetails {
    air_temperature: Option<f64>,
    air_pressure_at_sea_level: Option<f64>,
    wind_speed: Option<f64>,
    relative_humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NextHours {
    summary: Option<NextSummary>,
    details: Option<NextDetails>,
}

#[derive(Debug, Deserialize)]
struct NextSummary {
    symbol_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NextDetails {
    precipitation_amount: Option<f64>,
}

impl CompactResponse {
    /// Convert to stored points for one location and run.
    ///
    /// Timesteps without temperature, pressure or wind are skipped; a missing
    /// one-hour precipitation amount counts as zero.
    pub fn into_points(self, lat: f64, lon: f64, created_at: DateTime<Utc>) -> Vec<ForecastPoint> {
        // ---
        self.properties
            .timeseries
            .into_iter()
            .filter_map(|step| {
                let d = step.data.instant.details;
                let (Some(temperature_c), Some(pressure_hpa), Some(wind_speed_mps)) =
                    (d.air_temperature, d.air_pressure_at_sea_level, d.wind_speed)
                else {
                    tracing::debug!("Skipping incomplete timestep at {}", step.time);
                    return None;
                };
                let next = step.data.next_1_hours;
                let precipitation_mm = next
                    .as_ref()
                    .and_then(|n| n.details.as_ref())
                    .and_then(|d| d.precipitation_amount)
                    .unwrap_or(0.0);
                let symbol_code = next.and_then(|n| n.summary).and_then(|s| s.symbol_code);

                Some(ForecastPoint {
                    timestamp: step.time,
                    location_lat: lat,
                    location_lon: lon,
                    precipitation_mm,
                    temperature_c,
                    pressure_hpa,
                    wind_speed_mps,
                    relative_humidity_percent: d.relative_humidity,
                    symbol_code,
                    forecast_created_at: created_at,
                })
            })
            .collect()
    }
}

/// HTTP client for the met.no locationforecast API.
#[derive(Debug, Clone)]
pub struct MetNoClient {
    http: reqwest::Client,
    url: String,
    lat: f64,
    lon: f64,
}

impl MetNoClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        // ---
        let http = reqwest::Client::builder()
            .user_agent(config.forecast_user_agent.as_str())
            .build()
            .context("build forecast HTTP client")?;

        Ok(Self {
            http,
            url: config.forecast_url.clone(),
            lat: config.forecast_lat,
            lon: config.forecast_lon,
        })
    }
}

#[async_trait]
impl ForecastProvider for MetNoClient {
    async fn fetch(&self, created_at: DateTime<Utc>) -> Result<Vec<ForecastPoint>> {
        // ---
        tracing::debug!("Fetching forecast from {} for {}, {}", self.url, self.lat, self.lon);

        let body: CompactResponse = self
            .http
            .get(&self.url)
            .query(&[("lat", self.lat), ("lon", self.lon)])
            .send()
            .await
            .context("forecast provider unreachable")?
            .error_for_status()
            .context("forecast provider returned an error status")?
            .json()
            .await
            .context("forecast provider returned malformed JSON")?;

        let points = body.into_points(self.lat, self.lon, created_at);
        tracing::info!("Forecast provider returned {} usable timesteps", points.len());
        Ok(points)
    }
}
