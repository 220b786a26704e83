//! Forecast views built on top of stored provider runs.
//!
//! Every view starts from [`dedupe_latest`]: when several runs cover the same
//! timestamp only the most recently created point is used. Windowed views
//! then bucket the points the same way the water-level history does.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::aggregate::{derive_trends, group_by_bucket, mean, round_to};
use crate::models::{ForecastPoint, Trend};
use crate::timewindow::{RangeToken, RangeUnit, Resolution, TimeRange, WindowError};

mod provider;

pub use provider::{CompactResponse, ForecastProvider, MetNoClient};

// ---

pub const DEFAULT_RANGE: &str = "48h";

/// Ranges longer than this are shown in six-hour blocks.
pub const HOURLY_LIMIT_HOURS: i64 = 48;

pub const SUMMARY_HORIZON_HOURS: i64 = 72;
pub const SUMMARY_DAYS: usize = 3;

/// Keep one point per timestamp: the one from the most recent run. Ascending.
pub fn dedupe_latest(points: impl IntoIterator<Item = ForecastPoint>) -> Vec<ForecastPoint> {
    // ---
    let mut latest: BTreeMap<DateTime<Utc>, ForecastPoint> = BTreeMap::new();
    for p in points {
        let newer = latest
            .get(&p.timestamp)
            .map_or(true, |kept| p.forecast_created_at > kept.forecast_created_at);
        if newer {
            latest.insert(p.timestamp, p);
        }
    }
    latest.into_values().collect()
}

/// Resolved parameters of a forecast window query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    pub range: TimeRange,
    pub resolution: Resolution,
    pub normalized: bool,
}

/// Look `token` ahead of `now`, starting one hour back so the current hour
/// is included.
pub fn plan_window(
    token: &RangeToken,
    resolution: Option<Resolution>,
    now: DateTime<Utc>,
) -> Result<WindowPlan, WindowError> {
    // ---
    if token.unit == RangeUnit::Minutes {
        return Err(WindowError::UnsupportedUnit(token.unit.suffix()));
    }
    let normalized = token.duration() > Duration::hours(HOURLY_LIMIT_HOURS);
    let resolution = resolution.unwrap_or(if normalized {
        Resolution::SixHourly
    } else {
        Resolution::Hourly
    });

    Ok(WindowPlan {
        range: TimeRange {
            start: now - Duration::hours(1),
            end: token.after(now)?,
        },
        resolution,
        normalized,
    })
}

pub fn block_label(resolution: Resolution) -> &'static str {
    match resolution {
        Resolution::Raw => "raw",
        Resolution::FiveMinutes => "5 minutes",
        Resolution::FifteenMinutes => "15 minutes",
        Resolution::Hourly => "1 hour",
        Resolution::SixHourly => "6 hours",
        Resolution::Daily => "1 day",
    }
}

/// One bucket of forecast points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastBlock {
    pub timestamp: DateTime<Utc>,
    pub location_lat: f64,
    pub location_lon: f64,
    /// Sum over the block.
    pub precipitation_mm: f64,
    pub temperature_c: f64,
    pub pressure_hpa: f64,
    pub wind_speed_mps: f64,
    pub relative_humidity_percent: Option<f64>,
    /// Symbol of the first timestep in the block.
    pub symbol_code: Option<String>,
    pub temperature_trend: Trend,
    pub forecast_created_at: DateTime<Utc>,
}

impl ForecastBlock {
    /// One decimal for every measured quantity.
    pub fn rounded(self) -> Self {
        Self {
            precipitation_mm: round_to(self.precipitation_mm, 1),
            temperature_c: round_to(self.temperature_c, 1),
            pressure_hpa: round_to(self.pressure_hpa, 1),
            wind_speed_mps: round_to(self.wind_speed_mps, 1),
            relative_humidity_percent: self.relative_humidity_percent.map(|h| round_to(h, 1)),
            ..self
        }
    }
}

/// Bucket deduplicated points, ascending.
pub fn blocks(points: &[ForecastPoint], resolution: Resolution) -> Vec<ForecastBlock> {
    // ---
    let groups = group_by_bucket(points.iter(), resolution, |p| p.timestamp);
    let temperatures: Vec<f64> = groups
        .iter()
        .map(|(_, g)| mean(g.iter().map(|p| p.temperature_c)).unwrap_or_default())
        .collect();
    let trends = derive_trends(&temperatures);

    groups
        .into_iter()
        .zip(temperatures)
        .zip(trends)
        .filter_map(|(((start, group), temperature_c), temperature_trend)| {
            let first = *group.first()?;
            Some(ForecastBlock {
                timestamp: start,
                location_lat: first.location_lat,
                location_lon: first.location_lon,
                precipitation_mm: group.iter().map(|p| p.precipitation_mm).sum(),
                temperature_c,
                pressure_hpa: mean(group.iter().map(|p| p.pressure_hpa)).unwrap_or_default(),
                wind_speed_mps: mean(group.iter().map(|p| p.wind_speed_mps)).unwrap_or_default(),
                relative_humidity_percent: mean(
                    group.iter().filter_map(|p| p.relative_humidity_percent),
                ),
                symbol_code: first.symbol_code.clone(),
                temperature_trend,
                forecast_created_at: group
                    .iter()
                    .map(|p| p.forecast_created_at)
                    .max()
                    .unwrap_or(first.forecast_created_at),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentConditions {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub wind: f64,
    pub rain: f64,
    pub pressure: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyOutlook {
    pub day: String,
    pub date: NaiveDate,
    pub max: f64,
    pub min: f64,
    pub rain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSummary {
    pub current: Option<CurrentConditions>,
    pub forecast: Vec<DailyOutlook>,
}

/// Current conditions plus a short daily outlook.
///
/// `points` must already be deduplicated. Days are UTC calendar days within
/// `[now, now + 72h]`, labelled `Today`, `Tomorrow`, then by weekday name.
pub fn summarize(points: &[ForecastPoint], now: DateTime<Utc>) -> WeatherSummary {
    // ---
    let horizon = now + Duration::hours(SUMMARY_HORIZON_HOURS);
    let upcoming: Vec<&ForecastPoint> = points
        .iter()
        .filter(|p| now <= p.timestamp && p.timestamp <= horizon)
        .collect();

    let current = upcoming
        .iter()
        .min_by_key(|p| p.timestamp)
        .map(|p| CurrentConditions {
            timestamp: p.timestamp,
            temperature: round_to(p.temperature_c, 0),
            wind: round_to(p.wind_speed_mps, 0),
            rain: round_to(p.precipitation_mm, 1),
            pressure: round_to(p.pressure_hpa, 0),
        });

    let mut by_day: BTreeMap<NaiveDate, Vec<&ForecastPoint>> = BTreeMap::new();
    for p in &upcoming {
        by_day.entry(p.timestamp.date_naive()).or_default().push(*p);
    }

    let forecast = by_day
        .into_iter()
        .take(SUMMARY_DAYS)
        .enumerate()
        .map(|(index, (date, day_points))| {
            let temps = day_points.iter().map(|p| p.temperature_c);
            let max = temps.clone().fold(f64::NEG_INFINITY, f64::max);
            let min = temps.fold(f64::INFINITY, f64::min);
            let day = match index {
                0 => "Today".to_string(),
                1 => "Tomorrow".to_string(),
                _ => date.format("%A").to_string(),
            };
            DailyOutlook {
                day,
                date,
                max: round_to(max, 0),
                min: round_to(min, 0),
                rain: round_to(day_points.iter().map(|p| p.precipitation_mm).sum(), 1),
            }
        })
        .collect();

    WeatherSummary { current, forecast }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn run(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, hour, 0, 0).unwrap()
    }

    fn point(ts: DateTime<Utc>, temp: f64, precip: f64, created: DateTime<Utc>) -> ForecastPoint {
        ForecastPoint {
            timestamp: ts,
            location_lat: 52.0,
            location_lon: -1.4,
            precipitation_mm: precip,
            temperature_c: temp,
            pressure_hpa: 1010.0,
            wind_speed_mps: 3.0,
            relative_humidity_percent: Some(80.0),
            symbol_code: Some("cloudy".into()),
            forecast_created_at: created,
        }
    }

    #[test]
    fn test_dedupe_keeps_latest_run_per_timestamp() {
        // ---
        let ts = run(12);
        let points = vec![
            point(ts, 5.0, 0.0, run(6)),
            point(ts, 7.0, 0.0, run(9)),
            point(ts, 6.0, 0.0, run(8)),
            point(run(13), 4.0, 0.0, run(6)),
        ];
        let deduped = dedupe_latest(points);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].temperature_c, 7.0);
        assert_eq!(deduped[1].timestamp, run(13));
    }

    #[test]
    fn test_plan_window_switches_to_six_hour_blocks() {
        // ---
        let now = run(10);
        let plan = plan_window(&"48h".parse().unwrap(), None, now).unwrap();
        assert_eq!(plan.resolution, Resolution::Hourly);
        assert!(!plan.normalized);
        assert_eq!(plan.range.start, run(9));
        assert_eq!(plan.range.end, now + Duration::hours(48));

        let plan = plan_window(&"7d".parse().unwrap(), None, now).unwrap();
        assert_eq!(plan.resolution, Resolution::SixHourly);
        assert!(plan.normalized);

        let plan = plan_window(&"7d".parse().unwrap(), Some(Resolution::Daily), now).unwrap();
        assert_eq!(plan.resolution, Resolution::Daily);

        assert_eq!(
            plan_window(&"90m".parse().unwrap(), None, now),
            Err(WindowError::UnsupportedUnit('m'))
        );
        assert_eq!(
            plan_window(&"100000000d".parse().unwrap(), None, now),
            Err(WindowError::InvalidRange("100000000d".into()))
        );
    }

    #[test]
    fn test_blocks_sum_precipitation_and_average_the_rest() {
        // ---
        let created = run(0);
        let points = vec![
            point(run(0), 4.0, 0.5, created),
            point(run(3), 6.0, 1.25, created),
            point(run(6), 2.0, 0.0, created),
        ];
        let out: Vec<ForecastBlock> = blocks(&points, Resolution::SixHourly)
            .into_iter()
            .map(ForecastBlock::rounded)
            .collect();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].timestamp, run(0));
        assert_eq!(out[0].precipitation_mm, 1.8);
        assert_eq!(out[0].temperature_c, 5.0);
        assert_eq!(out[0].temperature_trend, Trend::Stable);
        assert_eq!(out[1].timestamp, run(6));
        assert_eq!(out[1].temperature_trend, Trend::Falling);
    }

    #[test]
    fn test_summary_labels_days_and_picks_current() {
        // ---
        let now = Utc.with_ymd_and_hms(2025, 3, 26, 22, 30, 0).unwrap();
        let created = run(0);
        let points = vec![
            point(now - Duration::hours(1), 99.0, 0.0, created),
            point(Utc.with_ymd_and_hms(2025, 3, 26, 23, 0, 0).unwrap(), 8.4, 0.26, created),
            point(Utc.with_ymd_and_hms(2025, 3, 27, 6, 0, 0).unwrap(), 3.0, 1.0, created),
            point(Utc.with_ymd_and_hms(2025, 3, 27, 15, 0, 0).unwrap(), 12.6, 0.5, created),
            point(Utc.with_ymd_and_hms(2025, 3, 28, 12, 0, 0).unwrap(), 10.0, 0.0, created),
            point(Utc.with_ymd_and_hms(2025, 3, 29, 12, 0, 0).unwrap(), 11.0, 0.0, created),
        ];
        let summary = summarize(&points, now);

        let current = summary.current.unwrap();
        assert_eq!(current.temperature, 8.0);
        assert_eq!(current.rain, 0.3);

        let days: Vec<&str> = summary.forecast.iter().map(|d| d.day.as_str()).collect();
        assert_eq!(days, vec!["Today", "Tomorrow", "Friday"]);
        assert_eq!(summary.forecast[1].max, 13.0);
        assert_eq!(summary.forecast[1].min, 3.0);
        assert_eq!(summary.forecast[1].rain, 1.5);
    }

    #[test]
    fn test_summary_without_points() {
        // ---
        let summary = summarize(&[], run(0));
        assert!(summary.current.is_none());
        assert!(summary.forecast.is_empty());
    }
}
