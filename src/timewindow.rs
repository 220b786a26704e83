//! Time-window helpers shared by the history and forecast views.
//!
//! - relative range tokens (`"7d"`, `"48h"`, `"90m"`)
//! - explicit `start_date` / `end_date` pairs
//! - bucket resolutions and the truncation of a timestamp to its bucket start

use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Timelike, Utc};
use thiserror::Error;

use crate::error::ApiError;

// ---

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("Invalid range format '{0}'. Use a number followed by d, h or m (e.g. \"7d\", \"48h\")")]
    InvalidRange(String),

    #[error("Range unit '{0}' is not supported here")]
    UnsupportedUnit(char),

    #[error("start_date and end_date must be provided together")]
    IncompleteBounds,

    #[error("Invalid {field}: expected an RFC 3339 timestamp")]
    InvalidDate { field: &'static str },

    #[error("start_date must not be after end_date")]
    InvertedBounds,

    #[error("Invalid resolution '{0}'. Use raw, 5min, 15min, hourly, 6h or daily")]
    InvalidResolution(String),
}

impl From<WindowError> for ApiError {
    fn from(err: WindowError) -> Self {
        ApiError::validation(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeUnit {
    Days,
    Hours,
    Minutes,
}

impl RangeUnit {
    pub fn suffix(self) -> char {
        match self {
            RangeUnit::Days => 'd',
            RangeUnit::Hours => 'h',
            RangeUnit::Minutes => 'm',
        }
    }
}

/// A parsed `^(\d+)([dhm])$` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeToken {
    pub amount: i64,
    pub unit: RangeUnit,
    duration: Duration,
}

impl RangeToken {
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// `now - duration`, rejecting tokens that leave chrono's date range.
    pub fn before(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, WindowError> {
        now.checked_sub_signed(self.duration)
            .ok_or_else(|| self.out_of_range())
    }

    /// `now + duration`, rejecting tokens that leave chrono's date range.
    pub fn after(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, WindowError> {
        now.checked_add_signed(self.duration)
            .ok_or_else(|| self.out_of_range())
    }

    fn out_of_range(&self) -> WindowError {
        WindowError::InvalidRange(format!("{}{}", self.amount, self.unit.suffix()))
    }
}

impl FromStr for RangeToken {
    type Err = WindowError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        // ---
        let invalid = || WindowError::InvalidRange(token.to_string());

        let mut chars = token.chars();
        let unit = match chars.next_back() {
            Some('d') => RangeUnit::Days,
            Some('h') => RangeUnit::Hours,
            Some('m') => RangeUnit::Minutes,
            _ => return Err(invalid()),
        };
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let amount: i64 = digits.parse().map_err(|_| invalid())?;
        let duration = match unit {
            RangeUnit::Days => Duration::try_days(amount),
            RangeUnit::Hours => Duration::try_hours(amount),
            RangeUnit::Minutes => Duration::try_minutes(amount),
        }
        .ok_or_else(invalid)?;

        Ok(RangeToken {
            amount,
            unit,
            duration,
        })
    }
}

/// Closed interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }
}

fn parse_date(raw: &str, field: &'static str) -> Result<DateTime<Utc>, WindowError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| WindowError::InvalidDate { field })
}

/// Resolve the queried window for a history view.
///
/// An explicit `start_date`/`end_date` pair wins over `range`; with neither,
/// `default_range` is applied backwards from `now`.
pub fn resolve_range(
    range: Option<&str>,
    start_date: Option<&str>,
    end_date: Option<&str>,
    default_range: &str,
    now: DateTime<Utc>,
) -> Result<TimeRange, WindowError> {
    // ---
    // a malformed token is rejected even when explicit bounds override it
    let token: Option<RangeToken> = range.map(str::parse).transpose()?;

    match (start_date, end_date) {
        (Some(start), Some(end)) => {
            let start = parse_date(start, "start_date")?;
            let end = parse_date(end, "end_date")?;
            if start > end {
                return Err(WindowError::InvertedBounds);
            }
            Ok(TimeRange { start, end })
        }
        (Some(_), None) | (None, Some(_)) => Err(WindowError::IncompleteBounds),
        (None, None) => {
            let token = match token {
                Some(token) => token,
                None => default_range.parse()?,
            };
            Ok(TimeRange {
                start: token.before(now)?,
                end: now,
            })
        }
    }
}

/// Bucket width used for aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Raw,
    FiveMinutes,
    FifteenMinutes,
    Hourly,
    SixHourly,
    Daily,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Raw => "raw",
            Resolution::FiveMinutes => "5min",
            Resolution::FifteenMinutes => "15min",
            Resolution::Hourly => "hourly",
            Resolution::SixHourly => "6h",
            Resolution::Daily => "daily",
        }
    }

    /// Width of one bucket, `None` for raw rows.
    pub fn width(&self) -> Option<Duration> {
        match self {
            Resolution::Raw => None,
            Resolution::FiveMinutes => Some(Duration::minutes(5)),
            Resolution::FifteenMinutes => Some(Duration::minutes(15)),
            Resolution::Hourly => Some(Duration::hours(1)),
            Resolution::SixHourly => Some(Duration::hours(6)),
            Resolution::Daily => Some(Duration::days(1)),
        }
    }

    /// Truncate `t` to the start of the bucket that contains it.
    ///
    /// Minute resolutions snap to `floor(minute / width) * width` within the
    /// hour; hourly, six-hourly and daily snap to the calendar unit in UTC.
    pub fn bucket_start(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        // ---
        let (hour, minute) = match self {
            Resolution::Raw => return t,
            Resolution::FiveMinutes => (t.hour(), t.minute() / 5 * 5),
            Resolution::FifteenMinutes => (t.hour(), t.minute() / 15 * 15),
            Resolution::Hourly => (t.hour(), 0),
            Resolution::SixHourly => (t.hour() / 6 * 6, 0),
            Resolution::Daily => (0, 0),
        };
        t.date_naive()
            .and_hms_opt(hour, minute, 0)
            .map(|naive| naive.and_utc())
            // hour < 24 and minute < 60 always hold here
            .unwrap_or(t)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(Resolution::Raw),
            "5min" => Ok(Resolution::FiveMinutes),
            "15min" => Ok(Resolution::FifteenMinutes),
            "hourly" | "1h" => Ok(Resolution::Hourly),
            "6h" => Ok(Resolution::SixHourly),
            "daily" | "1d" => Ok(Resolution::Daily),
            other => Err(WindowError::InvalidResolution(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, h, m, s).unwrap()
    }

    #[test]
    fn test_range_token_units() {
        // ---
        let t: RangeToken = "7d".parse().unwrap();
        assert_eq!(t.unit, RangeUnit::Days);
        assert_eq!(t.duration(), Duration::days(7));
        assert_eq!("48h".parse::<RangeToken>().unwrap().duration(), Duration::hours(48));
        assert_eq!("90m".parse::<RangeToken>().unwrap().duration(), Duration::minutes(90));
    }

    #[test]
    fn test_range_token_rejects_malformed() {
        // ---
        for bad in ["abc", "7x", "", "d", "-1d", "1.5h", " 7d", "7dd", "99999999999999999999d"] {
            assert_eq!(
                bad.parse::<RangeToken>(),
                Err(WindowError::InvalidRange(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_resolve_range_prefers_explicit_bounds() {
        // ---
        let now = at(12, 0, 0);
        let r = resolve_range(
            Some("7d"),
            Some("2025-03-26T01:00:00Z"),
            Some("2025-03-26T02:00:00Z"),
            "30d",
            now,
        )
        .unwrap();
        assert_eq!(r.start, at(1, 0, 0));
        assert_eq!(r.end, at(2, 0, 0));

        let r = resolve_range(None, None, None, "6h", now).unwrap();
        assert_eq!(r.start, at(6, 0, 0));
        assert_eq!(r.end, now);
    }

    #[test]
    fn test_resolve_range_errors() {
        // ---
        let now = at(12, 0, 0);
        assert_eq!(
            resolve_range(None, Some("2025-03-26T01:00:00Z"), None, "1d", now),
            Err(WindowError::IncompleteBounds)
        );
        assert_eq!(
            resolve_range(None, Some("yesterday"), Some("2025-03-26T01:00:00Z"), "1d", now),
            Err(WindowError::InvalidDate { field: "start_date" })
        );
        assert_eq!(
            resolve_range(None, Some("2025-03-26T03:00:00Z"), Some("2025-03-26T01:00:00Z"), "1d", now),
            Err(WindowError::InvertedBounds)
        );
        assert!(resolve_range(Some("7x"), None, None, "1d", now).is_err());
    }

    #[test]
    fn test_huge_range_is_rejected_not_overflowed() {
        // ---
        let now = at(12, 0, 0);
        assert_eq!(
            resolve_range(Some("100000000d"), None, None, "1d", now),
            Err(WindowError::InvalidRange("100000000d".into()))
        );

        let token: RangeToken = "100000000d".parse().unwrap();
        assert!(token.after(now).is_err());
        assert_eq!("2h".parse::<RangeToken>().unwrap().after(now), Ok(at(14, 0, 0)));
    }

    #[test]
    fn test_bucket_start_minute_resolutions() {
        // ---
        let t = at(10, 37, 42);
        assert_eq!(Resolution::FiveMinutes.bucket_start(t), at(10, 35, 0));
        assert_eq!(Resolution::FifteenMinutes.bucket_start(t), at(10, 30, 0));
        assert_eq!(Resolution::Raw.bucket_start(t), t);
    }

    #[test]
    fn test_bucket_start_calendar_resolutions() {
        // ---
        let t = at(17, 59, 59);
        assert_eq!(Resolution::Hourly.bucket_start(t), at(17, 0, 0));
        assert_eq!(Resolution::Hourly.bucket_start(at(17, 0, 0)), at(17, 0, 0));
        assert_eq!(Resolution::SixHourly.bucket_start(t), at(12, 0, 0));
        assert_eq!(Resolution::Daily.bucket_start(t), at(0, 0, 0));
    }

    #[test]
    fn test_resolution_names_round_trip() {
        // ---
        for r in [
            Resolution::Raw,
            Resolution::FiveMinutes,
            Resolution::FifteenMinutes,
            Resolution::Hourly,
            Resolution::SixHourly,
            Resolution::Daily,
        ] {
            assert_eq!(r.as_str().parse::<Resolution>().unwrap(), r);
        }
        assert!("weekly".parse::<Resolution>().is_err());
    }
}
