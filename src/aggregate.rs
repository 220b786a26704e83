//! Time-bucketed aggregation of raw samples.
//!
//! Raw rows are grouped into fixed-width buckets (see
//! [`Resolution::bucket_start`]), each bucket is averaged, and a trend label
//! is derived by comparing a bucket with the one before it in ascending time
//! order. Range metadata always covers every raw row in the window, not just
//! the returned page.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::Trend;
use crate::timewindow::{Resolution, TimeRange};

// ---

/// One raw observation of a single metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    /// Trend recorded at ingest time, only used for `raw` resolution.
    pub trend: Option<Trend>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RangeMeta {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub data: Vec<Bucket>,
    pub meta: RangeMeta,
}

/// Group items by bucket start, ascending.
///
/// For [`Resolution::Raw`] every item forms its own group, so rows sharing a
/// timestamp are kept apart.
pub fn group_by_bucket<T>(
    items: impl IntoIterator<Item = T>,
    resolution: Resolution,
    timestamp_of: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<(DateTime<Utc>, Vec<T>)> {
    // ---
    if resolution == Resolution::Raw {
        let mut rows: Vec<(DateTime<Utc>, Vec<T>)> = items
            .into_iter()
            .map(|item| (timestamp_of(&item), vec![item]))
            .collect();
        rows.sort_by_key(|(t, _)| *t);
        return rows;
    }

    let mut buckets: BTreeMap<DateTime<Utc>, Vec<T>> = BTreeMap::new();
    for item in items {
        let start = resolution.bucket_start(timestamp_of(&item));
        buckets.entry(start).or_default().push(item);
    }
    buckets.into_iter().collect()
}

/// Trend of each value relative to its predecessor; the first is `Stable`.
pub fn derive_trends(values: &[f64]) -> Vec<Trend> {
    // ---
    let mut trends = Vec::with_capacity(values.len());
    let mut previous: Option<f64> = None;
    for &value in values {
        let trend = match previous {
            Some(prev) if value > prev => Trend::Rising,
            Some(prev) if value < prev => Trend::Falling,
            _ => Trend::Stable,
        };
        trends.push(trend);
        previous = Some(value);
    }
    trends
}

pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Bucket `samples` and derive trends, ascending by bucket start.
pub fn aggregate(samples: &[Sample], resolution: Resolution) -> Vec<Bucket> {
    // ---
    let groups = group_by_bucket(samples.iter(), resolution, |s| s.timestamp);
    let values: Vec<f64> = groups
        .iter()
        .map(|(_, members)| mean(members.iter().map(|s| s.value)).unwrap_or_default())
        .collect();
    let derived = derive_trends(&values);

    groups
        .into_iter()
        .zip(values)
        .zip(derived)
        .map(|(((timestamp, members), value), derived)| {
            let trend = match resolution {
                Resolution::Raw => members.first().and_then(|s| s.trend).unwrap_or(derived),
                _ => derived,
            };
            Bucket {
                timestamp,
                value,
                trend,
            }
        })
        .collect()
}

/// Min, max, average and count over every sample.
pub fn range_meta(samples: &[Sample]) -> RangeMeta {
    // ---
    if samples.is_empty() {
        return RangeMeta::default();
    }
    let min = samples.iter().map(|s| s.value).fold(f64::INFINITY, f64::min);
    let max = samples.iter().map(|s| s.value).fold(f64::NEG_INFINITY, f64::max);

    RangeMeta {
        min: Some(min),
        max: Some(max),
        avg: mean(samples.iter().map(|s| s.value)),
        count: samples.len(),
    }
}

/// Full pipeline: window filter, metadata, bucketing, ordering, paging.
pub fn aggregate_window(
    samples: &[Sample],
    range: &TimeRange,
    resolution: Resolution,
    page: Page,
    order: Order,
) -> Aggregation {
    // ---
    let in_range: Vec<Sample> = samples
        .iter()
        .filter(|s| range.contains(s.timestamp))
        .cloned()
        .collect();
    let meta = range_meta(&in_range);

    let mut buckets = aggregate(&in_range, resolution);
    if order == Order::Descending {
        buckets.reverse();
    }
    let data = buckets
        .into_iter()
        .skip(page.offset)
        .take(page.limit)
        .collect();

    Aggregation { data, meta }
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, h, m, s).unwrap()
    }

    fn sample(t: DateTime<Utc>, value: f64) -> Sample {
        Sample {
            timestamp: t,
            value,
            trend: None,
        }
    }

    fn whole_day() -> TimeRange {
        TimeRange {
            start: at(0, 0, 0),
            end: at(23, 59, 59),
        }
    }

    #[test]
    fn test_derive_trends_against_previous_bucket() {
        // ---
        assert_eq!(
            derive_trends(&[10.0, 12.0, 12.0, 9.0]),
            vec![Trend::Stable, Trend::Rising, Trend::Stable, Trend::Falling]
        );
        assert!(derive_trends(&[]).is_empty());
    }

    #[test]
    fn test_hourly_buckets_cover_whole_hour() {
        // ---
        let samples = vec![
            sample(at(9, 0, 0), 10.0),
            sample(at(9, 59, 59), 20.0),
            sample(at(10, 0, 0), 40.0),
        ];
        let buckets = aggregate(&samples, Resolution::Hourly);

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].timestamp, at(9, 0, 0));
        assert_eq!(buckets[0].value, 15.0);
        assert_eq!(buckets[0].trend, Trend::Stable);
        assert_eq!(buckets[1].timestamp, at(10, 0, 0));
        assert_eq!(buckets[1].trend, Trend::Rising);

        // same input, same answer
        assert_eq!(aggregate(&samples, Resolution::Hourly), buckets);
    }

    #[test]
    fn test_bucketing_ignores_input_order() {
        // ---
        let ordered = vec![
            sample(at(1, 2, 0), 1.0),
            sample(at(1, 7, 0), 2.0),
            sample(at(1, 14, 0), 3.0),
        ];
        let mut shuffled = ordered.clone();
        shuffled.reverse();

        let a = aggregate(&ordered, Resolution::FiveMinutes);
        let b = aggregate(&shuffled, Resolution::FiveMinutes);
        assert_eq!(a, b);
        assert_eq!(
            a.iter().map(|b| b.timestamp).collect::<Vec<_>>(),
            vec![at(1, 0, 0), at(1, 5, 0), at(1, 10, 0)]
        );
    }

    #[test]
    fn test_raw_keeps_stored_trend_and_duplicates() {
        // ---
        let t = at(5, 0, 0);
        let samples = vec![
            Sample {
                timestamp: t,
                value: 100.0,
                trend: Some(Trend::Falling),
            },
            Sample {
                timestamp: t,
                value: 110.0,
                trend: Some(Trend::Falling),
            },
        ];
        let buckets = aggregate(&samples, Resolution::Raw);
        assert_eq!(buckets.len(), 2);
        assert!(buckets.iter().all(|b| b.trend == Trend::Falling));
    }

    #[test]
    fn test_meta_summarizes_full_range_not_page() {
        // ---
        let samples: Vec<Sample> = (0..10)
            .map(|i| sample(at(0, 0, 0) + Duration::hours(i), i as f64))
            .collect();
        let page = Page {
            limit: 2,
            offset: 1,
        };
        let agg = aggregate_window(&samples, &whole_day(), Resolution::Hourly, page, Order::Descending);

        assert_eq!(agg.data.len(), 2);
        assert_eq!(agg.data[0].timestamp, at(8, 0, 0));
        assert_eq!(agg.data[1].timestamp, at(7, 0, 0));
        assert_eq!(agg.meta.count, 10);
        assert_eq!(agg.meta.min, Some(0.0));
        assert_eq!(agg.meta.max, Some(9.0));
        assert_eq!(agg.meta.avg, Some(4.5));
    }

    #[test]
    fn test_window_excludes_outside_samples() {
        // ---
        let samples = vec![sample(at(1, 0, 0), 5.0), sample(at(3, 0, 0), 7.0)];
        let range = TimeRange {
            start: at(2, 0, 0),
            end: at(4, 0, 0),
        };
        let page = Page {
            limit: 100,
            offset: 0,
        };
        let agg = aggregate_window(&samples, &range, Resolution::Raw, page, Order::Ascending);
        assert_eq!(agg.meta.count, 1);
        assert_eq!(agg.data.len(), 1);
        assert_eq!(agg.data[0].value, 7.0);
    }

    #[test]
    fn test_empty_window_has_empty_meta() {
        // ---
        let page = Page {
            limit: 10,
            offset: 0,
        };
        let agg = aggregate_window(&[], &whole_day(), Resolution::Daily, page, Order::Descending);
        assert!(agg.data.is_empty());
        assert_eq!(agg.meta, RangeMeta::default());
    }

    #[test]
    fn test_round_to() {
        // ---
        assert_eq!(round_to(152.5, 0), 153.0);
        assert_eq!(round_to(12.345, 1), 12.3);
        assert_eq!(round_to(-0.25, 1), -0.3);
    }
}
