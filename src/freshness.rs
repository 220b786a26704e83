//! Online/offline inference for the latest device-status sample.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::DeviceStatus;

// ---

/// Samples older than this mark the device offline.
pub const OFFLINE_AFTER_SECS: i64 = 180;

pub const OFFLINE_STATUS: &str = "offline";

/// Device status as reported to the dashboard.
///
/// `last_seen` is only present when the device has been classified offline,
/// and carries the timestamp of the stale sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedStatus {
    #[serde(flatten)]
    pub status: DeviceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl ClassifiedStatus {
    pub fn is_offline(&self) -> bool {
        self.last_seen.is_some()
    }
}

/// Classify `latest` against `now`.
///
/// Stale samples keep their id and timestamp but lose every live metric.
pub fn classify(latest: DeviceStatus, now: DateTime<Utc>) -> ClassifiedStatus {
    // ---
    if now - latest.timestamp <= Duration::seconds(OFFLINE_AFTER_SECS) {
        return ClassifiedStatus {
            status: latest,
            last_seen: None,
        };
    }

    let last_seen = latest.timestamp;
    ClassifiedStatus {
        status: DeviceStatus {
            cpu_percent: None,
            mem_percent: None,
            disk_percent: None,
            battery: None,
            temperature: None,
            uptime_seconds: None,
            ip_address: None,
            wifi_strength: None,
            status: OFFLINE_STATUS.to_string(),
            ..latest
        },
        last_seen: Some(last_seen),
    }
}
