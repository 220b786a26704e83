//! Data models for the river telemetry service.
//!
//! Three kinds of types live here:
//! - stored rows (`WaterLevelReading`, `DeviceStatus`, ...) which double as
//!   API response bodies,
//! - request payloads (`*Payload`) where every field is optional so that a
//!   missing field becomes a 400 instead of a serde rejection,
//! - validated inserts (`New*`) produced by `Payload::validate`.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;

// ---

#[derive(Debug, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

/// String-backed enum stored as TEXT and serialized as its wire name.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownVariant;

            fn try_from(value: String) -> Result<Self, UnknownVariant> {
                value.parse()
            }
        }
    };
}

text_enum!(Trend, "trend", {
    Rising => "rising",
    Falling => "falling",
    Stable => "stable",
});

text_enum!(CommandKind, "command", {
    RestartSensor => "restart-sensor",
    Reboot => "reboot",
    UpdateConfig => "update-config",
    CaptureSnapshot => "capture-snapshot",
});

text_enum!(CommandStatus, "command status", {
    Pending => "pending",
    InProgress => "in_progress",
    Done => "done",
    Error => "error",
});

// terminal states a device may report for a claimed command
text_enum!(ResultStatus, "result status", {
    Done => "done",
    Error => "error",
});

impl From<ResultStatus> for CommandStatus {
    fn from(status: ResultStatus) -> Self {
        match status {
            ResultStatus::Done => CommandStatus::Done,
            ResultStatus::Error => CommandStatus::Error,
        }
    }
}

/// Treat absent, blank, and whitespace-only strings alike.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

// --- water level

/// A stored water-level sample.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct WaterLevelReading {
    // ---
    pub id: i64,
    pub level_cm: f64,
    #[sqlx(try_from = "String")]
    pub trend: Trend,
    pub timestamp: DateTime<Utc>,
    pub min_level: Option<f64>,
    pub max_level: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct WaterLevelPayload {
    pub level_cm: Option<f64>,
    pub trend: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub min_level: Option<f64>,
    pub max_level: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewWaterLevel {
    pub level_cm: f64,
    pub trend: Trend,
    pub timestamp: DateTime<Utc>,
    pub min_level: Option<f64>,
    pub max_level: Option<f64>,
}

impl WaterLevelPayload {
    pub fn validate(self) -> Result<NewWaterLevel, ApiError> {
        // ---
        let (Some(level_cm), Some(trend), Some(timestamp)) =
            (self.level_cm, present(self.trend), self.timestamp)
        else {
            return Err(ApiError::missing_fields());
        };
        let trend = trend
            .parse::<Trend>()
            .map_err(|e| ApiError::validation(format!("Invalid trend: {e}")))?;

        Ok(NewWaterLevel {
            level_cm,
            trend,
            timestamp,
            min_level: self.min_level,
            max_level: self.max_level,
        })
    }
}

// --- device status

/// A stored device health sample.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct DeviceStatus {
    // ---
    pub id: i64,
    pub cpu_percent: Option<f64>,
    pub mem_percent: Option<f64>,
    pub disk_percent: Option<f64>,
    pub battery: Option<f64>,
    pub temperature: Option<f64>,
    pub uptime_seconds: Option<i64>,
    pub ip_address: Option<String>,
    pub wifi_strength: Option<i32>,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceStatusPayload {
    pub cpu_percent: Option<f64>,
    pub mem_percent: Option<f64>,
    pub disk_percent: Option<f64>,
    pub battery: Option<f64>,
    pub temperature: Option<f64>,
    pub uptime_seconds: Option<i64>,
    pub ip_address: Option<String>,
    pub wifi_strength: Option<i32>,
    pub status: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewDeviceStatus {
    pub cpu_percent: Option<f64>,
    pub mem_percent: Option<f64>,
    pub disk_percent: Option<f64>,
    pub battery: Option<f64>,
    pub temperature: Option<f64>,
    pub uptime_seconds: Option<i64>,
    pub ip_address: Option<String>,
    pub wifi_strength: Option<i32>,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

impl DeviceStatusPayload {
    pub fn validate(self) -> Result<NewDeviceStatus, ApiError> {
        // ---
        let (Some(status), Some(timestamp)) = (present(self.status), self.timestamp) else {
            return Err(ApiError::missing_fields());
        };

        Ok(NewDeviceStatus {
            cpu_percent: self.cpu_percent,
            mem_percent: self.mem_percent,
            disk_percent: self.disk_percent,
            battery: self.battery,
            temperature: self.temperature,
            uptime_seconds: self.uptime_seconds,
            ip_address: self.ip_address,
            wifi_strength: self.wifi_strength,
            status,
            timestamp,
        })
    }
}

// --- logs

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LogEntry {
    // ---
    pub id: i64,
    pub level: String,
    pub message: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<Json<Value>>,
}

#[derive(Debug, Deserialize)]
pub struct LogPayload {
    pub level: Option<String>,
    pub message: Option<String>,
    pub source: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub level: String,
    pub message: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<Value>,
}

impl LogPayload {
    /// `received_at` stands in for a missing `timestamp`.
    pub fn validate(self, received_at: DateTime<Utc>) -> Result<NewLogEntry, ApiError> {
        // ---
        let (Some(level), Some(message), Some(source)) =
            (present(self.level), present(self.message), present(self.source))
        else {
            return Err(ApiError::missing_fields());
        };
        let metadata = match self.metadata {
            None | Some(Value::Null) => None,
            Some(obj @ Value::Object(_)) => Some(obj),
            Some(_) => return Err(ApiError::validation("metadata must be a JSON object")),
        };

        Ok(NewLogEntry {
            level,
            message,
            source,
            timestamp: self.timestamp.unwrap_or(received_at),
            metadata,
        })
    }
}

/// Filters and paging for log queries. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub level: Option<String>,
    pub source: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// Per-level aggregate returned by `/logs/stats`.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct LogLevelStats {
    pub level: String,
    pub count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

// --- forecast

/// One provider timestep at one location, as stored.
///
/// Keyed by `(timestamp, location_lat, location_lon)`; a later fetch
/// overwrites the values and moves `forecast_created_at` forward.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ForecastPoint {
    // ---
    pub timestamp: DateTime<Utc>,
    pub location_lat: f64,
    pub location_lon: f64,
    pub precipitation_mm: f64,
    pub temperature_c: f64,
    pub pressure_hpa: f64,
    pub wind_speed_mps: f64,
    pub relative_humidity_percent: Option<f64>,
    pub symbol_code: Option<String>,
    pub forecast_created_at: DateTime<Utc>,
}

// --- commands

/// A queued device command.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Command {
    // ---
    pub id: Uuid,
    pub device_id: String,
    #[sqlx(try_from = "String")]
    pub command: CommandKind,
    pub payload: Json<Value>,
    #[sqlx(try_from = "String")]
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommandPayload {
    pub device_id: Option<String>,
    pub command: Option<String>,
    pub payload: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct NewCommand {
    pub device_id: String,
    pub command: CommandKind,
    pub payload: Value,
}

impl CommandPayload {
    pub fn validate(self) -> Result<NewCommand, ApiError> {
        // ---
        let (Some(device_id), Some(command)) = (present(self.device_id), present(self.command))
        else {
            return Err(ApiError::validation("device_id and command are required"));
        };
        let command = command
            .parse::<CommandKind>()
            .map_err(|_| ApiError::validation("Invalid command"))?;
        let payload = match self.payload {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(obj @ Value::Object(_)) => obj,
            Some(_) => return Err(ApiError::validation("payload must be a JSON object")),
        };

        Ok(NewCommand {
            device_id,
            command,
            payload,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CommandResultPayload {
    pub status: Option<String>,
    pub result: Option<String>,
}

impl CommandResultPayload {
    pub fn validate(self) -> Result<(ResultStatus, Option<String>), ApiError> {
        // ---
        let status = self
            .status
            .as_deref()
            .and_then(|s| s.parse::<ResultStatus>().ok())
            .ok_or_else(|| ApiError::validation("Invalid status. Must be \"done\" or \"error\""))?;
        Ok((status, self.result))
    }
}
