//! Storage seam for every persisted entity.
//!
//! Handlers talk to an `Arc<dyn TelemetryStore>`; production wires in
//! [`PgStore`], tests wire in [`MemoryStore`]. Readings, device statuses and
//! logs are append-only; forecast points are upserted by key; commands are
//! the only rows that change after insert.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Command, DeviceStatus, ForecastPoint, LogEntry, LogFilter, LogLevelStats, NewCommand,
    NewDeviceStatus, NewLogEntry, NewWaterLevel, ResultStatus, WaterLevelReading,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ---

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    // --- water level
    async fn insert_water_level(&self, reading: &NewWaterLevel) -> Result<WaterLevelReading>;

    /// Row with the greatest timestamp, regardless of insertion order.
    async fn latest_water_level(&self) -> Result<Option<WaterLevelReading>>;

    /// Rows with `start <= timestamp <= end`, ascending.
    async fn water_levels_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WaterLevelReading>>;

    // --- device status
    async fn insert_device_status(&self, status: &NewDeviceStatus) -> Result<DeviceStatus>;

    async fn latest_device_status(&self) -> Result<Option<DeviceStatus>>;

    // --- logs
    async fn insert_log(&self, entry: &NewLogEntry) -> Result<LogEntry>;

    async fn query_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>>;

    async fn log_stats(&self) -> Result<Vec<LogLevelStats>>;

    // --- forecast
    /// Insert or overwrite each point keyed by `(timestamp, lat, lon)`.
    async fn upsert_forecast(&self, points: &[ForecastPoint]) -> Result<usize>;

    /// Every stored point with `start <= timestamp <= end`, all runs, ascending.
    async fn forecast_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ForecastPoint>>;

    /// Points whose `forecast_created_at` is the most recent run, ascending.
    async fn latest_forecast_run(&self) -> Result<Vec<ForecastPoint>>;

    // --- commands
    async fn enqueue_command(&self, command: &NewCommand) -> Result<Command>;

    /// Atomically move the oldest eligible command for `device_id` to
    /// `in_progress`. Two concurrent callers never receive the same row.
    ///
    /// With `reclaim_after` set, `in_progress` rows picked up longer ago than
    /// that are eligible again.
    async fn claim_next_command(
        &self,
        device_id: &str,
        reclaim_after: Option<Duration>,
    ) -> Result<Option<Command>>;

    /// Overwrite status, result and `updated_at`. Returns `false` when no
    /// command has this id.
    async fn report_command_result(
        &self,
        id: Uuid,
        status: ResultStatus,
        result: Option<&str>,
    ) -> Result<bool>;

    async fn get_command(&self, id: Uuid) -> Result<Option<Command>>;
}
