//! PostgreSQL implementation of [`TelemetryStore`].
//!
//! All statements are parameterized; enums are bound as their wire names and
//! decoded back through `TryFrom<String>` on the row types.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::TelemetryStore;
use crate::models::{
    Command, CommandStatus, DeviceStatus, ForecastPoint, LogEntry, LogFilter, LogLevelStats,
    NewCommand, NewDeviceStatus, NewLogEntry, NewWaterLevel, ResultStatus, WaterLevelReading,
};

// ---

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TelemetryStore for PgStore {
    // ---
    async fn insert_water_level(&self, reading: &NewWaterLevel) -> Result<WaterLevelReading> {
        // ---
        sqlx::query_as::<_, WaterLevelReading>(
            r#"
            INSERT INTO water_level (level_cm, trend, timestamp, min_level, max_level)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, level_cm, trend, timestamp, min_level, max_level
            "#,
        )
        .bind(reading.level_cm)
        .bind(reading.trend.as_str())
        .bind(reading.timestamp)
        .bind(reading.min_level)
        .bind(reading.max_level)
        .fetch_one(&self.pool)
        .await
        .context("insert water_level")
    }

    async fn latest_water_level(&self) -> Result<Option<WaterLevelReading>> {
        // ---
        sqlx::query_as::<_, WaterLevelReading>(
            r#"
            SELECT id, level_cm, trend, timestamp, min_level, max_level
            FROM water_level
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .context("select latest water_level")
    }

    async fn water_levels_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WaterLevelReading>> {
        // ---
        sqlx::query_as::<_, WaterLevelReading>(
            r#"
            SELECT id, level_cm, trend, timestamp, min_level, max_level
            FROM water_level
            WHERE timestamp BETWEEN $1 AND $2
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .context("select water_level range")
    }

    async fn insert_device_status(&self, status: &NewDeviceStatus) -> Result<DeviceStatus> {
        // ---
        sqlx::query_as::<_, DeviceStatus>(
            r#"
            INSERT INTO device_status (
                cpu_percent, mem_percent, disk_percent, battery, temperature,
                uptime_seconds, ip_address, wifi_strength, status, timestamp
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(status.cpu_percent)
        .bind(status.mem_percent)
        .bind(status.disk_percent)
        .bind(status.battery)
        .bind(status.temperature)
        .bind(status.uptime_seconds)
        .bind(&status.ip_address)
        .bind(status.wifi_strength)
        .bind(&status.status)
        .bind(status.timestamp)
        .fetch_one(&self.pool)
        .await
        .context("insert device_status")
    }

    async fn latest_device_status(&self) -> Result<Option<DeviceStatus>> {
        // ---
        sqlx::query_as::<_, DeviceStatus>(
            r#"
            SELECT * FROM device_status
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .context("select latest device_status")
    }

    async fn insert_log(&self, entry: &NewLogEntry) -> Result<LogEntry> {
        // ---
        sqlx::query_as::<_, LogEntry>(
            r#"
            INSERT INTO device_logs (level, message, source, timestamp, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, level, message, source, timestamp, metadata
            "#,
        )
        .bind(&entry.level)
        .bind(&entry.message)
        .bind(&entry.source)
        .bind(entry.timestamp)
        .bind(entry.metadata.as_ref().map(Json))
        .fetch_one(&self.pool)
        .await
        .context("insert device_logs")
    }

    async fn query_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>> {
        // ---
        sqlx::query_as::<_, LogEntry>(
            r#"
            SELECT id, level, message, source, timestamp, metadata
            FROM device_logs
            WHERE ($1::text IS NULL OR level = $1)
              AND ($2::text IS NULL OR source = $2)
            ORDER BY timestamp DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&filter.level)
        .bind(&filter.source)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await
        .context("select device_logs")
    }

    async fn log_stats(&self) -> Result<Vec<LogLevelStats>> {
        // ---
        sqlx::query_as::<_, LogLevelStats>(
            r#"
            SELECT level,
                   COUNT(*)       AS count,
                   MIN(timestamp) AS first_seen,
                   MAX(timestamp) AS last_seen
            FROM device_logs
            GROUP BY level
            ORDER BY level
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("aggregate device_logs by level")
    }

    async fn upsert_forecast(&self, points: &[ForecastPoint]) -> Result<usize> {
        // ---
        let mut tx = self.pool.begin().await?;

        for p in points {
            sqlx::query(
                r#"
                INSERT INTO weather_forecast (
                    timestamp, location_lat, location_lon,
                    precipitation_mm, temperature_c, pressure_hpa, wind_speed_mps,
                    relative_humidity_percent, symbol_code, forecast_created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (timestamp, location_lat, location_lon) DO UPDATE SET
                    precipitation_mm          = EXCLUDED.precipitation_mm,
                    temperature_c             = EXCLUDED.temperature_c,
                    pressure_hpa              = EXCLUDED.pressure_hpa,
                    wind_speed_mps            = EXCLUDED.wind_speed_mps,
                    relative_humidity_percent = EXCLUDED.relative_humidity_percent,
                    symbol_code               = EXCLUDED.symbol_code,
                    forecast_created_at       = EXCLUDED.forecast_created_at
                "#,
            )
            .bind(p.timestamp)
            .bind(p.location_lat)
            .bind(p.location_lon)
            .bind(p.precipitation_mm)
            .bind(p.temperature_c)
            .bind(p.pressure_hpa)
            .bind(p.wind_speed_mps)
            .bind(p.relative_humidity_percent)
            .bind(&p.symbol_code)
            .bind(p.forecast_created_at)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("upsert weather_forecast at {}", p.timestamp))?;
        }

        tx.commit().await?;
        Ok(points.len())
    }

    async fn forecast_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ForecastPoint>> {
        // ---
        sqlx::query_as::<_, ForecastPoint>(
            r#"
            SELECT timestamp, location_lat, location_lon,
                   precipitation_mm, temperature_c, pressure_hpa, wind_speed_mps,
                   relative_humidity_percent, symbol_code, forecast_created_at
            FROM weather_forecast
            WHERE timestamp BETWEEN $1 AND $2
            ORDER BY timestamp ASC, forecast_created_at DESC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .context("select weather_forecast range")
    }

    async fn latest_forecast_run(&self) -> Result<Vec<ForecastPoint>> {
        // ---
        sqlx::query_as::<_, ForecastPoint>(
            r#"
            SELECT timestamp, location_lat, location_lon,
                   precipitation_mm, temperature_c, pressure_hpa, wind_speed_mps,
                   relative_humidity_percent, symbol_code, forecast_created_at
            FROM weather_forecast
            WHERE forecast_created_at = (SELECT MAX(forecast_created_at) FROM weather_forecast)
            ORDER BY timestamp ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("select latest forecast run")
    }

    async fn enqueue_command(&self, command: &NewCommand) -> Result<Command> {
        // ---
        sqlx::query_as::<_, Command>(
            r#"
            INSERT INTO device_commands (id, device_id, command, payload, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&command.device_id)
        .bind(command.command.as_str())
        .bind(Json(&command.payload))
        .bind(CommandStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .context("insert device_commands")
    }

    async fn claim_next_command(
        &self,
        device_id: &str,
        reclaim_after: Option<Duration>,
    ) -> Result<Option<Command>> {
        // ---
        // FOR UPDATE SKIP LOCKED makes concurrent claimers pass over a row
        // another transaction is already moving to in_progress.
        sqlx::query_as::<_, Command>(
            r#"
            UPDATE device_commands
            SET status = 'in_progress',
                picked_up_at = now()
            WHERE id = (
                SELECT id FROM device_commands
                WHERE device_id = $1
                  AND (status = 'pending'
                       OR ($2::double precision IS NOT NULL
                           AND status = 'in_progress'
                           AND picked_up_at < now() - make_interval(secs => $2::double precision)))
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(device_id)
        .bind(reclaim_after.map(|d| d.as_secs_f64()))
        .fetch_optional(&self.pool)
        .await
        .context("claim device_commands")
    }

    async fn report_command_result(
        &self,
        id: Uuid,
        status: ResultStatus,
        result: Option<&str>,
    ) -> Result<bool> {
        // ---
        let done = sqlx::query(
            r#"
            UPDATE device_commands
            SET status = $1,
                updated_at = now(),
                result = $2
            WHERE id = $3
            "#,
        )
        .bind(CommandStatus::from(status).as_str())
        .bind(result)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("update device_commands result")?;

        Ok(done.rows_affected() > 0)
    }

    async fn get_command(&self, id: Uuid) -> Result<Option<Command>> {
        // ---
        sqlx::query_as::<_, Command>("SELECT * FROM device_commands WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("select device_commands by id")
    }
}
