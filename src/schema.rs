//! Database schema management for `river-telemetry`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Statements applied in order inside one transaction.
const DDL: &[&str] = &[
    // Append-only water level samples
    r#"
    CREATE TABLE IF NOT EXISTS water_level (
        id        BIGSERIAL PRIMARY KEY,
        level_cm  DOUBLE PRECISION NOT NULL,
        trend     TEXT             NOT NULL,
        timestamp TIMESTAMPTZ      NOT NULL,
        min_level DOUBLE PRECISION,
        max_level DOUBLE PRECISION
    );
    "#,
    // Append-only device health samples
    r#"
    CREATE TABLE IF NOT EXISTS device_status (
        id             BIGSERIAL PRIMARY KEY,
        cpu_percent    DOUBLE PRECISION,
        mem_percent    DOUBLE PRECISION,
        disk_percent   DOUBLE PRECISION,
        battery        DOUBLE PRECISION,
        temperature    DOUBLE PRECISION,
        uptime_seconds BIGINT,
        ip_address     TEXT,
        wifi_strength  INTEGER,
        status         TEXT        NOT NULL,
        timestamp      TIMESTAMPTZ NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS device_logs (
        id        BIGSERIAL PRIMARY KEY,
        level     TEXT        NOT NULL,
        message   TEXT        NOT NULL,
        source    TEXT        NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL,
        metadata  JSONB
    );
    "#,
    // One row per provider timestep and location; later fetches overwrite
    r#"
    CREATE TABLE IF NOT EXISTS weather_forecast (
        id                        BIGSERIAL PRIMARY KEY,
        timestamp                 TIMESTAMPTZ      NOT NULL,
        location_lat              DOUBLE PRECISION NOT NULL,
        location_lon              DOUBLE PRECISION NOT NULL,
        precipitation_mm          DOUBLE PRECISION NOT NULL DEFAULT 0,
        temperature_c             DOUBLE PRECISION NOT NULL,
        pressure_hpa              DOUBLE PRECISION NOT NULL,
        wind_speed_mps            DOUBLE PRECISION NOT NULL,
        relative_humidity_percent DOUBLE PRECISION,
        symbol_code               TEXT,
        forecast_created_at       TIMESTAMPTZ      NOT NULL,
        UNIQUE (timestamp, location_lat, location_lon)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS device_commands (
        id           UUID PRIMARY KEY,
        device_id    TEXT        NOT NULL,
        command      TEXT        NOT NULL,
        payload      JSONB       NOT NULL DEFAULT '{}'::jsonb,
        status       TEXT        NOT NULL DEFAULT 'pending',
        created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at   TIMESTAMPTZ,
        picked_up_at TIMESTAMPTZ,
        result       TEXT
    );
    "#,
    // Basic indexes for common queries
    "CREATE INDEX IF NOT EXISTS idx_water_level_timestamp ON water_level (timestamp);",
    "CREATE INDEX IF NOT EXISTS idx_device_status_timestamp ON device_status (timestamp);",
    "CREATE INDEX IF NOT EXISTS idx_device_logs_level_timestamp ON device_logs (level, timestamp);",
    "CREATE INDEX IF NOT EXISTS idx_weather_forecast_created ON weather_forecast (forecast_created_at);",
    r#"
    CREATE INDEX IF NOT EXISTS idx_device_commands_queue
        ON device_commands (device_id, status, created_at);
    "#,
];

/// Create or update the database schema (idempotent).
///
/// Safe to call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    for statement in DDL {
        sqlx::query(*statement).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    tracing::info!("Schema ready ({} statements applied)", DDL.len());
    Ok(())
}
