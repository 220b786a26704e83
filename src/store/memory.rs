//! In-process [`TelemetryStore`] used by tests and local experiments.
//!
//! A single `tokio::sync::Mutex` guards every table, which gives the command
//! claim the same exactly-once guarantee the database gets from row locks.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::TelemetryStore;
use crate::models::{
    Command, CommandStatus, DeviceStatus, ForecastPoint, LogEntry, LogFilter, LogLevelStats,
    NewCommand, NewDeviceStatus, NewLogEntry, NewWaterLevel, ResultStatus, WaterLevelReading,
};

// ---

#[derive(Debug, Default)]
struct Tables {
    water_level: Vec<WaterLevelReading>,
    device_status: Vec<DeviceStatus>,
    logs: Vec<LogEntry>,
    forecast: Vec<ForecastPoint>,
    commands: Vec<Command>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn same_forecast_key(a: &ForecastPoint, b: &ForecastPoint) -> bool {
    a.timestamp == b.timestamp
        && a.location_lat.to_bits() == b.location_lat.to_bits()
        && a.location_lon.to_bits() == b.location_lon.to_bits()
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    // ---
    async fn insert_water_level(&self, reading: &NewWaterLevel) -> Result<WaterLevelReading> {
        // ---
        let mut t = self.tables.lock().await;
        let row = WaterLevelReading {
            id: t.next_id(),
            level_cm: reading.level_cm,
            trend: reading.trend,
            timestamp: reading.timestamp,
            min_level: reading.min_level,
            max_level: reading.max_level,
        };
        t.water_level.push(row.clone());
        Ok(row)
    }

    async fn latest_water_level(&self) -> Result<Option<WaterLevelReading>> {
        let t = self.tables.lock().await;
        Ok(t.water_level
            .iter()
            .max_by_key(|r| (r.timestamp, r.id))
            .cloned())
    }

    async fn water_levels_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WaterLevelReading>> {
        // ---
        let t = self.tables.lock().await;
        let mut rows: Vec<WaterLevelReading> = t
            .water_level
            .iter()
            .filter(|r| start <= r.timestamp && r.timestamp <= end)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.timestamp, r.id));
        Ok(rows)
    }

    async fn insert_device_status(&self, status: &NewDeviceStatus) -> Result<DeviceStatus> {
        // ---
        let mut t = self.tables.lock().await;
        let row = DeviceStatus {
            id: t.next_id(),
            cpu_percent: status.cpu_percent,
            mem_percent: status.mem_percent,
            disk_percent: status.disk_percent,
            battery: status.battery,
            temperature: status.temperature,
            uptime_seconds: status.uptime_seconds,
            ip_address: status.ip_address.clone(),
            wifi_strength: status.wifi_strength,
            status: status.status.clone(),
            timestamp: status.timestamp,
        };
        t.device_status.push(row.clone());
        Ok(row)
    }

    async fn latest_device_status(&self) -> Result<Option<DeviceStatus>> {
        let t = self.tables.lock().await;
        Ok(t.device_status
            .iter()
            .max_by_key(|r| (r.timestamp, r.id))
            .cloned())
    }

    async fn insert_log(&self, entry: &NewLogEntry) -> Result<LogEntry> {
        // ---
        let mut t = self.tables.lock().await;
        let row = LogEntry {
            id: t.next_id(),
            level: entry.level.clone(),
            message: entry.message.clone(),
            source: entry.source.clone(),
            timestamp: entry.timestamp,
            metadata: entry.metadata.clone().map(Json),
        };
        t.logs.push(row.clone());
        Ok(row)
    }

    async fn query_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>> {
        // ---
        let t = self.tables.lock().await;
        let mut rows: Vec<&LogEntry> = t
            .logs
            .iter()
            .filter(|l| filter.level.as_ref().map_or(true, |v| &l.level == v))
            .filter(|l| filter.source.as_ref().map_or(true, |v| &l.source == v))
            .collect();
        rows.sort_by_key(|l| std::cmp::Reverse((l.timestamp, l.id)));

        Ok(rows
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn log_stats(&self) -> Result<Vec<LogLevelStats>> {
        // ---
        let t = self.tables.lock().await;
        let mut stats: Vec<LogLevelStats> = Vec::new();
        for log in &t.logs {
            match stats.iter().position(|s| s.level == log.level) {
                Some(i) => {
                    let s = &mut stats[i];
                    s.count += 1;
                    s.first_seen = s.first_seen.min(log.timestamp);
                    s.last_seen = s.last_seen.max(log.timestamp);
                }
                None => stats.push(LogLevelStats {
                    level: log.level.clone(),
                    count: 1,
                    first_seen: log.timestamp,
                    last_seen: log.timestamp,
                }),
            }
        }
        stats.sort_by(|a, b| a.level.cmp(&b.level));
        Ok(stats)
    }

    async fn upsert_forecast(&self, points: &[ForecastPoint]) -> Result<usize> {
        // ---
        let mut t = self.tables.lock().await;
        for p in points {
            match t.forecast.iter().position(|existing| same_forecast_key(existing, p)) {
                Some(i) => t.forecast[i] = p.clone(),
                None => t.forecast.push(p.clone()),
            }
        }
        Ok(points.len())
    }

    async fn forecast_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ForecastPoint>> {
        // ---
        let t = self.tables.lock().await;
        let mut rows: Vec<ForecastPoint> = t
            .forecast
            .iter()
            .filter(|p| start <= p.timestamp && p.timestamp <= end)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(b.forecast_created_at.cmp(&a.forecast_created_at))
        });
        Ok(rows)
    }

    async fn latest_forecast_run(&self) -> Result<Vec<ForecastPoint>> {
        // ---
        let t = self.tables.lock().await;
        let Some(latest) = t.forecast.iter().map(|p| p.forecast_created_at).max() else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<ForecastPoint> = t
            .forecast
            .iter()
            .filter(|p| p.forecast_created_at == latest)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.timestamp);
        Ok(rows)
    }

    async fn enqueue_command(&self, command: &NewCommand) -> Result<Command> {
        // ---
        let mut t = self.tables.lock().await;
        let row = Command {
            id: Uuid::new_v4(),
            device_id: command.device_id.clone(),
            command: command.command,
            payload: Json(command.payload.clone()),
            status: CommandStatus::Pending,
            created_at: Utc::now(),
            updated_at: None,
            picked_up_at: None,
            result: None,
        };
        t.commands.push(row.clone());
        Ok(row)
    }

    async fn claim_next_command(
        &self,
        device_id: &str,
        reclaim_after: Option<Duration>,
    ) -> Result<Option<Command>> {
        // ---
        let now = Utc::now();
        let stale_before = reclaim_after
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| now - d);

        let mut t = self.tables.lock().await;
        let eligible = |c: &Command| {
            c.device_id == device_id
                && match c.status {
                    CommandStatus::Pending => true,
                    CommandStatus::InProgress => matches!(
                        (stale_before, c.picked_up_at),
                        (Some(cutoff), Some(picked)) if picked < cutoff
                    ),
                    _ => false,
                }
        };

        // commands are pushed in creation order, so the first match is the oldest
        let Some(cmd) = t.commands.iter_mut().find(|c| eligible(&**c)) else {
            return Ok(None);
        };
        cmd.status = CommandStatus::InProgress;
        cmd.picked_up_at = Some(now);
        Ok(Some(cmd.clone()))
    }

    async fn report_command_result(
        &self,
        id: Uuid,
        status: ResultStatus,
        result: Option<&str>,
    ) -> Result<bool> {
        // ---
        let mut t = self.tables.lock().await;
        let Some(cmd) = t.commands.iter_mut().find(|c| c.id == id) else {
            return Ok(false);
        };
        cmd.status = status.into();
        cmd.result = result.map(str::to_string);
        cmd.updated_at = Some(Utc::now());
        Ok(true)
    }

    async fn get_command(&self, id: Uuid) -> Result<Option<Command>> {
        let t = self.tables.lock().await;
        Ok(t.commands.iter().find(|c| c.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use std::sync::Arc;

    use super::*;
    use crate::models::{CommandKind, Trend};
    use chrono::TimeZone;
    use serde_json::json;

    fn new_command(device_id: &str, command: CommandKind) -> NewCommand {
        NewCommand {
            device_id: device_id.into(),
            command,
            payload: json!({}),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_hand_out_one_command_once() {
        // ---
        let store = Arc::new(MemoryStore::new());
        store
            .enqueue_command(&new_command("pi-1", CommandKind::Reboot))
            .await
            .unwrap();

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.claim_next_command("pi-1", None).await })
            })
            .collect();

        let mut claimed = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                claimed += 1;
            }
        }
        assert_eq!(claimed, 1);
    }

    #[tokio::test]
    async fn test_claim_is_oldest_first_and_per_device() {
        // ---
        let store = MemoryStore::new();
        let first = store
            .enqueue_command(&new_command("pi-1", CommandKind::RestartSensor))
            .await
            .unwrap();
        store
            .enqueue_command(&new_command("pi-2", CommandKind::Reboot))
            .await
            .unwrap();
        let second = store
            .enqueue_command(&new_command("pi-1", CommandKind::CaptureSnapshot))
            .await
            .unwrap();

        let claimed = store.claim_next_command("pi-1", None).await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, CommandStatus::InProgress);
        assert!(claimed.picked_up_at.is_some());

        let claimed = store.claim_next_command("pi-1", None).await.unwrap().unwrap();
        assert_eq!(claimed.id, second.id);

        assert!(store.claim_next_command("pi-1", None).await.unwrap().is_none());
        assert!(store.claim_next_command("pi-3", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_in_progress_is_reclaimable_only_when_enabled() {
        // ---
        let store = MemoryStore::new();
        let cmd = store
            .enqueue_command(&new_command("pi-1", CommandKind::UpdateConfig))
            .await
            .unwrap();
        store.claim_next_command("pi-1", None).await.unwrap().unwrap();

        assert!(store.claim_next_command("pi-1", None).await.unwrap().is_none());
        assert!(store
            .claim_next_command("pi-1", Some(Duration::from_secs(3600)))
            .await
            .unwrap()
            .is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let reclaimed = store
            .claim_next_command("pi-1", Some(Duration::from_millis(5)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reclaimed.id, cmd.id);
    }

    #[tokio::test]
    async fn test_report_result_overwrites_unconditionally() {
        // ---
        let store = MemoryStore::new();
        let cmd = store
            .enqueue_command(&new_command("pi-1", CommandKind::Reboot))
            .await
            .unwrap();

        // never claimed, still accepted
        assert!(store
            .report_command_result(cmd.id, ResultStatus::Error, Some("no camera"))
            .await
            .unwrap());
        let stored = store.get_command(cmd.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CommandStatus::Error);
        assert_eq!(stored.result.as_deref(), Some("no camera"));
        assert!(stored.updated_at.is_some());

        assert!(!store
            .report_command_result(Uuid::new_v4(), ResultStatus::Done, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_latest_water_level_is_by_timestamp_not_insertion() {
        // ---
        let store = MemoryStore::new();
        let later = Utc.with_ymd_and_hms(2024, 2, 20, 12, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 2, 20, 11, 0, 0).unwrap();
        for (ts, level) in [(later, 150.0), (earlier, 140.0)] {
            store
                .insert_water_level(&NewWaterLevel {
                    level_cm: level,
                    trend: Trend::Rising,
                    timestamp: ts,
                    min_level: None,
                    max_level: None,
                })
                .await
                .unwrap();
        }
        let latest = store.latest_water_level().await.unwrap().unwrap();
        assert_eq!(latest.timestamp, later);
        assert_eq!(latest.level_cm, 150.0);
    }

    #[tokio::test]
    async fn test_forecast_upsert_overwrites_by_key() {
        // ---
        let store = MemoryStore::new();
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap();
        let run1 = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        let run2 = Utc.with_ymd_and_hms(2024, 12, 31, 6, 0, 0).unwrap();
        let point = |temp: f64, run: DateTime<Utc>| ForecastPoint {
            timestamp: ts,
            location_lat: 52.0,
            location_lon: -1.3,
            precipitation_mm: 0.0,
            temperature_c: temp,
            pressure_hpa: 1010.0,
            wind_speed_mps: 3.0,
            relative_humidity_percent: None,
            symbol_code: None,
            forecast_created_at: run,
        };

        store.upsert_forecast(&[point(4.0, run1)]).await.unwrap();
        store.upsert_forecast(&[point(6.0, run2)]).await.unwrap();

        let latest = store.latest_forecast_run().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].temperature_c, 6.0);
        assert_eq!(latest[0].forecast_created_at, run2);
    }
}
