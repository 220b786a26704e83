//! Configuration loader for the `river-telemetry` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Handlers never read the environment themselves;
//! they receive the loaded [`Config`] through the application state.
//!
use std::{env, net::SocketAddr, time::Duration};

use anyhow::{anyhow, Result};

/// Parse an optional numeric environment variable with a default value.
macro_rules! parse_env_num {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

pub const DEFAULT_FORECAST_URL: &str =
    "https://api.met.no/weatherapi/locationforecast/2.0/compact";
pub const DEFAULT_FORECAST_LAT: f64 = 52.0181248;
pub const DEFAULT_FORECAST_LON: f64 = -1.3819986;
pub const DEFAULT_USER_AGENT: &str = "RiverMonitor/1.0";

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Shared secret expected in the `x-api-key` header.
    pub api_key: String,

    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Forecast provider endpoint (met.no locationforecast compact schema).
    pub forecast_url: String,

    /// Latitude of the monitored river site.
    pub forecast_lat: f64,

    /// Longitude of the monitored river site.
    pub forecast_lon: f64,

    /// User-Agent sent to the forecast provider, which rejects anonymous clients.
    pub forecast_user_agent: String,

    /// Age after which an `in_progress` command may be claimed again.
    /// `None` disables requeueing.
    pub command_claim_timeout: Option<Duration>,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
/// - `API_KEY` – shared secret for the `x-api-key` header
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `BIND_ADDR` – listen address (default: `0.0.0.0:8080`)
/// - `FORECAST_API_URL`, `FORECAST_LAT`, `FORECAST_LON`, `FORECAST_USER_AGENT`
/// - `COMMAND_CLAIM_TIMEOUT_SECS` – requeue stuck claims (default: 0, disabled)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let api_key = require_env!("API_KEY");
    if api_key.trim().is_empty() {
        return Err(anyhow!("API_KEY must not be empty"));
    }

    let db_pool_max = parse_env_num!("DB_POOL_MAX", u32, 5);
    let bind_addr = parse_env_num!("BIND_ADDR", SocketAddr, SocketAddr::from(([0, 0, 0, 0], 8080)));
    let forecast_url = env::var("FORECAST_API_URL").unwrap_or_else(|_| DEFAULT_FORECAST_URL.into());
    let forecast_lat = parse_env_num!("FORECAST_LAT", f64, DEFAULT_FORECAST_LAT);
    let forecast_lon = parse_env_num!("FORECAST_LON", f64, DEFAULT_FORECAST_LON);
    let forecast_user_agent =
        env::var("FORECAST_USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.into());
    let claim_timeout_secs = parse_env_num!("COMMAND_CLAIM_TIMEOUT_SECS", u64, 0);

    Ok(Config {
        db_url,
        db_pool_max,
        api_key,
        bind_addr,
        forecast_url,
        forecast_lat,
        forecast_lon,
        forecast_user_agent,
        command_claim_timeout: (claim_timeout_secs > 0)
            .then(|| Duration::from_secs(claim_timeout_secs)),
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords and the API key
    /// while showing all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL        : {}", mask_db_url(&self.db_url));
        tracing::info!("  API_KEY             : {}", mask_secret(&self.api_key));
        tracing::info!("  DB_POOL_MAX         : {}", self.db_pool_max);
        tracing::info!("  BIND_ADDR           : {}", self.bind_addr);
        tracing::info!("  FORECAST_API_URL    : {}", self.forecast_url);
        tracing::info!("  FORECAST_LAT/LON    : {}, {}", self.forecast_lat, self.forecast_lon);
        tracing::info!("  FORECAST_USER_AGENT : {}", self.forecast_user_agent);
        tracing::info!(
            "  CLAIM_TIMEOUT       : {}",
            self.command_claim_timeout
                .map(|d| format!("{}s", d.as_secs()))
                .unwrap_or_else(|| "disabled".into())
        );
    }
}

/// Replace the password segment of a connection URL with `****`.
pub fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            // scheme separator, no password present
            if db_url[colon_pos + 1..].starts_with("//") {
                return db_url.to_string();
            }
            return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
        }
    }
    db_url.to_string()
}

fn mask_secret(secret: &str) -> String {
    // ---
    let visible: String = secret.chars().take(2).collect();
    format!("{visible}****")
}
