//! Telemetry ingestion and query API for a river water-level monitor.
//!
//! The binary in `main.rs` owns process lifecycle; everything it wires
//! together lives here so the router can be driven from tests over a
//! [`store::MemoryStore`] and a fake [`forecast::ForecastProvider`].

pub mod aggregate;
pub mod auth;
pub mod config;
pub mod error;
pub mod forecast;
pub mod freshness;
pub mod models;
pub mod routes;
pub mod schema;
pub mod state;
pub mod store;
pub mod timewindow;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
