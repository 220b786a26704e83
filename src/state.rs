//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::forecast::ForecastProvider;
use crate::store::TelemetryStore;
use crate::Config;

// ---

/// Explicitly constructed by the entry point; cloning only bumps refcounts.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TelemetryStore>,
    pub forecast: Arc<dyn ForecastProvider>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        forecast: Arc<dyn ForecastProvider>,
        config: Config,
    ) -> Self {
        Self {
            store,
            forecast,
            config: Arc::new(config),
        }
    }
}
