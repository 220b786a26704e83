//! Route gateway.
//!
//! Each sibling module exports a `router()` for one resource; this module
//! merges them, puts everything except the health checks behind the API key
//! middleware, and attaches the shared [`AppState`].

use axum::{middleware, Router};

use crate::auth;
use crate::AppState;

mod commands;
mod device_status;
mod forecast;
mod health;
mod logs;
mod water_level;

// ---

pub fn router(state: AppState) -> Router {
    // ---
    let protected = Router::new()
        .merge(water_level::router())
        .merge(device_status::router())
        .merge(logs::router())
        .merge(forecast::router())
        .merge(commands::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .merge(health::router())
        .merge(protected)
        .with_state(state)
}
