//! Static shared-secret check on the `x-api-key` header.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::AppState;

// ---

pub const API_KEY_HEADER: &str = "x-api-key";

/// Reject the request with 401 unless `x-api-key` matches the configured key.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // ---
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    let rejection = match provided {
        Some(key) if key_matches(key, &state.config.api_key) => None,
        Some(_) => Some("wrong API key"),
        None => Some("missing API key"),
    };
    if let Some(reason) = rejection {
        tracing::warn!("{} {} - {}", request.method(), request.uri().path(), reason);
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}

fn key_matches(provided: &str, expected: &str) -> bool {
    bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}
