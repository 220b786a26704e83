//! Request-boundary error taxonomy.
//!
//! Every handler returns `Result<_, ApiError>`; the [`IntoResponse`] impl
//! turns each variant into a status code plus a `{"error": "..."}` body.
//! Storage and upstream details are logged here and never reach the client.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{context}: {cause:#}")]
    Upstream {
        context: &'static str,
        cause: anyhow::Error,
    },

    #[error("{context}: {cause:#}")]
    Storage {
        context: &'static str,
        cause: anyhow::Error,
    },
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn missing_fields() -> Self {
        Self::Validation("Missing required fields".into())
    }

    /// Build a closure mapping a store error into [`ApiError::Storage`].
    pub fn storage(context: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |cause| Self::Storage { context, cause }
    }

    pub fn upstream(context: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |cause| Self::Upstream { context, cause }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream { .. } | Self::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status();
        let message = match &self {
            Self::Upstream { context, cause } | Self::Storage { context, cause } => {
                tracing::error!(error = ?cause, "{context}");
                (*context).to_string()
            }
            Self::Validation(msg) => {
                tracing::warn!(%msg, "rejected request");
                msg.clone()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(format!("Invalid query parameters: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(format!("Invalid path parameter: {}", rejection.body_text()))
    }
}
