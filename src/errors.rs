use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({ "message": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

/// Failures at the language-model boundary.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited by provider")]
    RateLimited,

    #[error("provider error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("missing content in provider response")]
    EmptyResponse,

    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Transport(e.to_string())
    }
}

/// Failures at the external calendar boundary.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("calendar credentials not configured")]
    NotConfigured,

    #[error("calendar authorization failed: {0}")]
    Auth(String),

    #[error("calendar transport error: {0}")]
    Transport(String),

    #[error("calendar API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("calendar did not answer within {0:?}")]
    Timeout(Duration),
}

impl CalendarError {
    /// Auth and transient failures earn one refresh-and-retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CalendarError::Auth(_) | CalendarError::Transport(_) | CalendarError::Timeout(_)
        )
    }
}

impl From<reqwest::Error> for CalendarError {
    fn from(e: reqwest::Error) -> Self {
        CalendarError::Transport(e.to_string())
    }
}
