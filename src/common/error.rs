use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::common::response::ApiError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("transcode failed: {0}")]
    TranscodeFailure(String),

    #[error("job queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Only not-found is described to callers; the rest is logged.
        let message = match &self {
            AppError::NotFound(what) => format!("{what} not found"),
            AppError::QueueUnavailable(_) => "Service temporarily unavailable".to_string(),
            other => {
                tracing::error!(error = %other, "request failed");
                "Internal Server Error".to_string()
            }
        };
        ApiError(message, status).into_response()
    }
}
