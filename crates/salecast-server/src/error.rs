//! HTTP error responses.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use salecast_core::ForecastError;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("No file uploaded")]
    NoFile,

    #[error("No selected file")]
    NoSelectedFile,

    #[error("Invalid file type. Only CSV files are allowed.")]
    InvalidFileType,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error("Forecast timed out after {0} ms")]
    Timeout(u64),

    #[error("Upload storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NoFile
            | AppError::NoSelectedFile
            | AppError::InvalidFileType
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Multipart(e) => e.status(),
            AppError::Forecast(e) if e.is_input_error() => StatusCode::BAD_REQUEST,
            AppError::Forecast(_)
            | AppError::Timeout(_)
            | AppError::Io(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
