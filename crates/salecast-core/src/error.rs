//! Error types for the forecasting pipeline.

use thiserror::Error;

/// Result type for forecasting operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Error types for forecasting operations.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing required columns: {0}")]
    MissingColumn(String),

    #[error("Invalid date format: {0}")]
    InvalidDateFormat(String),

    #[error("Insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Invalid parameter '{param}' = '{value}': {reason}")]
    InvalidParameter {
        param: String,
        value: String,
        reason: String,
    },

    #[error("Estimation failed: {0}")]
    EstimationFailed(String),

    #[error("No viable model found: {0}")]
    NoViableModel(String),

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Forecast cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ForecastError {
    /// True for errors caused by the caller's data rather than by processing.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ForecastError::InvalidInput(_)
                | ForecastError::MissingColumn(_)
                | ForecastError::InvalidDateFormat(_)
                | ForecastError::InsufficientData { .. }
                | ForecastError::InvalidParameter { .. }
        )
    }
}
