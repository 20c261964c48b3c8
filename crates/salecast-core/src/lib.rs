//! Core library for salecast demand forecasting.
//!
//! Builds a daily sales series with calendar and holiday regressors, selects
//! a weekly seasonal ARIMA model from a ranked candidate list, and forecasts
//! the coming days with prediction intervals.

pub mod cancel;
pub mod decomposition;
pub mod error;
pub mod export;
pub mod features;
pub mod forecast;
pub mod holidays;
pub mod imputation;
pub mod metrics;
pub mod pipeline;
pub mod preprocess;
pub mod sarimax;
pub mod selection;
pub mod top_items;
pub mod transactions;

// Re-exports for convenience
pub use cancel::CancelFlag;
pub use decomposition::{decompose_multiplicative, decompose_weekly, DecomposeResult, DecompositionRow};
pub use error::{ForecastError, Result};
pub use export::{
    read_rows, write_decomposition, write_raw_forecast, write_summary, DecompositionCsvRow,
    RawForecastRow, SummaryRow,
};
pub use features::{
    DailyRecord, DailySeries, FeatureBuilder, FeatureConfig, FeatureMatrix, FutureHolidayPolicy,
    HolidaySource,
};
pub use forecast::{ForecastEngine, ForecastOutput, ForecastPoint, RoundedForecast};
pub use holidays::{HolidayCalendar, NO_HOLIDAY};
pub use metrics::{coverage, mae, rmse, HoldoutMetrics};
pub use pipeline::{ForecastReport, HistoricalPoint, Pipeline, PipelineConfig};
pub use preprocess::{preprocess, preprocess_file, PreprocessSummary};
pub use sarimax::{
    AnofoxSarimaEstimator, CssEstimator, Estimator, EstimatorKind, FittedModel, ModelConfig,
    Prediction,
};
pub use selection::{
    split_train, CandidateOutcome, Criterion, ModelSelector, Selection, SelectionStrategy,
};
pub use top_items::{rank_items, weekly_profiles, ItemTotal, WeeklyProfile};
pub use transactions::{Transaction, TransactionTable};
