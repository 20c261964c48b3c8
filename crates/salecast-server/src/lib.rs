//! HTTP boundary for salecast.
//!
//! Accepts a sales CSV upload, runs the forecasting pipeline on a blocking
//! worker and answers with JSON.

pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use salecast_core::{HolidayCalendar, PipelineConfig};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub use config::{ConfigError, ServerConfig};
pub use error::{AppError, AppResult};

/// Shared, read-only request state.
#[derive(Debug)]
pub struct AppState {
    pub config: ServerConfig,
    pub pipeline: PipelineConfig,
    pub calendar: &'static HolidayCalendar,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Self, ConfigError> {
        let pipeline = config.to_pipeline_config()?;
        Ok(Self {
            config,
            pipeline,
            calendar: HolidayCalendar::builtin(),
        })
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/api/forecast", post(handlers::forecast))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .with_state(state.clone());

    if state.config.cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.layer(TraceLayer::new_for_http())
}

/// Bind the configured address and serve until the process stops.
pub async fn start_server(state: Arc<AppState>) -> std::io::Result<()> {
    let address = state.config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(%address, estimator = ?state.pipeline.estimator, "salecast server listening");
    axum::serve(listener, create_router(state)).await
}
