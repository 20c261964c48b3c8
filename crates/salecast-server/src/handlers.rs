//! Route handlers.
//!
//! POST /api/forecast?days={n}
//! - Body: multipart form with a `file` part holding the sales CSV
//! - Returns: selected model, daily forecast, top items, weekly profiles and
//!   the aggregated history
//!
//! GET /health

use crate::error::{AppError, AppResult};
use crate::response::ForecastResponse;
use crate::upload::{read_upload, UploadScratch};
use crate::AppState;
use axum::{
    extract::{rejection::QueryRejection, Multipart, Query, State},
    Json,
};
use salecast_core::{CancelFlag, ForecastError, Pipeline, PipelineConfig};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument, Span};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForecastParams {
    /// Days to forecast; the configured default when absent.
    pub days: Option<usize>,
}

pub async fn forecast(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ForecastParams>, QueryRejection>,
    mut multipart: Multipart,
) -> AppResult<Json<ForecastResponse>> {
    let request_id = Uuid::new_v4();
    let span = info_span!("forecast_request", %request_id);

    async move {
        let Query(params) = params.map_err(|e| AppError::BadRequest(e.body_text()))?;
        let horizon = resolve_horizon(&state, params.days)?;

        let upload = read_upload(&mut multipart).await?;
        info!(
            file_name = %upload.file_name,
            bytes = upload.data.len(),
            horizon,
            "upload received"
        );

        let scratch = UploadScratch::new_in(&state.config.upload_dir)?;
        let path = scratch.save(&upload).await?;

        let start = Instant::now();
        let cancel = CancelFlag::new();
        let pipeline_config = PipelineConfig {
            cancel: cancel.clone(),
            ..state.pipeline.clone()
        };
        let calendar = state.calendar;
        let task_span = Span::current();
        let task = tokio::task::spawn_blocking(move || {
            let _entered = task_span.enter();
            Pipeline::new(pipeline_config, calendar)?.run_path(&path, horizon)
        });

        let report = match tokio::time::timeout(state.config.request_timeout(), task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => return Err(AppError::Internal(join_error.to_string())),
            Err(_) => {
                cancel.cancel();
                warn!(
                    timeout_ms = state.config.request_timeout_ms,
                    "forecast timed out, cancelling"
                );
                return Err(AppError::Timeout(state.config.request_timeout_ms));
            }
        };
        drop(scratch);

        info!(
            model = %report.selection.config,
            score = report.selection.score,
            days = report.forecast.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "forecast complete"
        );
        Ok(Json(ForecastResponse::from(report)))
    }
    .instrument(span)
    .await
}

fn resolve_horizon(state: &AppState, days: Option<usize>) -> AppResult<usize> {
    let horizon = days.unwrap_or(state.config.default_horizon);
    if horizon == 0 || horizon > state.config.max_horizon {
        return Err(ForecastError::InvalidParameter {
            param: "days".to_string(),
            value: horizon.to_string(),
            reason: format!("must be between 1 and {}", state.config.max_horizon),
        }
        .into());
    }
    Ok(horizon)
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
