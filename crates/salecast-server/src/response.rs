//! JSON body of a successful forecast.

use salecast_core::{
    Criterion, ForecastPoint, ForecastReport, HistoricalPoint, HoldoutMetrics, ItemTotal,
    WeeklyProfile,
};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub order: [usize; 3],
    pub seasonal_order: [usize; 4],
    pub score: f64,
    pub criterion: Criterion,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastResponse {
    pub status: &'static str,
    pub model: ModelSummary,
    pub forecast: Vec<ForecastPoint>,
    pub top_items: Vec<ItemTotal>,
    pub seasonality: Vec<WeeklyProfile>,
    pub historical: Vec<HistoricalPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holdout: Option<HoldoutMetrics>,
}

impl From<ForecastReport> for ForecastResponse {
    fn from(report: ForecastReport) -> Self {
        let selected = report.selection.config;
        Self {
            status: "success",
            model: ModelSummary {
                order: selected.order(),
                seasonal_order: selected.seasonal_order(),
                score: report.selection.score,
                criterion: report.selection.criterion,
            },
            forecast: report.forecast.points,
            top_items: report.top_items,
            seasonality: report.seasonality,
            historical: report.historical,
            holdout: report.holdout,
        }
    }
}
