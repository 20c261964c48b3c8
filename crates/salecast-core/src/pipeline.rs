//! End-to-end forecasting pipeline shared by the HTTP handler and the CLI.

use crate::cancel::CancelFlag;
use crate::decomposition::{decompose_weekly, DecompositionRow, WEEKLY_PERIOD};
use crate::error::{ForecastError, Result};
use crate::features::{DailySeries, FeatureBuilder, FeatureConfig};
use crate::forecast::{ForecastEngine, ForecastOutput, DEFAULT_CONFIDENCE_LEVEL};
use crate::holidays::HolidayCalendar;
use crate::metrics::HoldoutMetrics;
use crate::sarimax::{Estimator, EstimatorKind, ModelConfig};
use crate::selection::{split_train, ModelSelector, Selection, SelectionStrategy, DEFAULT_TRAIN_FRACTION};
use crate::top_items::{rank_items, weekly_profiles, ItemTotal, WeeklyProfile};
use crate::transactions::TransactionTable;
use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Default number of ranked items.
pub const DEFAULT_TOP_N: usize = 5;

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub features: FeatureConfig,
    pub selection: SelectionStrategy,
    pub estimator: EstimatorKind,
    /// Wall-clock budget of a single model fit.
    pub fit_budget: Option<Duration>,
    pub confidence_level: f64,
    pub train_fraction: f64,
    pub top_n: usize,
    /// Score the selected model on the held-out tail of the series.
    pub evaluate_holdout: bool,
    /// Compute the weekly decomposition.
    pub decompose: bool,
    /// Stops the run between stages and inside model fits once set.
    pub cancel: CancelFlag,
}

impl PipelineConfig {
    /// Settings used by the HTTP endpoint.
    pub fn server() -> Self {
        Self {
            features: FeatureConfig::server(),
            selection: SelectionStrategy::fixed_grid(),
            estimator: EstimatorKind::Css,
            fit_budget: None,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            train_fraction: DEFAULT_TRAIN_FRACTION,
            top_n: DEFAULT_TOP_N,
            evaluate_holdout: true,
            decompose: false,
            cancel: CancelFlag::new(),
        }
    }

    /// Settings used by the batch CLI.
    pub fn batch() -> Self {
        Self {
            features: FeatureConfig::batch(),
            decompose: true,
            ..Self::server()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(ForecastError::InvalidParameter {
                param: "confidence_level".to_string(),
                value: self.confidence_level.to_string(),
                reason: "must be between 0 and 1".to_string(),
            });
        }
        if !(self.train_fraction > 0.0 && self.train_fraction <= 1.0) {
            return Err(ForecastError::InvalidParameter {
                param: "train_fraction".to_string(),
                value: self.train_fraction.to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }
        if self.selection.candidates.is_empty() {
            return Err(ForecastError::InvalidParameter {
                param: "candidates".to_string(),
                value: "[]".to_string(),
                reason: "at least one candidate is required".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::server()
    }
}

/// One observed day of the aggregated series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoricalPoint {
    pub ds: NaiveDate,
    pub y: f64,
}

/// Everything one pipeline run produces.
#[derive(Debug, Clone)]
pub struct ForecastReport {
    pub selection: Selection,
    pub forecast: ForecastOutput,
    pub top_items: Vec<ItemTotal>,
    pub seasonality: Vec<WeeklyProfile>,
    pub historical: Vec<HistoricalPoint>,
    pub holdout: Option<HoldoutMetrics>,
    pub decomposition: Option<Vec<DecompositionRow>>,
}

pub struct Pipeline<'a> {
    config: PipelineConfig,
    calendar: &'a HolidayCalendar,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: PipelineConfig, calendar: &'a HolidayCalendar) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, calendar })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load a CSV from disk and run.
    pub fn run_path<P: AsRef<Path>>(&self, path: P, horizon: usize) -> Result<ForecastReport> {
        let table = TransactionTable::from_path(path)?;
        self.run(&table, horizon)
    }

    pub fn run(&self, table: &TransactionTable, horizon: usize) -> Result<ForecastReport> {
        let builder = FeatureBuilder::new(self.config.features, self.calendar);
        let series = builder.build(table)?;
        info!(
            transactions = table.len(),
            days = series.len(),
            horizon,
            "daily series built"
        );

        let cancel = &self.config.cancel;
        let estimator = self
            .config
            .estimator
            .build(self.config.fit_budget, cancel.clone());

        let train_len = split_train(series.len(), self.config.train_fraction);
        let y = series.quantities();
        let exog = series.features();
        let selection = ModelSelector::new(estimator.as_ref(), self.config.selection.clone())
            .select(&y[..train_len], &exog.slice(0..train_len))?;

        let holdout = if self.config.evaluate_holdout && train_len < series.len() {
            match evaluate_holdout(
                estimator.as_ref(),
                &selection.config,
                &series,
                train_len,
                self.config.confidence_level,
            ) {
                Ok(metrics) => {
                    info!(mae = metrics.mae, rmse = metrics.rmse, "holdout evaluation");
                    Some(metrics)
                }
                Err(ForecastError::Cancelled) => return Err(ForecastError::Cancelled),
                Err(e) => {
                    warn!(error = %e, "holdout evaluation skipped");
                    None
                }
            }
        } else {
            None
        };

        cancel.check()?;
        let engine = ForecastEngine::new(estimator.as_ref(), self.config.confidence_level)?;
        let forecast = engine.forecast(&series, &builder, &selection.config, horizon)?;

        cancel.check()?;
        let top_items = rank_items(table, self.config.top_n);
        let seasonality = weekly_profiles(table, &top_items);

        let decomposition = if self.config.decompose && series.len() >= 2 * WEEKLY_PERIOD {
            match decompose_weekly(&series) {
                Ok(rows) => Some(rows),
                Err(e) => {
                    warn!(error = %e, "seasonal decomposition skipped");
                    None
                }
            }
        } else {
            None
        };

        let historical = series
            .records()
            .iter()
            .map(|r| HistoricalPoint {
                ds: r.date,
                y: r.quantity,
            })
            .collect();

        Ok(ForecastReport {
            selection,
            forecast,
            top_items,
            seasonality,
            historical,
            holdout,
            decomposition,
        })
    }
}

/// Refit `config` on the first `train_len` days and score the rest.
fn evaluate_holdout(
    estimator: &dyn Estimator,
    config: &ModelConfig,
    series: &DailySeries,
    train_len: usize,
    level: f64,
) -> Result<HoldoutMetrics> {
    let y = series.quantities();
    let exog = series.features();
    let test_len = series.len() - train_len;

    let model = estimator.fit(config, &y[..train_len], &exog.slice(0..train_len))?;
    let prediction = model.forecast(&exog.slice(train_len..series.len()), test_len, level)?;

    HoldoutMetrics::score(train_len, &y[train_len..], &prediction)
}
