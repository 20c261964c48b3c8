//! Forecast engine: final fit on the full series and horizon forecast.

use crate::error::{ForecastError, Result};
use crate::features::{DailySeries, FeatureBuilder};
use crate::sarimax::{Estimator, ModelConfig};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

/// Default prediction interval level.
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// One forecast day, unrounded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub forecast: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Integer display form of a [`ForecastPoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoundedForecast {
    pub date: NaiveDate,
    pub forecast: i64,
    pub lower: i64,
    pub upper: i64,
}

impl ForecastPoint {
    /// Round half to even, as the summary table shows it.
    pub fn rounded(&self) -> RoundedForecast {
        RoundedForecast {
            date: self.date,
            forecast: self.forecast.round_ties_even() as i64,
            lower: self.lower.round_ties_even() as i64,
            upper: self.upper.round_ties_even() as i64,
        }
    }
}

/// Forecast for the days after the series.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastOutput {
    pub model: ModelConfig,
    pub confidence_level: f64,
    pub points: Vec<ForecastPoint>,
}

impl ForecastOutput {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn rounded(&self) -> Vec<RoundedForecast> {
        self.points.iter().map(ForecastPoint::rounded).collect()
    }
}

pub struct ForecastEngine<'a> {
    estimator: &'a dyn Estimator,
    confidence_level: f64,
}

impl<'a> ForecastEngine<'a> {
    pub fn new(estimator: &'a dyn Estimator, confidence_level: f64) -> Result<Self> {
        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return Err(ForecastError::InvalidParameter {
                param: "confidence_level".to_string(),
                value: confidence_level.to_string(),
                reason: "must be between 0 and 1".to_string(),
            });
        }
        Ok(Self {
            estimator,
            confidence_level,
        })
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    /// Refit `config` on the whole series and forecast `horizon` days.
    ///
    /// The returned points cover the `horizon` consecutive dates after the
    /// last observed date, with `lower <= forecast <= upper`.
    pub fn forecast(
        &self,
        series: &DailySeries,
        builder: &FeatureBuilder<'_>,
        config: &ModelConfig,
        horizon: usize,
    ) -> Result<ForecastOutput> {
        if horizon == 0 {
            return Err(ForecastError::InvalidParameter {
                param: "horizon".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let model = self
            .estimator
            .fit(config, &series.quantities(), &series.features())?;
        if !model.converged() {
            warn!(model = %config, "final fit did not converge");
        }

        let (dates, future_exog) = builder.future_features(series, horizon)?;
        let prediction = model.forecast(&future_exog, horizon, self.confidence_level)?;

        let points: Vec<ForecastPoint> = dates
            .into_iter()
            .enumerate()
            .map(|(h, date)| {
                let forecast = prediction.mean[h];
                ForecastPoint {
                    date,
                    forecast,
                    lower: prediction.lower[h].min(forecast),
                    upper: prediction.upper[h].max(forecast),
                }
            })
            .collect();

        info!(model = %config, horizon, "forecast generated");

        Ok(ForecastOutput {
            model: *config,
            confidence_level: self.confidence_level,
            points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{DailyRecord, FeatureConfig};
    use crate::holidays::HolidayCalendar;
    use crate::sarimax::CssEstimator;

    fn series(days: usize) -> DailySeries {
        let start = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let records = start
            .iter_days()
            .take(days)
            .enumerate()
            .map(|(i, date)| {
                let weekly = [12.0, 10.0, 11.0, 13.0, 18.0, 25.0, 22.0][i % 7];
                let noise = ((i * 31 + 3) % 11) as f64 / 5.0;
                DailyRecord::new(date, weekly + noise, false, None)
            })
            .collect();
        DailySeries::from_records(records).unwrap()
    }

    #[test]
    fn test_forecast_length_and_contiguity() {
        let estimator = CssEstimator::new();
        let engine = ForecastEngine::new(&estimator, DEFAULT_CONFIDENCE_LEVEL).unwrap();
        let builder = FeatureBuilder::new(FeatureConfig::server(), HolidayCalendar::builtin());
        let history = series(56);
        let last = history.last_date().unwrap();

        for horizon in [1, 3, 30] {
            let output = engine
                .forecast(&history, &builder, &ModelConfig::new(0, 1, 1, 0, 1, 1, 7), horizon)
                .unwrap();
            assert_eq!(output.len(), horizon);
            assert_eq!(output.points[0].date, last.succ_opt().unwrap());
            for pair in output.points.windows(2) {
                assert_eq!(pair[0].date.succ_opt(), Some(pair[1].date));
            }
            for p in &output.points {
                assert!(p.lower <= p.forecast && p.forecast <= p.upper);
            }
        }
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let estimator = CssEstimator::new();
        let engine = ForecastEngine::new(&estimator, 0.95).unwrap();
        let builder = FeatureBuilder::new(FeatureConfig::server(), HolidayCalendar::builtin());
        let err = engine
            .forecast(&series(30), &builder, &ModelConfig::new(1, 0, 1, 1, 0, 1, 7), 0)
            .unwrap_err();
        assert!(matches!(err, ForecastError::InvalidParameter { .. }));
    }

    #[test]
    fn test_invalid_confidence_level() {
        let estimator = CssEstimator::new();
        assert!(ForecastEngine::new(&estimator, 0.0).is_err());
        assert!(ForecastEngine::new(&estimator, 1.0).is_err());
    }

    #[test]
    fn test_rounding_half_to_even() {
        let point = ForecastPoint {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            forecast: 12.5,
            lower: 3.49,
            upper: 21.5,
        };
        let rounded = point.rounded();
        assert_eq!(rounded.forecast, 12);
        assert_eq!(rounded.lower, 3);
        assert_eq!(rounded.upper, 22);
    }
}
