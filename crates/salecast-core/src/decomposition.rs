//! Weekly seasonal decomposition of the daily series.
//!
//! Wraps fdars-core's multiplicative decomposition:
//! `observed = trend * seasonal * remainder`.

use crate::error::{ForecastError, Result};
use crate::features::DailySeries;
use chrono::NaiveDate;
use fdars_core::detrend::{
    decompose_multiplicative as fdars_decompose_multiplicative,
    DecomposeResult as FdarsDecomposeResult,
};

/// Weekly period in days.
pub const WEEKLY_PERIOD: usize = 7;

const TREND_METHOD: &str = "loess";
const LOESS_BANDWIDTH: f64 = 0.3;
const N_HARMONICS: usize = 3;

/// Result of seasonal decomposition.
#[derive(Debug, Clone)]
pub struct DecomposeResult {
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub remainder: Vec<f64>,
    pub period: f64,
    /// Decomposition method reported by fdars ("multiplicative")
    pub method: String,
}

impl From<FdarsDecomposeResult> for DecomposeResult {
    fn from(r: FdarsDecomposeResult) -> Self {
        Self {
            trend: r.trend,
            seasonal: r.seasonal,
            remainder: r.remainder,
            period: r.period,
            method: r.method,
        }
    }
}

/// One dated row of a decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionRow {
    pub date: NaiveDate,
    pub observed: f64,
    pub trend: f64,
    pub seasonal: f64,
    pub remainder: f64,
}

/// Multiplicative decomposition of `values` with the given period.
///
/// Needs at least two full periods of strictly positive values.
pub fn decompose_multiplicative(values: &[f64], period: usize) -> Result<DecomposeResult> {
    if period < 2 {
        return Err(ForecastError::InvalidParameter {
            param: "period".to_string(),
            value: period.to_string(),
            reason: "Period must be at least 2".to_string(),
        });
    }

    let n = values.len();
    if n < 2 * period {
        return Err(ForecastError::InsufficientData {
            needed: 2 * period,
            got: n,
        });
    }

    if let Some(bad) = values.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
        return Err(ForecastError::InvalidInput(format!(
            "Multiplicative decomposition needs strictly positive values, found {}",
            bad
        )));
    }

    let argvals: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let result = fdars_decompose_multiplicative(
        values,
        n,
        1,
        &argvals,
        period as f64,
        TREND_METHOD,
        LOESS_BANDWIDTH,
        N_HARMONICS,
    );

    Ok(result.into())
}

/// Weekly decomposition of a daily series, one row per date.
pub fn decompose_weekly(series: &DailySeries) -> Result<Vec<DecompositionRow>> {
    let observed = series.quantities();
    let result = decompose_multiplicative(&observed, WEEKLY_PERIOD)?;

    if result.trend.len() != observed.len()
        || result.seasonal.len() != observed.len()
        || result.remainder.len() != observed.len()
    {
        return Err(ForecastError::ComputationError(format!(
            "Decomposition returned {} trend values for {} observations",
            result.trend.len(),
            observed.len()
        )));
    }

    Ok(series
        .dates()
        .into_iter()
        .enumerate()
        .map(|(i, date)| DecompositionRow {
            date,
            observed: observed[i],
            trend: result.trend[i],
            seasonal: result.seasonal[i],
            remainder: result.remainder[i],
        })
        .collect())
}
