//! Holdout accuracy metrics.

use crate::error::{ForecastError, Result};
use crate::sarimax::Prediction;
use serde::Serialize;

/// Accuracy of a model refit on the training split and scored on the rest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HoldoutMetrics {
    pub train_len: usize,
    pub test_len: usize,
    pub mae: f64,
    pub rmse: f64,
    /// Share of held-out values inside the prediction interval.
    pub coverage: f64,
}

impl HoldoutMetrics {
    /// Score `prediction` against the held-out `actual` values.
    pub fn score(train_len: usize, actual: &[f64], prediction: &Prediction) -> Result<Self> {
        Ok(Self {
            train_len,
            test_len: actual.len(),
            mae: mae(actual, &prediction.mean)?,
            rmse: rmse(actual, &prediction.mean)?,
            coverage: coverage(actual, &prediction.lower, &prediction.upper)?,
        })
    }
}

/// Mean absolute error.
///
/// ```
/// use salecast_core::metrics::mae;
/// let error = mae(&[10.0, 12.0, 9.0], &[11.0, 12.0, 7.0]).unwrap();
/// assert_eq!(error, 1.0);
/// ```
pub fn mae(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    let n = check_lengths(actual.len(), &[forecast.len()])?;
    Ok(residuals(actual, forecast).map(f64::abs).sum::<f64>() / n as f64)
}

/// Root mean squared error.
pub fn rmse(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    let n = check_lengths(actual.len(), &[forecast.len()])?;
    let sse: f64 = residuals(actual, forecast).map(|e| e * e).sum();
    Ok((sse / n as f64).sqrt())
}

/// Share of `actual` values inside `[lower, upper]`.
pub fn coverage(actual: &[f64], lower: &[f64], upper: &[f64]) -> Result<f64> {
    let n = check_lengths(actual.len(), &[lower.len(), upper.len()])?;
    let inside = (0..n)
        .filter(|&i| lower[i] <= actual[i] && actual[i] <= upper[i])
        .count();
    Ok(inside as f64 / n as f64)
}

fn residuals<'a>(actual: &'a [f64], forecast: &'a [f64]) -> impl Iterator<Item = f64> + 'a {
    actual.iter().zip(forecast).map(|(a, f)| a - f)
}

fn check_lengths(n: usize, others: &[usize]) -> Result<usize> {
    if let Some(&m) = others.iter().find(|&&m| m != n) {
        return Err(ForecastError::InvalidInput(format!(
            "Series lengths differ: {} actual values vs {}",
            n, m
        )));
    }
    if n == 0 {
        return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_errors() {
        let actual = [20.0, 25.0, 30.0, 28.0];
        let forecast = [22.0, 25.0, 26.0, 28.0];
        assert_relative_eq!(mae(&actual, &forecast).unwrap(), 1.5);
        assert_relative_eq!(rmse(&actual, &forecast).unwrap(), 5.0_f64.sqrt());
    }

    #[test]
    fn test_coverage_counts_bounds_inclusive() {
        let actual = [5.0, 7.0, 12.0, 3.0];
        let lower = [4.0, 7.0, 8.0, 4.0];
        let upper = [6.0, 9.0, 11.0, 6.0];
        assert_relative_eq!(coverage(&actual, &lower, &upper).unwrap(), 0.5);
    }

    #[test]
    fn test_holdout_score() {
        let prediction = Prediction {
            mean: vec![10.0, 14.0],
            lower: vec![8.0, 9.0],
            upper: vec![12.0, 13.0],
        };
        let metrics = HoldoutMetrics::score(8, &[11.0, 14.0], &prediction).unwrap();
        assert_eq!(metrics.train_len, 8);
        assert_eq!(metrics.test_len, 2);
        assert_relative_eq!(metrics.mae, 0.5);
        assert_relative_eq!(metrics.coverage, 0.5);
    }

    #[test]
    fn test_length_and_empty_checks() {
        assert!(matches!(
            mae(&[1.0, 2.0], &[1.0]),
            Err(ForecastError::InvalidInput(_))
        ));
        assert!(coverage(&[1.0], &[0.0], &[]).is_err());
        assert!(matches!(
            rmse(&[], &[]),
            Err(ForecastError::InsufficientData { .. })
        ));
    }
}
