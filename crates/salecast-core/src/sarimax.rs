//! Seasonal ARIMA with exogenous regressors.
//!
//! Both estimators follow the same two-step approach: regress the target on
//! the exogenous features (OLS), then model the regression residuals with a
//! seasonal ARIMA. Forecasts add the regression effect of the future features
//! back onto the residual forecast.
//!
//! [`CssEstimator`] estimates the ARIMA part by conditional sum of squares,
//! with pre-sample values and innovations conditioned to zero, so it also
//! works on very short series. [`AnofoxSarimaEstimator`] hands the residual
//! series to `anofox_forecast`'s `SARIMA`.

use crate::cancel::CancelFlag;
use crate::error::{ForecastError, Result};
use crate::features::FeatureMatrix;
use anofox_forecast::core::TimeSeriesBuilder;
use anofox_forecast::models::arima::SARIMA;
use anofox_forecast::prelude::Forecaster;
use anofox_forecast::utils::optimization::{nelder_mead, NelderMeadConfig};
use anofox_regression::prelude::*;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::cell::Cell;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Coefficients are kept strictly inside (-BOUND, BOUND).
const COEFFICIENT_BOUND: f64 = 0.99;

/// Seasonal ARIMA order `(p, d, q)(P, D, Q)[s]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelConfig {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub seasonal_p: usize,
    pub seasonal_d: usize,
    pub seasonal_q: usize,
    pub s: usize,
}

impl ModelConfig {
    pub const fn new(
        p: usize,
        d: usize,
        q: usize,
        seasonal_p: usize,
        seasonal_d: usize,
        seasonal_q: usize,
        s: usize,
    ) -> Self {
        Self {
            p,
            d,
            q,
            seasonal_p,
            seasonal_d,
            seasonal_q,
            s,
        }
    }

    pub fn order(&self) -> [usize; 3] {
        [self.p, self.d, self.q]
    }

    pub fn seasonal_order(&self) -> [usize; 4] {
        [self.seasonal_p, self.seasonal_d, self.seasonal_q, self.s]
    }

    /// Number of AR and MA coefficients.
    pub fn n_arma(&self) -> usize {
        self.p + self.q + self.seasonal_p + self.seasonal_q
    }

    /// Observations consumed by differencing.
    pub fn differencing_loss(&self) -> usize {
        self.d + self.seasonal_d * self.s
    }

    fn validate(&self) -> Result<()> {
        let seasonal_terms = self.seasonal_p + self.seasonal_d + self.seasonal_q;
        if seasonal_terms > 0 && self.s < 2 {
            return Err(ForecastError::InvalidParameter {
                param: "s".to_string(),
                value: self.s.to_string(),
                reason: "seasonal terms need a period of at least 2".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SARIMA({},{},{})({},{},{})[{}]",
            self.p, self.d, self.q, self.seasonal_p, self.seasonal_d, self.seasonal_q, self.s
        )
    }
}

/// Point forecast with a symmetric prediction interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub mean: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// A model fitted to one series.
pub trait FittedModel {
    fn config(&self) -> ModelConfig;

    fn aic(&self) -> f64;

    fn bic(&self) -> f64;

    /// Innovation variance.
    fn sigma2(&self) -> f64;

    /// False when the optimizer stopped on its iteration limit.
    fn converged(&self) -> bool {
        true
    }

    /// Forecast `horizon` steps given the regressors for those steps.
    fn forecast(&self, future_exog: &FeatureMatrix, horizon: usize, level: f64)
        -> Result<Prediction>;
}

/// Fits a [`ModelConfig`] to a target series and its regressors.
pub trait Estimator: Send + Sync {
    fn name(&self) -> &'static str;

    fn fit(
        &self,
        config: &ModelConfig,
        y: &[f64],
        exog: &FeatureMatrix,
    ) -> Result<Box<dyn FittedModel>>;
}

/// Estimator backend selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    #[default]
    Css,
    Anofox,
}

impl EstimatorKind {
    /// Build the estimator with an optional per-fit wall-clock budget.
    ///
    /// Fits stop with [`ForecastError::Cancelled`] once `cancel` is set.
    pub fn build(self, budget: Option<Duration>, cancel: CancelFlag) -> Box<dyn Estimator> {
        match self {
            EstimatorKind::Css => Box::new(CssEstimator {
                time_budget: budget,
                cancel,
                ..CssEstimator::default()
            }),
            EstimatorKind::Anofox => Box::new(AnofoxSarimaEstimator {
                time_budget: budget,
                cancel,
            }),
        }
    }
}

impl FromStr for EstimatorKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "css" => Ok(EstimatorKind::Css),
            "anofox" | "sarima" => Ok(EstimatorKind::Anofox),
            _ => Err(ForecastError::InvalidParameter {
                param: "estimator".to_string(),
                value: s.to_string(),
                reason: "expected 'css' or 'anofox'".to_string(),
            }),
        }
    }
}

// ============================================================================
// Regression step
// ============================================================================

/// OLS fit of the target on the non-constant regressors.
#[derive(Debug, Clone)]
struct RegressionFit {
    intercept: f64,
    /// One coefficient per input column; dropped columns hold 0.
    coefficients: Vec<f64>,
    /// Estimated parameters including the intercept.
    n_params: usize,
}

impl RegressionFit {
    fn mean_only(y: &[f64], n_columns: usize) -> Self {
        let mean = if y.is_empty() {
            0.0
        } else {
            y.iter().sum::<f64>() / y.len() as f64
        };
        Self {
            intercept: mean,
            coefficients: vec![0.0; n_columns],
            n_params: 1,
        }
    }

    fn effect(&self, exog: &FeatureMatrix, t: usize) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(exog.columns())
                .map(|(beta, col)| if *beta == 0.0 { 0.0 } else { beta * col[t] })
                .sum::<f64>()
    }
}

fn fit_regression(y: &[f64], exog: &FeatureMatrix) -> RegressionFit {
    let n = y.len();
    let columns = exog.columns();

    let keep: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, col)| {
            let finite = col.iter().all(|v| v.is_finite());
            let min = col.iter().copied().fold(f64::INFINITY, f64::min);
            let max = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            finite && max - min > 1e-12
        })
        .map(|(j, _)| j)
        .collect();

    let k = keep.len();
    if k == 0 || n <= k + 1 {
        return RegressionFit::mean_only(y, columns.len());
    }

    let x_mat = faer::Mat::from_fn(n, k, |i, j| columns[keep[j]][i]);
    let y_col = faer::Col::from_fn(n, |i| y[i]);

    let fitted = match OlsRegressor::builder()
        .with_intercept(true)
        .build()
        .fit(&x_mat, &y_col)
    {
        Ok(f) => f,
        Err(e) => {
            debug!(error = %e, "OLS failed, using mean-only regression");
            return RegressionFit::mean_only(y, columns.len());
        }
    };

    let intercept = fitted.intercept().unwrap_or(0.0);
    let betas = fitted.coefficients();
    let mut coefficients = vec![0.0; columns.len()];
    for (pos, &j) in keep.iter().enumerate() {
        coefficients[j] = betas[pos];
    }

    if !intercept.is_finite() || coefficients.iter().any(|b| !b.is_finite()) {
        debug!("OLS produced non-finite coefficients, using mean-only regression");
        return RegressionFit::mean_only(y, columns.len());
    }

    RegressionFit {
        intercept,
        coefficients,
        n_params: k + 1,
    }
}

fn regression_residuals(reg: &RegressionFit, y: &[f64], exog: &FeatureMatrix) -> Vec<f64> {
    y.iter()
        .enumerate()
        .map(|(t, v)| v - reg.effect(exog, t))
        .collect()
}

fn check_dimensions(y: &[f64], exog: &FeatureMatrix) -> Result<()> {
    if y.is_empty() {
        return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
    }
    if exog.n_features() > 0 && exog.n_rows() != y.len() {
        return Err(ForecastError::InvalidInput(format!(
            "{} regressor rows for {} observations",
            exog.n_rows(),
            y.len()
        )));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::InvalidInput(
            "Target series contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

fn check_future(
    future_exog: &FeatureMatrix,
    n_features: usize,
    horizon: usize,
    level: f64,
) -> Result<()> {
    if horizon == 0 {
        return Err(ForecastError::InvalidParameter {
            param: "horizon".to_string(),
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    if !(level > 0.0 && level < 1.0) {
        return Err(ForecastError::InvalidParameter {
            param: "confidence_level".to_string(),
            value: level.to_string(),
            reason: "must be between 0 and 1".to_string(),
        });
    }
    if future_exog.n_features() != n_features {
        return Err(ForecastError::InvalidInput(format!(
            "Model was fitted with {} regressors, got {}",
            n_features,
            future_exog.n_features()
        )));
    }
    if n_features > 0 && future_exog.n_rows() < horizon {
        return Err(ForecastError::InvalidInput(format!(
            "Need {} future regressor rows, got {}",
            horizon,
            future_exog.n_rows()
        )));
    }
    Ok(())
}

/// Two-sided standard normal quantile for `level`.
fn z_value(level: f64) -> Result<f64> {
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| ForecastError::ComputationError(format!("Normal distribution: {}", e)))?;
    Ok(normal.inverse_cdf(0.5 + level / 2.0))
}

fn information_criteria(sse: f64, n_obs: usize, n_params: usize) -> Result<(f64, f64, f64)> {
    let n = n_obs as f64;
    let sigma2 = sse / n;
    if !sigma2.is_finite() || sigma2 <= f64::EPSILON {
        return Err(ForecastError::EstimationFailed(format!(
            "degenerate innovation variance {}",
            sigma2
        )));
    }
    let loglik = -0.5 * n * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);
    let k = n_params as f64;
    let aic = -2.0 * loglik + 2.0 * k;
    let bic = -2.0 * loglik + k * n.ln();
    Ok((sigma2, aic, bic))
}

// ============================================================================
// Lag polynomials
// ============================================================================

/// Multiply two lag polynomials given as coefficient vectors (index = lag).
fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// `1 + sign * (c_1 B^lag + c_2 B^2lag + ...)`.
fn lag_poly(coefs: &[f64], lag: usize, sign: f64) -> Vec<f64> {
    let mut out = vec![0.0; coefs.len() * lag + 1];
    out[0] = 1.0;
    for (i, c) in coefs.iter().enumerate() {
        out[(i + 1) * lag] = sign * c;
    }
    out
}

/// `(1 - B^lag)^times`.
fn difference_poly(lag: usize, times: usize) -> Vec<f64> {
    let mut base = vec![0.0; lag + 1];
    base[0] = 1.0;
    base[lag] = -1.0;
    (0..times).fold(vec![1.0], |acc, _| poly_mul(&acc, &base))
}

fn difference(series: &[f64], lag: usize, times: usize) -> Vec<f64> {
    let mut out = series.to_vec();
    for _ in 0..times {
        if out.len() <= lag {
            return Vec::new();
        }
        out = (lag..out.len()).map(|t| out[t] - out[t - lag]).collect();
    }
    out
}

/// Split a flat parameter vector into `(phi, seasonal_phi, theta, seasonal_theta)`.
fn split_params<'a>(
    config: &ModelConfig,
    params: &'a [f64],
) -> (&'a [f64], &'a [f64], &'a [f64], &'a [f64]) {
    let (phi, rest) = params.split_at(config.p);
    let (sphi, rest) = rest.split_at(config.seasonal_p);
    let (theta, stheta) = rest.split_at(config.q);
    (phi, sphi, theta, stheta)
}

/// Stationary AR and MA polynomials for `params`.
fn arma_polys(config: &ModelConfig, params: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let (phi, sphi, theta, stheta) = split_params(config, params);
    let ar = poly_mul(&lag_poly(phi, 1, -1.0), &lag_poly(sphi, config.s, -1.0));
    let ma = poly_mul(&lag_poly(theta, 1, 1.0), &lag_poly(stheta, config.s, 1.0));
    (ar, ma)
}

/// Conditional innovations of `ar(B) w_t = ma(B) e_t` with zero pre-sample.
fn css_innovations(w: &[f64], ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let mut e = vec![0.0; w.len()];
    for t in 0..w.len() {
        let mut value = w[t];
        for (i, a) in ar.iter().enumerate().skip(1).take_while(|(i, _)| *i <= t) {
            value += a * w[t - i];
        }
        for (j, m) in ma.iter().enumerate().skip(1).take_while(|(j, _)| *j <= t) {
            value -= m * e[t - j];
        }
        e[t] = value;
    }
    e
}

// ============================================================================
// CSS estimator
// ============================================================================

/// Conditional-sum-of-squares seasonal ARIMA on OLS residuals.
#[derive(Debug, Clone)]
pub struct CssEstimator {
    pub max_iter: usize,
    pub tolerance: f64,
    pub time_budget: Option<Duration>,
    pub cancel: CancelFlag,
}

impl Default for CssEstimator {
    fn default() -> Self {
        Self {
            max_iter: 2000,
            tolerance: 1e-10,
            time_budget: None,
            cancel: CancelFlag::default(),
        }
    }
}

impl CssEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Estimator for CssEstimator {
    fn name(&self) -> &'static str {
        "css"
    }

    fn fit(
        &self,
        config: &ModelConfig,
        y: &[f64],
        exog: &FeatureMatrix,
    ) -> Result<Box<dyn FittedModel>> {
        config.validate()?;
        check_dimensions(y, exog)?;
        self.cancel.check()?;

        let regression = fit_regression(y, exog);
        let u = regression_residuals(&regression, y, exog);

        let w = difference(&difference(&u, 1, config.d), config.s, config.seasonal_d);
        let n_arma = config.n_arma();
        if w.len() <= n_arma + 1 {
            return Err(ForecastError::EstimationFailed(format!(
                "{} leaves {} observations after differencing, need more than {}",
                config,
                w.len(),
                n_arma + 1
            )));
        }

        let n_w = w.len();
        let deadline = self.time_budget.map(|budget| Instant::now() + budget);
        // Latched once the budget runs out or the run is cancelled.
        let interrupted = Cell::new(false);
        let objective = |params: &[f64]| -> f64 {
            if interrupted.get() {
                return f64::INFINITY;
            }
            if self.cancel.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d) {
                interrupted.set(true);
                return f64::INFINITY;
            }
            if params.iter().any(|c| c.abs() >= COEFFICIENT_BOUND) {
                return f64::INFINITY;
            }
            let (ar, ma) = arma_polys(config, params);
            css_innovations(&w, &ar, &ma).iter().map(|e| e * e).sum::<f64>() / n_w as f64
        };

        let (params, iterations, converged) = if n_arma == 0 {
            (Vec::new(), 0, true)
        } else {
            let start = vec![0.1; n_arma];
            let bounds = vec![(-COEFFICIENT_BOUND, COEFFICIENT_BOUND); n_arma];
            let nm = nelder_mead(
                objective,
                &start,
                Some(bounds.as_slice()),
                NelderMeadConfig {
                    max_iter: self.max_iter,
                    tolerance: self.tolerance,
                    initial_step: 0.1,
                    ..NelderMeadConfig::default()
                },
            );
            (nm.optimal_point, nm.iterations, nm.converged)
        };

        if interrupted.get() {
            self.cancel.check()?;
            return Err(ForecastError::EstimationFailed(format!(
                "{} exceeded its time budget after {} iterations",
                config, iterations
            )));
        }
        if !converged {
            warn!(
                model = %config,
                iterations,
                converged = false,
                "CSS optimizer hit its iteration limit"
            );
        }

        let (ar, ma) = arma_polys(config, &params);
        let innovations = css_innovations(&w, &ar, &ma);
        let sse: f64 = innovations.iter().map(|e| e * e).sum();
        if !sse.is_finite() {
            return Err(ForecastError::EstimationFailed(format!(
                "{} produced a non-finite likelihood",
                config
            )));
        }

        let n_params = n_arma + regression.n_params + 1;
        let (sigma2, aic, bic) = information_criteria(sse, n_w, n_params)?;

        // Integrated AR polynomial for forecasting the residual level series.
        let integrated_ar = poly_mul(
            &poly_mul(&ar, &difference_poly(1, config.d)),
            &difference_poly(config.s, config.seasonal_d),
        );
        let offset = config.differencing_loss();
        let mut aligned = vec![0.0; u.len()];
        aligned[offset..].copy_from_slice(&innovations);

        debug!(model = %config, aic, bic, sigma2, iterations, "CSS fit");

        Ok(Box::new(CssModel {
            config: *config,
            regression,
            n_features: exog.n_features(),
            params,
            integrated_ar,
            ma,
            history: u,
            innovations: aligned,
            sigma2,
            aic,
            bic,
            converged,
        }))
    }
}

/// Model fitted by [`CssEstimator`].
#[derive(Debug, Clone)]
pub struct CssModel {
    config: ModelConfig,
    regression: RegressionFit,
    n_features: usize,
    params: Vec<f64>,
    integrated_ar: Vec<f64>,
    ma: Vec<f64>,
    history: Vec<f64>,
    innovations: Vec<f64>,
    sigma2: f64,
    aic: f64,
    bic: f64,
    converged: bool,
}

impl CssModel {
    /// Estimated ARMA coefficients in `(phi, seasonal_phi, theta, seasonal_theta)` order.
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// Psi weights of the integrated model, `psi[0] = 1`.
    fn psi_weights(&self, horizon: usize) -> Vec<f64> {
        let a = &self.integrated_ar;
        let mut psi = vec![0.0; horizon];
        psi[0] = 1.0;
        for j in 1..horizon {
            let mut value = self.ma.get(j).copied().unwrap_or(0.0);
            for i in 1..=j.min(a.len() - 1) {
                value -= a[i] * psi[j - i];
            }
            psi[j] = value;
        }
        psi
    }
}

impl FittedModel for CssModel {
    fn config(&self) -> ModelConfig {
        self.config
    }

    fn aic(&self) -> f64 {
        self.aic
    }

    fn bic(&self) -> f64 {
        self.bic
    }

    fn sigma2(&self) -> f64 {
        self.sigma2
    }

    fn converged(&self) -> bool {
        self.converged
    }

    fn forecast(
        &self,
        future_exog: &FeatureMatrix,
        horizon: usize,
        level: f64,
    ) -> Result<Prediction> {
        check_future(future_exog, self.n_features, horizon, level)?;

        let n = self.history.len();
        let mut u = self.history.clone();
        u.extend(std::iter::repeat(0.0).take(horizon));
        let mut e = self.innovations.clone();
        e.extend(std::iter::repeat(0.0).take(horizon));

        for t in n..n + horizon {
            let mut value = 0.0;
            for (i, a) in self.integrated_ar.iter().enumerate().skip(1) {
                if i <= t {
                    value -= a * u[t - i];
                }
            }
            for (j, m) in self.ma.iter().enumerate().skip(1) {
                if j <= t {
                    value += m * e[t - j];
                }
            }
            u[t] = value;
        }

        let z = z_value(level)?;
        let psi = self.psi_weights(horizon);
        let mut cumulative = 0.0;
        let mut mean = Vec::with_capacity(horizon);
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);

        for h in 0..horizon {
            cumulative += psi[h] * psi[h];
            let sd = (self.sigma2 * cumulative).sqrt();
            let point = u[n + h] + self.regression.effect(future_exog, h);
            if !point.is_finite() || !sd.is_finite() {
                return Err(ForecastError::ComputationError(format!(
                    "{} produced a non-finite forecast at step {}",
                    self.config,
                    h + 1
                )));
            }
            mean.push(point);
            lower.push(point - z * sd);
            upper.push(point + z * sd);
        }

        Ok(Prediction { mean, lower, upper })
    }
}

// ============================================================================
// anofox-forecast SARIMA estimator
// ============================================================================

/// Residual seasonal ARIMA delegated to `anofox_forecast`.
///
/// The crate's fit runs to completion once started; the time budget and the
/// cancel flag are checked around it.
#[derive(Debug, Clone, Default)]
pub struct AnofoxSarimaEstimator {
    pub time_budget: Option<Duration>,
    pub cancel: CancelFlag,
}

/// Consecutive UTC midnights, one per observation.
fn daily_timestamps(n: usize) -> Vec<DateTime<Utc>> {
    (0..n)
        .map(|i| DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(i as i64))
        .collect()
}

impl Estimator for AnofoxSarimaEstimator {
    fn name(&self) -> &'static str {
        "anofox"
    }

    fn fit(
        &self,
        config: &ModelConfig,
        y: &[f64],
        exog: &FeatureMatrix,
    ) -> Result<Box<dyn FittedModel>> {
        config.validate()?;
        check_dimensions(y, exog)?;
        self.cancel.check()?;
        let started = Instant::now();

        let regression = fit_regression(y, exog);
        let u = regression_residuals(&regression, y, exog);

        let needed = config.differencing_loss() + config.n_arma() + 2;
        if u.len() < needed {
            return Err(ForecastError::EstimationFailed(format!(
                "{} needs at least {} observations, got {}",
                config,
                needed,
                u.len()
            )));
        }

        let time_series = TimeSeriesBuilder::new()
            .timestamps(daily_timestamps(u.len()))
            .values(u)
            .build()
            .map_err(|e| {
                ForecastError::ComputationError(format!("Failed to build TimeSeries: {}", e))
            })?;

        let mut model = SARIMA::new(
            config.p,
            config.d,
            config.q,
            config.seasonal_p,
            config.seasonal_d,
            config.seasonal_q,
            config.s,
        );
        model.fit(&time_series).map_err(|e| {
            ForecastError::EstimationFailed(format!("Failed to fit {}: {}", config, e))
        })?;

        self.cancel.check()?;
        if let Some(budget) = self.time_budget {
            if started.elapsed() > budget {
                return Err(ForecastError::EstimationFailed(format!(
                    "{} exceeded its time budget",
                    config
                )));
            }
        }

        // Residuals are on the differenced scale and zero until every lag is
        // available.
        let warmup = (config.p + config.seasonal_p * config.s)
            .max(config.q + config.seasonal_q * config.s);
        let residuals: Vec<f64> = model
            .residuals()
            .unwrap_or_default()
            .iter()
            .skip(warmup)
            .copied()
            .filter(|r| r.is_finite())
            .collect();
        if residuals.is_empty() {
            return Err(ForecastError::EstimationFailed(format!(
                "{} produced no finite residuals",
                config
            )));
        }
        let sse: f64 = residuals.iter().map(|r| r * r).sum();
        let n_params = config.n_arma() + regression.n_params + 1;
        let (sigma2, aic, bic) = information_criteria(sse, residuals.len(), n_params)?;

        debug!(model = %config, aic, bic, sigma2, "anofox SARIMA fit");

        Ok(Box::new(AnofoxSarimaModel {
            config: *config,
            regression,
            n_features: exog.n_features(),
            model,
            sigma2,
            aic,
            bic,
        }))
    }
}

/// Model fitted by [`AnofoxSarimaEstimator`].
pub struct AnofoxSarimaModel {
    config: ModelConfig,
    regression: RegressionFit,
    n_features: usize,
    model: SARIMA,
    sigma2: f64,
    aic: f64,
    bic: f64,
}

impl FittedModel for AnofoxSarimaModel {
    fn config(&self) -> ModelConfig {
        self.config
    }

    fn aic(&self) -> f64 {
        self.aic
    }

    fn bic(&self) -> f64 {
        self.bic
    }

    fn sigma2(&self) -> f64 {
        self.sigma2
    }

    fn forecast(
        &self,
        future_exog: &FeatureMatrix,
        horizon: usize,
        level: f64,
    ) -> Result<Prediction> {
        check_future(future_exog, self.n_features, horizon, level)?;

        let failed = |e: anofox_forecast::ForecastError| {
            ForecastError::ComputationError(format!("Failed to forecast {}: {}", self.config, e))
        };
        let forecast = self
            .model
            .predict_with_intervals(horizon, level)
            .map_err(failed)?;
        let residual_mean = forecast.primary();
        let residual_lower = forecast.lower_series(0).map_err(failed)?;
        let residual_upper = forecast.upper_series(0).map_err(failed)?;
        let steps = residual_mean
            .len()
            .min(residual_lower.len())
            .min(residual_upper.len());
        if steps < horizon {
            return Err(ForecastError::ComputationError(format!(
                "{} returned {} of {} forecast steps",
                self.config, steps, horizon
            )));
        }

        let mut mean = Vec::with_capacity(horizon);
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);
        for h in 0..horizon {
            let effect = self.regression.effect(future_exog, h);
            let point = residual_mean[h] + effect;
            let (lo, hi) = (residual_lower[h] + effect, residual_upper[h] + effect);
            if !point.is_finite() || !lo.is_finite() || !hi.is_finite() {
                return Err(ForecastError::ComputationError(format!(
                    "{} produced a non-finite forecast at step {}",
                    self.config,
                    h + 1
                )));
            }
            mean.push(point);
            lower.push(lo.min(point));
            upper.push(hi.max(point));
        }

        Ok(Prediction { mean, lower, upper })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Deterministic weekly pattern with an irregular component.
    fn weekly_series(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let weekly = [0.0, 2.0, 3.0, 1.0, 4.0, 9.0, 8.0][i % 7];
                let noise = ((i * 17 + 7) % 13) as f64 / 6.0 - 1.0;
                20.0 + weekly + noise
            })
            .collect()
    }

    fn calendar_exog(n: usize) -> FeatureMatrix {
        let dow: Vec<f64> = (0..n).map(|i| ((i + 1) % 7) as f64).collect();
        let weekend: Vec<f64> = dow.iter().map(|d| if *d >= 5.0 { 1.0 } else { 0.0 }).collect();
        FeatureMatrix::new(
            vec!["dayofweek".into(), "is_weekend".into()],
            vec![dow, weekend],
        )
        .unwrap()
    }

    #[test]
    fn test_display_and_orders() {
        let config = ModelConfig::new(2, 1, 2, 1, 1, 1, 7);
        assert_eq!(config.to_string(), "SARIMA(2,1,2)(1,1,1)[7]");
        assert_eq!(config.order(), [2, 1, 2]);
        assert_eq!(config.seasonal_order(), [1, 1, 1, 7]);
        assert_eq!(config.n_arma(), 6);
        assert_eq!(config.differencing_loss(), 8);
    }

    #[test]
    fn test_difference_poly_matches_difference() {
        let series: Vec<f64> = (0..20).map(|i| (i * i) as f64 + (i % 7) as f64).collect();
        let poly = poly_mul(&difference_poly(1, 1), &difference_poly(7, 1));
        let direct = difference(&difference(&series, 1, 1), 7, 1);
        for (k, t) in (8..20).enumerate() {
            let via_poly: f64 = poly.iter().enumerate().map(|(i, c)| c * series[t - i]).sum();
            assert_relative_eq!(via_poly, direct[k], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_white_noise_innovations_are_identity() {
        let w = vec![1.0, -2.0, 0.5, 3.0];
        let e = css_innovations(&w, &[1.0], &[1.0]);
        assert_eq!(e, w);
    }

    #[test]
    fn test_short_series_fails_after_differencing() {
        let y = weekly_series(8);
        let exog = calendar_exog(8);
        let result = CssEstimator::new().fit(&ModelConfig::new(1, 1, 1, 1, 1, 1, 7), &y, &exog);
        assert!(matches!(result, Err(ForecastError::EstimationFailed(_))));
    }

    #[test]
    fn test_undifferenced_candidate_fits_eight_points() {
        let y = vec![30.0, 55.0, 25.0, 28.0, 60.0, 58.0, 27.0, 31.0];
        let exog = calendar_exog(8);
        let model = CssEstimator::new()
            .fit(&ModelConfig::new(1, 0, 1, 1, 0, 1, 7), &y, &exog)
            .unwrap();
        assert!(model.aic().is_finite());
        assert!(model.bic().is_finite());
        assert!(model.sigma2() > 0.0);
    }

    #[test]
    fn test_forecast_interval_contains_point() {
        let n = 70;
        let y = weekly_series(n);
        let exog = calendar_exog(n + 14);
        let model = CssEstimator::new()
            .fit(&ModelConfig::new(0, 1, 1, 0, 1, 1, 7), &y, &exog.slice(0..n))
            .unwrap();
        let prediction = model.forecast(&exog.slice(n..n + 14), 14, 0.95).unwrap();
        assert_eq!(prediction.mean.len(), 14);
        for h in 0..14 {
            assert!(prediction.lower[h] <= prediction.mean[h]);
            assert!(prediction.mean[h] <= prediction.upper[h]);
        }
        // Interval widens with the horizon.
        let width = |h: usize| prediction.upper[h] - prediction.lower[h];
        assert!(width(13) >= width(0));
    }

    #[test]
    fn test_seasonal_pattern_is_tracked() {
        let n = 84;
        let y = weekly_series(n);
        let empty = FeatureMatrix::default();
        let model = CssEstimator::new()
            .fit(&ModelConfig::new(0, 0, 0, 0, 1, 0, 7), &y, &empty)
            .unwrap();
        let prediction = model.forecast(&empty, 7, 0.9).unwrap();
        // Seasonal random walk repeats the last week.
        for h in 0..7 {
            assert_relative_eq!(prediction.mean[h], y[n - 7 + h], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_zero_time_budget_fails_candidate() {
        let y = weekly_series(60);
        let exog = calendar_exog(60);
        let estimator = CssEstimator::new().with_time_budget(Duration::ZERO);
        let result = estimator.fit(&ModelConfig::new(1, 1, 1, 0, 1, 0, 7), &y, &exog);
        assert!(matches!(result, Err(ForecastError::EstimationFailed(_))));
    }

    #[test]
    fn test_future_regressor_mismatch() {
        let y = weekly_series(40);
        let exog = calendar_exog(40);
        let model = CssEstimator::new()
            .fit(&ModelConfig::new(1, 0, 0, 0, 0, 0, 7), &y, &exog)
            .unwrap();
        let short = calendar_exog(3);
        assert!(model.forecast(&short, 5, 0.95).is_err());
        assert!(model.forecast(&calendar_exog(5), 0, 0.95).is_err());
        assert!(model.forecast(&calendar_exog(5), 5, 1.5).is_err());
    }

    #[test]
    fn test_constant_regressor_dropped() {
        let y = weekly_series(30);
        let month = vec![1.0; 30];
        let exog = FeatureMatrix::new(vec!["month".into()], vec![month]).unwrap();
        let reg = fit_regression(&y, &exog);
        assert_eq!(reg.n_params, 1);
        assert_eq!(reg.coefficients, vec![0.0]);
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        assert_relative_eq!(reg.intercept, mean, epsilon = 1e-9);
    }

    #[test]
    fn test_estimator_kind_parse() {
        assert_eq!("css".parse::<EstimatorKind>().unwrap(), EstimatorKind::Css);
        assert_eq!("ANOFOX".parse::<EstimatorKind>().unwrap(), EstimatorKind::Anofox);
        assert!("mle".parse::<EstimatorKind>().is_err());
        assert_eq!(EstimatorKind::Css.build(None, CancelFlag::new()).name(), "css");
        assert_eq!(
            EstimatorKind::Anofox.build(None, CancelFlag::new()).name(),
            "anofox"
        );
    }

    #[test]
    fn test_cancelled_flag_stops_css_fit() {
        let y = weekly_series(60);
        let exog = calendar_exog(60);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let estimator = CssEstimator::new().with_cancel(cancel);
        let result = estimator.fit(&ModelConfig::new(1, 1, 1, 0, 1, 0, 7), &y, &exog);
        assert!(matches!(result, Err(ForecastError::Cancelled)));
    }

    #[test]
    fn test_daily_timestamps_are_consecutive() {
        let stamps = daily_timestamps(3);
        assert_eq!(stamps.len(), 3);
        assert_eq!((stamps[2] - stamps[0]).num_days(), 2);
        assert!(daily_timestamps(0).is_empty());
    }

    #[test]
    fn test_anofox_fits_weekly_series() {
        let n = 70;
        let y = weekly_series(n);
        let exog = calendar_exog(n + 14);
        let model = AnofoxSarimaEstimator::default()
            .fit(&ModelConfig::new(1, 0, 0, 0, 1, 1, 7), &y, &exog.slice(0..n))
            .unwrap();
        assert!(model.aic().is_finite());
        assert!(model.bic() > model.aic());
        assert!(model.sigma2() > 0.0);

        let prediction = model.forecast(&exog.slice(n..n + 14), 14, 0.95).unwrap();
        assert_eq!(prediction.mean.len(), 14);
        assert_eq!(prediction.lower.len(), 14);
        assert_eq!(prediction.upper.len(), 14);
        for h in 0..14 {
            assert!(prediction.mean[h].is_finite());
            assert!(prediction.lower[h] <= prediction.mean[h]);
            assert!(prediction.mean[h] <= prediction.upper[h]);
        }
        assert!(prediction.upper[13] - prediction.lower[13] > 0.0);
    }

    #[test]
    fn test_anofox_selection_scores_candidates() {
        use crate::selection::{ModelSelector, SelectionStrategy};

        let n = 84;
        let y = weekly_series(n);
        let exog = calendar_exog(n);
        let estimator = AnofoxSarimaEstimator::default();
        let selection = ModelSelector::new(&estimator, SelectionStrategy::fixed_grid())
            .select(&y, &exog)
            .unwrap();
        assert!(selection.score.is_finite());
        assert_eq!(selection.evaluated.len(), 5);
    }

    #[test]
    fn test_anofox_respects_cancel_flag() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let estimator = AnofoxSarimaEstimator {
            time_budget: None,
            cancel,
        };
        let result = estimator.fit(
            &ModelConfig::new(1, 0, 0, 0, 1, 1, 7),
            &weekly_series(40),
            &calendar_exog(40),
        );
        assert!(matches!(result, Err(ForecastError::Cancelled)));
    }
}
