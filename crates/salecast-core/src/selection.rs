//! Model selection over a ranked candidate list.

use crate::error::{ForecastError, Result};
use crate::features::FeatureMatrix;
use crate::sarimax::{Estimator, FittedModel, ModelConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Default share of the series used for selection.
pub const DEFAULT_TRAIN_FRACTION: f64 = 0.8;

const FIXED_GRID: [ModelConfig; 5] = [
    ModelConfig::new(1, 1, 1, 1, 1, 1, 7),
    ModelConfig::new(1, 1, 1, 0, 1, 0, 7),
    ModelConfig::new(2, 1, 2, 1, 1, 1, 7),
    ModelConfig::new(0, 1, 1, 0, 1, 1, 7),
    ModelConfig::new(1, 0, 1, 1, 0, 1, 7),
];

/// Information criterion used to score candidates; lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    #[default]
    Aic,
    Bic,
}

impl Criterion {
    pub fn score(&self, model: &dyn FittedModel) -> f64 {
        match self {
            Criterion::Aic => model.aic(),
            Criterion::Bic => model.bic(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Criterion::Aic => "aic",
            Criterion::Bic => "bic",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Criterion {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aic" => Ok(Criterion::Aic),
            "bic" => Ok(Criterion::Bic),
            _ => Err(ForecastError::InvalidParameter {
                param: "criterion".to_string(),
                value: s.to_string(),
                reason: "expected 'aic' or 'bic'".to_string(),
            }),
        }
    }
}

/// Candidates in rank order plus the scoring criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionStrategy {
    pub candidates: Vec<ModelConfig>,
    pub criterion: Criterion,
}

impl SelectionStrategy {
    pub fn new(candidates: Vec<ModelConfig>, criterion: Criterion) -> Result<Self> {
        if candidates.is_empty() {
            return Err(ForecastError::InvalidParameter {
                param: "candidates".to_string(),
                value: "[]".to_string(),
                reason: "at least one candidate is required".to_string(),
            });
        }
        Ok(Self {
            candidates,
            criterion,
        })
    }

    /// The five weekly seasonal candidates scored by AIC.
    pub fn fixed_grid() -> Self {
        Self {
            candidates: FIXED_GRID.to_vec(),
            criterion: Criterion::Aic,
        }
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        Self::fixed_grid()
    }
}

/// Outcome of one candidate fit.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateOutcome {
    Scored { config: ModelConfig, score: f64 },
    Failed { config: ModelConfig, reason: String },
}

impl CandidateOutcome {
    pub fn config(&self) -> ModelConfig {
        match self {
            CandidateOutcome::Scored { config, .. } | CandidateOutcome::Failed { config, .. } => {
                *config
            }
        }
    }
}

/// Winning configuration with every candidate's outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub config: ModelConfig,
    pub score: f64,
    pub criterion: Criterion,
    pub evaluated: Vec<CandidateOutcome>,
}

/// Fits every candidate of a strategy and keeps the best-scoring one.
pub struct ModelSelector<'a> {
    estimator: &'a dyn Estimator,
    strategy: SelectionStrategy,
}

impl<'a> ModelSelector<'a> {
    pub fn new(estimator: &'a dyn Estimator, strategy: SelectionStrategy) -> Self {
        Self {
            estimator,
            strategy,
        }
    }

    pub fn strategy(&self) -> &SelectionStrategy {
        &self.strategy
    }

    /// Score each candidate on the training data.
    ///
    /// Failing candidates are skipped. Ties keep the earlier candidate.
    pub fn select(&self, y_train: &[f64], exog_train: &FeatureMatrix) -> Result<Selection> {
        let criterion = self.strategy.criterion;
        let mut evaluated = Vec::with_capacity(self.strategy.candidates.len());
        let mut best: Option<(ModelConfig, f64)> = None;

        for config in &self.strategy.candidates {
            let outcome = self
                .estimator
                .fit(config, y_train, exog_train)
                .and_then(|model| {
                    let score = criterion.score(model.as_ref());
                    if score.is_finite() {
                        Ok(score)
                    } else {
                        Err(ForecastError::EstimationFailed(format!(
                            "non-finite {} {}",
                            criterion, score
                        )))
                    }
                });

            match outcome {
                Ok(score) => {
                    debug!(model = %config, %criterion, score, "candidate scored");
                    if best.map_or(true, |(_, s)| score < s) {
                        best = Some((*config, score));
                    }
                    evaluated.push(CandidateOutcome::Scored {
                        config: *config,
                        score,
                    });
                }
                Err(ForecastError::Cancelled) => return Err(ForecastError::Cancelled),
                Err(e) => {
                    debug!(model = %config, error = %e, "candidate skipped");
                    evaluated.push(CandidateOutcome::Failed {
                        config: *config,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let (config, score) = best.ok_or_else(|| {
            ForecastError::NoViableModel(format!(
                "all {} candidates failed on {} observations",
                self.strategy.candidates.len(),
                y_train.len()
            ))
        })?;

        info!(
            model = %config,
            %criterion,
            score,
            estimator = self.estimator.name(),
            "model selected"
        );

        Ok(Selection {
            config,
            score,
            criterion,
            evaluated,
        })
    }
}

/// Training length for a series of `len` observations.
///
/// At least one observation when the series is non-empty, never more than
/// `len`.
pub fn split_train(len: usize, train_fraction: f64) -> usize {
    if len == 0 {
        return 0;
    }
    ((len as f64 * train_fraction).floor() as usize).clamp(1, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelFlag;
    use crate::sarimax::{CssEstimator, Prediction};
    use std::collections::HashMap;

    /// Estimator returning preset scores per configuration.
    struct ScriptedEstimator {
        scores: HashMap<ModelConfig, f64>,
    }

    struct ScriptedModel {
        config: ModelConfig,
        score: f64,
    }

    impl FittedModel for ScriptedModel {
        fn config(&self) -> ModelConfig {
            self.config
        }
        fn aic(&self) -> f64 {
            self.score
        }
        fn bic(&self) -> f64 {
            -self.score
        }
        fn sigma2(&self) -> f64 {
            1.0
        }
        fn forecast(&self, _: &FeatureMatrix, horizon: usize, _: f64) -> Result<Prediction> {
            Ok(Prediction {
                mean: vec![0.0; horizon],
                lower: vec![0.0; horizon],
                upper: vec![0.0; horizon],
            })
        }
    }

    impl Estimator for ScriptedEstimator {
        fn name(&self) -> &'static str {
            "scripted"
        }
        fn fit(
            &self,
            config: &ModelConfig,
            _: &[f64],
            _: &FeatureMatrix,
        ) -> Result<Box<dyn FittedModel>> {
            match self.scores.get(config) {
                Some(&score) => Ok(Box::new(ScriptedModel {
                    config: *config,
                    score,
                })),
                None => Err(ForecastError::EstimationFailed("scripted failure".into())),
            }
        }
    }

    fn scripted(scores: &[(usize, f64)]) -> ScriptedEstimator {
        ScriptedEstimator {
            scores: scores
                .iter()
                .map(|(i, s)| (FIXED_GRID[*i], *s))
                .collect(),
        }
    }

    #[test]
    fn test_fixed_grid_contents() {
        let grid = SelectionStrategy::fixed_grid();
        assert_eq!(grid.candidates.len(), 5);
        assert_eq!(grid.criterion, Criterion::Aic);
        assert_eq!(grid.candidates[0].to_string(), "SARIMA(1,1,1)(1,1,1)[7]");
        assert_eq!(grid.candidates[4].to_string(), "SARIMA(1,0,1)(1,0,1)[7]");
    }

    #[test]
    fn test_lowest_score_wins() {
        let estimator = scripted(&[(0, 50.0), (1, 20.0), (2, 30.0), (3, 25.0), (4, 40.0)]);
        let selector = ModelSelector::new(&estimator, SelectionStrategy::fixed_grid());
        let selection = selector.select(&[1.0; 10], &FeatureMatrix::default()).unwrap();
        assert_eq!(selection.config, FIXED_GRID[1]);
        assert_eq!(selection.score, 20.0);
        assert_eq!(selection.evaluated.len(), 5);
    }

    #[test]
    fn test_ties_keep_first_candidate() {
        let estimator = scripted(&[(1, 10.0), (3, 10.0)]);
        let selector = ModelSelector::new(&estimator, SelectionStrategy::fixed_grid());
        let selection = selector.select(&[1.0; 10], &FeatureMatrix::default()).unwrap();
        assert_eq!(selection.config, FIXED_GRID[1]);
    }

    #[test]
    fn test_failed_candidates_recorded_and_skipped() {
        let estimator = scripted(&[(4, 99.0)]);
        let selector = ModelSelector::new(&estimator, SelectionStrategy::fixed_grid());
        let selection = selector.select(&[1.0; 10], &FeatureMatrix::default()).unwrap();
        assert_eq!(selection.config, FIXED_GRID[4]);
        let failures = selection
            .evaluated
            .iter()
            .filter(|o| matches!(o, CandidateOutcome::Failed { .. }))
            .count();
        assert_eq!(failures, 4);
    }

    #[test]
    fn test_no_viable_model() {
        let estimator = scripted(&[]);
        let selector = ModelSelector::new(&estimator, SelectionStrategy::fixed_grid());
        let err = selector
            .select(&[1.0; 10], &FeatureMatrix::default())
            .unwrap_err();
        assert!(matches!(err, ForecastError::NoViableModel(_)));
        assert!(!err.is_input_error());
    }

    #[test]
    fn test_bic_criterion() {
        let estimator = scripted(&[(0, 10.0), (2, 30.0)]);
        let strategy = SelectionStrategy::fixed_grid().with_criterion(Criterion::Bic);
        let selection = ModelSelector::new(&estimator, strategy)
            .select(&[1.0; 10], &FeatureMatrix::default())
            .unwrap();
        // Scripted BIC is the negated AIC.
        assert_eq!(selection.config, FIXED_GRID[2]);
        assert_eq!(selection.criterion, Criterion::Bic);
    }

    #[test]
    fn test_eight_day_series_selects_grid_tuple() {
        let y = vec![30.0, 55.0, 25.0, 28.0, 60.0, 58.0, 27.0, 31.0];
        let dow: Vec<f64> = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 0.0, 1.0];
        let weekend: Vec<f64> = dow.iter().map(|d| if *d >= 5.0 { 1.0 } else { 0.0 }).collect();
        let exog = FeatureMatrix::new(
            vec!["dayofweek".into(), "is_weekend".into()],
            vec![dow, weekend],
        )
        .unwrap();

        let estimator = CssEstimator::new();
        let selection = ModelSelector::new(&estimator, SelectionStrategy::fixed_grid())
            .select(&y, &exog)
            .unwrap();
        assert!(FIXED_GRID.contains(&selection.config));
        assert_eq!(selection.config, ModelConfig::new(1, 0, 1, 1, 0, 1, 7));
    }

    #[test]
    fn test_split_train() {
        assert_eq!(split_train(10, 0.8), 8);
        assert_eq!(split_train(9, 0.8), 7);
        assert_eq!(split_train(1, 0.8), 1);
        assert_eq!(split_train(2, 0.1), 1);
        assert_eq!(split_train(5, 1.0), 5);
        assert_eq!(split_train(0, 0.8), 0);
        assert_eq!(split_train(0, 1.0), 0);
    }

    #[test]
    fn test_cancellation_aborts_selection() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let estimator = CssEstimator::new().with_cancel(cancel);
        let err = ModelSelector::new(&estimator, SelectionStrategy::fixed_grid())
            .select(&[3.0, 5.0, 4.0, 6.0, 5.0, 7.0, 6.0, 8.0], &FeatureMatrix::default())
            .unwrap_err();
        assert!(matches!(err, ForecastError::Cancelled));
    }

    #[test]
    fn test_empty_strategy_rejected() {
        assert!(SelectionStrategy::new(vec![], Criterion::Aic).is_err());
    }
}
