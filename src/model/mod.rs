//! Binary classifiers
//!
//! A closed set of models sharing one capability: fit on feature rows and
//! return the probability that the first team wins. Only the logistic model
//! expects standardized inputs.

pub mod boosting;
pub mod forest;
pub mod importance;
pub mod logistic;
pub mod scaler;

pub use boosting::{BoostedTrees, BoostingConfig, QuantileBins};
pub use forest::{ForestConfig, RandomForest};
pub use importance::{normalize_importances, permutation_importances};
pub use logistic::{LogisticConfig, LogisticModel};
pub use scaler::Standardizer;

use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fmt;

use crate::{ModelsConfig, PredictError, Result};

/// Probability that the first team in a feature row wins
pub trait ProbabilisticClassifier {
    fn predict_proba(&self, row: &[f64]) -> Result<f64>;

    fn predict_proba_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.predict_proba(row)).collect()
    }

    /// Width of the rows the model was trained on
    fn n_features(&self) -> usize;

    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Logistic,
    RandomForest,
    GradientBoosting,
    HistogramBoosting,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Logistic,
        ModelKind::RandomForest,
        ModelKind::GradientBoosting,
        ModelKind::HistogramBoosting,
    ];

    /// Stable identifier, also used for artifact file names
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Logistic => "logistic",
            ModelKind::RandomForest => "random_forest",
            ModelKind::GradientBoosting => "gradient_boosting",
            ModelKind::HistogramBoosting => "histogram_boosting",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::Logistic => "Logistic Regression",
            ModelKind::RandomForest => "Random Forest",
            ModelKind::GradientBoosting => "Gradient Boosting",
            ModelKind::HistogramBoosting => "Histogram Boosting",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn needs_standardization(&self) -> bool {
        matches!(self, ModelKind::Logistic)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A fitted model of any kind
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model", rename_all = "snake_case")]
pub enum TrainedModel {
    Logistic(LogisticModel),
    RandomForest(RandomForest),
    GradientBoosting(BoostedTrees),
    HistogramBoosting(BoostedTrees),
}

impl TrainedModel {
    /// Fit one model. Rows must already be standardized when the kind needs it.
    pub fn fit(
        kind: ModelKind,
        rows: &[Vec<f64>],
        labels: &[bool],
        config: &ModelsConfig,
        seed: u64,
    ) -> Result<Self> {
        let model = match kind {
            ModelKind::Logistic => {
                TrainedModel::Logistic(LogisticModel::fit(rows, labels, &config.logistic)?)
            }
            ModelKind::RandomForest => {
                TrainedModel::RandomForest(RandomForest::fit(rows, labels, &config.forest, seed)?)
            }
            ModelKind::GradientBoosting => TrainedModel::GradientBoosting(BoostedTrees::fit(
                rows,
                labels,
                &config.gradient_boosting,
                seed,
            )?),
            ModelKind::HistogramBoosting => TrainedModel::HistogramBoosting(BoostedTrees::fit(
                rows,
                labels,
                &config.histogram_boosting,
                seed,
            )?),
        };
        Ok(model)
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            TrainedModel::Logistic(_) => ModelKind::Logistic,
            TrainedModel::RandomForest(_) => ModelKind::RandomForest,
            TrainedModel::GradientBoosting(_) => ModelKind::GradientBoosting,
            TrainedModel::HistogramBoosting(_) => ModelKind::HistogramBoosting,
        }
    }

    fn classifier(&self) -> &dyn ProbabilisticClassifier {
        match self {
            TrainedModel::Logistic(m) => m as &dyn ProbabilisticClassifier,
            TrainedModel::RandomForest(m) => m,
            TrainedModel::GradientBoosting(m) | TrainedModel::HistogramBoosting(m) => m,
        }
    }

    /// Check the model can consume rows of `width` features
    pub fn check_width(&self, width: usize) -> Result<()> {
        let expected = self.n_features();
        let importances = self.feature_importances().map_or(width, |v| v.len());
        if expected != width || importances != width {
            return Err(PredictError::FeatureWidth {
                expected,
                actual: width,
            });
        }
        Ok(())
    }
}

impl ProbabilisticClassifier for TrainedModel {
    fn predict_proba(&self, row: &[f64]) -> Result<f64> {
        self.classifier().predict_proba(row)
    }

    fn predict_proba_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        self.classifier().predict_proba_rows(rows)
    }

    fn n_features(&self) -> usize {
        self.classifier().n_features()
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.classifier().feature_importances()
    }
}

/// Validate a training set and return its width
pub(crate) fn check_rows(model: &str, rows: &[Vec<f64>], labels: &[bool]) -> Result<usize> {
    let width = rows.first().map_or(0, Vec::len);
    if rows.is_empty() || width == 0 || rows.len() != labels.len() {
        return Err(PredictError::Training(format!(
            "{} needs matching non-empty rows and labels, got {} and {}",
            model,
            rows.len(),
            labels.len()
        )));
    }
    check_widths(rows, width)?;
    Ok(width)
}

pub(crate) fn check_widths(rows: &[Vec<f64>], width: usize) -> Result<()> {
    match rows.iter().find(|row| row.len() != width) {
        Some(row) => Err(PredictError::FeatureWidth {
            expected: width,
            actual: row.len(),
        }),
        None => Ok(()),
    }
}

/// Row-major matrix for the smartcore estimators
pub(crate) fn to_matrix(rows: &[Vec<f64>], width: usize) -> Result<DenseMatrix<f64>> {
    check_widths(rows, width)?;
    let values: Vec<f64> = rows.iter().flatten().copied().collect();
    DenseMatrix::new(rows.len(), width, values, false)
        .map_err(|e| PredictError::Training(format!("cannot build feature matrix: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_logistic_needs_standardization() {
        let flagged: Vec<ModelKind> = ModelKind::ALL
            .into_iter()
            .filter(ModelKind::needs_standardization)
            .collect();
        assert_eq!(flagged, vec![ModelKind::Logistic]);
    }

    #[test]
    fn test_names_roundtrip() {
        for kind in ModelKind::ALL {
            assert_eq!(ModelKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ModelKind::from_name("svm"), None);
    }

    #[test]
    fn test_fit_dispatch_and_width_check() {
        let rows: Vec<Vec<f64>> = (0..30)
            .map(|i| vec![f64::from(i % 6), f64::from(i % 4), 1.0])
            .collect();
        let labels: Vec<bool> = rows.iter().map(|r| r[0] >= 3.0).collect();
        let mut config = ModelsConfig::default();
        config.forest.n_trees = 5;
        config.gradient_boosting.n_rounds = 5;
        config.histogram_boosting.n_rounds = 5;
        config.logistic.epochs = 10;

        for kind in ModelKind::ALL {
            let model = TrainedModel::fit(kind, &rows, &labels, &config, 42).unwrap();
            assert_eq!(model.kind(), kind);
            assert_eq!(model.n_features(), 3);
            assert!(model.check_width(3).is_ok());
            assert!(model.check_width(12).is_err());
            let p = model.predict_proba(&[5.0, 0.0, 1.0]).unwrap();
            assert!((0.0..=1.0).contains(&p));
            assert!(matches!(
                model.predict_proba(&[5.0, 0.0]),
                Err(PredictError::FeatureWidth { .. })
            ));
        }
    }
}
