//! Random forest on smartcore
//!
//! Regression trees are fitted to the 0/1 win label, so each leaf holds the
//! win fraction of its bootstrap samples and the forest average is a
//! probability. For a 0/1 target the variance reduction of a split is
//! proportional to its Gini decrease.

use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

use super::importance::permutation_importances;
use super::{check_rows, to_matrix, ProbabilisticClassifier};
use crate::{PredictError, Result};

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: u16,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        ForestConfig {
            n_trees: 100,
            max_depth: 10,
            min_samples_leaf: 1,
            min_samples_split: 2,
        }
    }
}

/// Bootstrapped trees with sqrt(d) candidate features per split
#[derive(Debug, Serialize, Deserialize)]
pub struct RandomForest {
    forest: Forest,
    n_features: usize,
    importances: Vec<f64>,
}

impl RandomForest {
    pub fn fit(rows: &[Vec<f64>], labels: &[bool], config: &ForestConfig, seed: u64) -> Result<Self> {
        let n_features = check_rows("random forest", rows, labels)?;
        if config.n_trees == 0 {
            return Err(PredictError::Training("random forest needs at least one tree".to_string()));
        }

        let targets: Vec<f64> = labels.iter().map(|&y| if y { 1.0 } else { 0.0 }).collect();
        let params = RandomForestRegressorParameters::default()
            .with_n_trees(config.n_trees)
            .with_max_depth(config.max_depth)
            .with_min_samples_leaf(config.min_samples_leaf.max(1))
            .with_min_samples_split(config.min_samples_split.max(2))
            .with_m(((n_features as f64).sqrt() as usize).max(1))
            .with_seed(seed);

        let forest = Forest::fit(&to_matrix(rows, n_features)?, &targets, params)
            .map_err(|e| PredictError::Training(format!("random forest: {}", e)))?;

        let mut model = RandomForest {
            forest,
            n_features,
            importances: Vec::new(),
        };
        model.importances = permutation_importances(&model, rows, seed)?;
        log::debug!("Random forest: {} trees over {} rows", config.n_trees, rows.len());
        Ok(model)
    }
}

impl ProbabilisticClassifier for RandomForest {
    fn predict_proba(&self, row: &[f64]) -> Result<f64> {
        let probs = self.predict_proba_rows(std::slice::from_ref(&row.to_vec()))?;
        Ok(probs.first().copied().unwrap_or(0.5))
    }

    fn predict_proba_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let predictions = self
            .forest
            .predict(&to_matrix(rows, self.n_features)?)
            .map_err(|e| PredictError::Training(format!("random forest prediction: {}", e)))?;
        Ok(predictions.into_iter().map(|p| p.clamp(0.0, 1.0)).collect())
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        Some(self.importances.clone())
    }
}
