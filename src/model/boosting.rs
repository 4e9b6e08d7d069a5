//! Gradient boosted trees on smartcore's XGBoost regressor
//!
//! Second-order boosting of the 0/1 win label from a 0.5 base score, with
//! outputs clamped into [0, 1]. The exact variant splits on raw feature
//! values. The histogram variant first buckets every feature into quantile
//! bins and caps tree depth so no tree exceeds the leaf limit.

use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::xgboost::{XGRegressor, XGRegressorParameters};

use super::importance::permutation_importances;
use super::{check_rows, check_widths, to_matrix, ProbabilisticClassifier};
use crate::{PredictError, Result};

type Booster = XGRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingConfig {
    pub n_rounds: usize,
    pub max_depth: u16,
    pub learning_rate: f64,
    /// L2 penalty on leaf values
    pub lambda: f64,
    /// Minimum hessian sum in a child
    pub min_child_weight: usize,
    /// Fraction of rows sampled per round
    pub subsample: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bins: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_leaves: Option<usize>,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        BoostingConfig {
            n_rounds: 100,
            max_depth: 6,
            learning_rate: 0.1,
            lambda: 1.0,
            min_child_weight: 1,
            subsample: 1.0,
            max_bins: None,
            max_leaves: None,
        }
    }
}

impl BoostingConfig {
    /// Quantile-binned settings with a leaf cap
    pub fn histogram() -> Self {
        BoostingConfig {
            max_bins: Some(32),
            max_leaves: Some(31),
            ..Self::default()
        }
    }

    /// Depth actually grown: the deepest full tree within the leaf cap
    pub fn effective_depth(&self) -> u16 {
        match self.max_leaves {
            Some(leaves) if leaves >= 2 => {
                let capped = (usize::BITS - 1 - leaves.leading_zeros()) as u16;
                self.max_depth.min(capped)
            }
            Some(_) => 0,
            None => self.max_depth,
        }
    }
}

/// Per-feature upper bin edges fitted on the training rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileBins {
    edges: Vec<Vec<f64>>,
}

impl QuantileBins {
    pub fn fit(rows: &[Vec<f64>], max_bins: usize) -> Self {
        let width = rows.first().map_or(0, Vec::len);
        let max_bins = max_bins.max(2);
        let edges = (0..width)
            .map(|column| {
                let mut values: Vec<f64> = rows.iter().map(|row| row[column]).collect();
                values.sort_by(f64::total_cmp);
                values.dedup();
                if values.len() <= max_bins {
                    values.pop();
                    return values;
                }
                let mut edges: Vec<f64> = (1..max_bins)
                    .map(|k| values[k * values.len() / max_bins])
                    .collect();
                edges.dedup();
                edges
            })
            .collect();
        QuantileBins { edges }
    }

    /// Replace every value by its bin index
    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.edges)
            .map(|(&v, edges)| edges.partition_point(|&e| e < v) as f64)
            .collect()
    }

    pub fn n_bins(&self, column: usize) -> usize {
        self.edges.get(column).map_or(0, |e| e.len() + 1)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BoostedTrees {
    booster: Booster,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bins: Option<QuantileBins>,
    n_features: usize,
    importances: Vec<f64>,
}

impl BoostedTrees {
    pub fn fit(rows: &[Vec<f64>], labels: &[bool], config: &BoostingConfig, seed: u64) -> Result<Self> {
        let n_features = check_rows("boosting", rows, labels)?;
        if (rows.len() as f64 * config.subsample) < 1.0 {
            return Err(PredictError::Training(format!(
                "boosting subsample {} leaves no rows out of {}",
                config.subsample,
                rows.len()
            )));
        }

        let bins = config.max_bins.map(|max_bins| QuantileBins::fit(rows, max_bins));
        let inputs: Vec<Vec<f64>> = match &bins {
            Some(bins) => rows.iter().map(|row| bins.transform(row)).collect(),
            None => rows.to_vec(),
        };
        let targets: Vec<f64> = labels.iter().map(|&y| if y { 1.0 } else { 0.0 }).collect();

        let params = XGRegressorParameters::default()
            .with_n_estimators(config.n_rounds)
            .with_max_depth(config.effective_depth())
            .with_learning_rate(config.learning_rate)
            .with_lambda(config.lambda)
            .with_min_child_weight(config.min_child_weight)
            .with_subsample(config.subsample)
            .with_base_score(0.5)
            .with_seed(seed);

        let booster = Booster::fit(&to_matrix(&inputs, n_features)?, &targets, params)
            .map_err(|e| PredictError::Training(format!("boosting: {}", e)))?;

        let mut model = BoostedTrees {
            booster,
            bins,
            n_features,
            importances: Vec::new(),
        };
        model.importances = permutation_importances(&model, rows, seed)?;
        log::debug!(
            "Boosting: {} rounds at depth {} over {} rows",
            config.n_rounds,
            config.effective_depth(),
            rows.len()
        );
        Ok(model)
    }

    pub fn is_binned(&self) -> bool {
        self.bins.is_some()
    }
}

impl ProbabilisticClassifier for BoostedTrees {
    fn predict_proba(&self, row: &[f64]) -> Result<f64> {
        let probs = self.predict_proba_rows(std::slice::from_ref(&row.to_vec()))?;
        Ok(probs.first().copied().unwrap_or(0.5))
    }

    fn predict_proba_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        // Binning zips against the edges, so widths are checked on the raw rows
        check_widths(rows, self.n_features)?;
        let matrix = match &self.bins {
            Some(bins) => {
                let binned: Vec<Vec<f64>> = rows.iter().map(|row| bins.transform(row)).collect();
                to_matrix(&binned, self.n_features)?
            }
            None => to_matrix(rows, self.n_features)?,
        };
        let predictions = self
            .booster
            .predict(&matrix)
            .map_err(|e| PredictError::Training(format!("boosting prediction: {}", e)))?;
        Ok(predictions.into_iter().map(|p| p.clamp(0.0, 1.0)).collect())
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        Some(self.importances.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_data() -> (Vec<Vec<f64>>, Vec<bool>) {
        let rows: Vec<Vec<f64>> = (0..80)
            .map(|i| vec![f64::from(i % 20) / 20.0, f64::from(i % 7)])
            .collect();
        let labels = rows.iter().map(|r| r[0] > 0.45).collect();
        (rows, labels)
    }

    #[test]
    fn test_histogram_defaults() {
        let config = BoostingConfig::histogram();
        assert_eq!(config.max_bins, Some(32));
        assert_eq!(config.max_leaves, Some(31));
        assert_eq!(config.effective_depth(), 4);
        assert_eq!(BoostingConfig::default().max_leaves, None);
        assert_eq!(BoostingConfig::default().effective_depth(), 6);
    }

    #[test]
    fn test_boosting_fits_threshold() {
        let (rows, labels) = toy_data();
        for config in [BoostingConfig::default(), BoostingConfig::histogram()] {
            let model = BoostedTrees::fit(&rows, &labels, &config, 42).unwrap();
            assert_eq!(model.is_binned(), config.max_bins.is_some());
            assert!(model.predict_proba(&[0.9, 3.0]).unwrap() > 0.8);
            assert!(model.predict_proba(&[0.1, 3.0]).unwrap() < 0.2);
            let importances = model.feature_importances().unwrap();
            assert!(importances[0] > 0.9);
        }
    }

    #[test]
    fn test_boosting_is_seeded() {
        let (rows, labels) = toy_data();
        let config = BoostingConfig {
            n_rounds: 20,
            subsample: 0.8,
            ..BoostingConfig::default()
        };
        let a = BoostedTrees::fit(&rows, &labels, &config, 9).unwrap();
        let b = BoostedTrees::fit(&rows, &labels, &config, 9).unwrap();
        assert_eq!(
            a.predict_proba_rows(&rows).unwrap(),
            b.predict_proba_rows(&rows).unwrap()
        );
    }

    #[test]
    fn test_single_class_stays_in_range() {
        let rows = vec![vec![1.0], vec![2.0], vec![3.0]];
        let labels = vec![true; 3];
        let model = BoostedTrees::fit(&rows, &labels, &BoostingConfig::default(), 0).unwrap();
        let p = model.predict_proba(&[2.0]).unwrap();
        assert!(p > 0.99 && p <= 1.0);
    }

    #[test]
    fn test_quantile_bins() {
        let rows: Vec<Vec<f64>> = (0..100).map(|i| vec![f64::from(i), 1.0]).collect();
        let bins = QuantileBins::fit(&rows, 4);
        assert_eq!(bins.n_bins(0), 4);
        assert_eq!(bins.n_bins(1), 1);
        assert_eq!(bins.transform(&[0.0, 1.0]), vec![0.0, 0.0]);
        assert_eq!(bins.transform(&[99.0, 5.0]), vec![3.0, 0.0]);
        assert!(bins.transform(&[30.0, 1.0])[0] <= bins.transform(&[60.0, 1.0])[0]);
    }
}
