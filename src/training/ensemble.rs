//! Training and combining the model set
//!
//! Every model is fitted independently on the same stratified training split
//! and scored once on the held-out rows. Their probabilities are combined with
//! weights derived from those held-out scores.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::metrics::{ConfusionMatrix, ModelMetrics};
use super::split::{complement, stratified_folds, stratified_split};
use crate::features::{FeatureLayout, FeatureVector, FeatureVectorBuilder};
use crate::model::{ModelKind, ProbabilisticClassifier, Standardizer, TrainedModel};
use crate::{MatchRecord, ModelsConfig, PredictError, Result, Side, TrainingConfig};

/// Labelled feature rows in one layout
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub layout: FeatureLayout,
    pub rows: Vec<Vec<f64>>,
    /// True when the first team won
    pub labels: Vec<bool>,
}

impl TrainingSet {
    /// One row per record whose teams both have statistics
    pub fn from_records(records: &[MatchRecord], builder: &FeatureVectorBuilder) -> Self {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for record in records {
            if let Some(vector) = builder.build_for_record(record) {
                rows.push(vector.values);
                labels.push(record.winner == Side::One);
            }
        }

        log::info!(
            "Built {} training rows from {} records ({} features)",
            rows.len(),
            records.len(),
            builder.layout().width()
        );

        TrainingSet {
            layout: builder.layout(),
            rows,
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn select(&self, indices: &[usize]) -> (Vec<Vec<f64>>, Vec<bool>) {
        (
            indices.iter().map(|&i| self.rows[i].clone()).collect(),
            indices.iter().map(|&i| self.labels[i]).collect(),
        )
    }
}

/// Normalized per-model weights, summing to one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnsembleWeights(BTreeMap<ModelKind, f64>);

impl EnsembleWeights {
    pub fn uniform(kinds: &[ModelKind]) -> Self {
        let w = 1.0 / kinds.len().max(1) as f64;
        EnsembleWeights(kinds.iter().map(|&k| (k, w)).collect())
    }

    /// Weight each model by (F1 + accuracy) / 2, normalized
    ///
    /// A model without metrics gets the uniform share 1/k before
    /// normalization; an all-zero total falls back to uniform weights.
    pub fn from_metrics(kinds: &[ModelKind], metrics: &BTreeMap<ModelKind, ModelMetrics>) -> Self {
        let uniform = 1.0 / kinds.len().max(1) as f64;
        let raw: BTreeMap<ModelKind, f64> = kinds
            .iter()
            .map(|&k| {
                let score = metrics.get(&k).map_or(uniform, ModelMetrics::weight_score);
                (k, score.max(0.0))
            })
            .collect();

        let total: f64 = raw.values().sum();
        if total <= 0.0 || !total.is_finite() {
            return Self::uniform(kinds);
        }
        EnsembleWeights(raw.into_iter().map(|(k, v)| (k, v / total)).collect())
    }

    pub fn get(&self, kind: ModelKind) -> f64 {
        self.0.get(&kind).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelKind, f64)> + '_ {
        self.0.iter().map(|(&k, &w)| (k, w))
    }

    pub fn as_map(&self) -> &BTreeMap<ModelKind, f64> {
        &self.0
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }
}

/// A trained model set with its scaler, metrics and weights
#[derive(Debug)]
pub struct ModelEnsemble {
    layout: FeatureLayout,
    scaler: Standardizer,
    models: BTreeMap<ModelKind, TrainedModel>,
    metrics: BTreeMap<ModelKind, ModelMetrics>,
    weights: EnsembleWeights,
}

struct FittedModel {
    model: TrainedModel,
    metrics: ModelMetrics,
}

impl ModelEnsemble {
    /// Split, standardize, then fit and score every model
    pub fn train(
        set: &TrainingSet,
        models_config: &ModelsConfig,
        training: &TrainingConfig,
    ) -> Result<Self> {
        if set.is_empty() {
            return Err(PredictError::Training("no training rows".to_string()));
        }
        let width = set.layout.width();
        if let Some(row) = set.rows.iter().find(|r| r.len() != width) {
            return Err(PredictError::FeatureWidth {
                expected: width,
                actual: row.len(),
            });
        }

        let split = stratified_split(&set.labels, training.test_fraction, training.seed)?;
        let (train_raw, train_labels) = set.select(&split.train);
        let (test_raw, test_labels) = set.select(&split.test);
        log::info!(
            "Training on {} rows, holding out {}",
            train_raw.len(),
            test_raw.len()
        );

        // Fitted once and shared read-only by every model
        let scaler = Standardizer::fit(&train_raw)?;
        let train_std = scaler.transform_all(&train_raw)?;
        let test_std = scaler.transform_all(&test_raw)?;

        let fit_one = |kind: ModelKind| -> Result<(ModelKind, FittedModel)> {
            let (train_rows, test_rows) = if kind.needs_standardization() {
                (&train_std, &test_std)
            } else {
                (&train_raw, &test_raw)
            };

            let model = TrainedModel::fit(kind, train_rows, &train_labels, models_config, training.seed)?;
            let probs = model.predict_proba_rows(test_rows)?;
            let cv_scores = cross_validate(kind, train_rows, &train_labels, models_config, training)?;
            let metrics = ModelMetrics::evaluate(&test_labels, &probs).with_cv_scores(&cv_scores);

            log::info!("{}: {}", kind, metrics);
            Ok((kind, FittedModel { model, metrics }))
        };

        let fitted: Vec<(ModelKind, FittedModel)> = if training.parallel {
            ModelKind::ALL
                .par_iter()
                .map(|&kind| fit_one(kind))
                .collect::<Result<Vec<_>>>()?
        } else {
            ModelKind::ALL
                .iter()
                .map(|&kind| fit_one(kind))
                .collect::<Result<Vec<_>>>()?
        };

        let mut models = BTreeMap::new();
        let mut metrics = BTreeMap::new();
        for (kind, fitted) in fitted {
            models.insert(kind, fitted.model);
            metrics.insert(kind, fitted.metrics);
        }

        Self::from_parts(set.layout, scaler, models, metrics)
    }

    /// Reassemble a trained ensemble, checking every part agrees on the layout
    pub fn from_parts(
        layout: FeatureLayout,
        scaler: Standardizer,
        models: BTreeMap<ModelKind, TrainedModel>,
        metrics: BTreeMap<ModelKind, ModelMetrics>,
    ) -> Result<Self> {
        if models.is_empty() {
            return Err(PredictError::Training("ensemble has no models".to_string()));
        }
        let width = layout.width();
        if scaler.width() != width {
            return Err(PredictError::FeatureWidth {
                expected: width,
                actual: scaler.width(),
            });
        }
        for (kind, model) in &models {
            if model.kind() != *kind {
                return Err(PredictError::Training(format!(
                    "model stored as {} is a {}",
                    kind,
                    model.kind()
                )));
            }
            model.check_width(width)?;
        }

        let kinds: Vec<ModelKind> = models.keys().copied().collect();
        let weights = EnsembleWeights::from_metrics(&kinds, &metrics);

        Ok(ModelEnsemble {
            layout,
            scaler,
            models,
            metrics,
            weights,
        })
    }

    /// (P(first team wins), P(second team wins)) from every model
    pub fn predict_proba(&self, vector: &FeatureVector) -> Result<BTreeMap<ModelKind, (f64, f64)>> {
        if vector.layout != self.layout {
            return Err(PredictError::FeatureWidth {
                expected: self.layout.width(),
                actual: vector.len(),
            });
        }
        let raw = vector.as_slice();
        let standardized = self.scaler.transform(raw)?;

        self.models
            .iter()
            .map(|(&kind, model)| {
                let row = if kind.needs_standardization() {
                    standardized.as_slice()
                } else {
                    raw
                };
                let p = model.predict_proba(row)?;
                Ok((kind, (p, 1.0 - p)))
            })
            .collect()
    }

    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    pub fn scaler(&self) -> &Standardizer {
        &self.scaler
    }

    pub fn models(&self) -> &BTreeMap<ModelKind, TrainedModel> {
        &self.models
    }

    pub fn metrics(&self) -> &BTreeMap<ModelKind, ModelMetrics> {
        &self.metrics
    }

    pub fn weights(&self) -> &EnsembleWeights {
        &self.weights
    }

    /// Named feature importances per model, largest first
    pub fn feature_importances(&self) -> BTreeMap<ModelKind, Vec<(&'static str, f64)>> {
        let names = self.layout.names();
        self.models
            .iter()
            .filter_map(|(&kind, model)| {
                let mut named: Vec<(&'static str, f64)> = names
                    .iter()
                    .copied()
                    .zip(model.feature_importances()?)
                    .collect();
                named.sort_by(|a, b| b.1.total_cmp(&a.1));
                Some((kind, named))
            })
            .collect()
    }
}

/// Stratified k-fold accuracy on the training rows
fn cross_validate(
    kind: ModelKind,
    rows: &[Vec<f64>],
    labels: &[bool],
    models_config: &ModelsConfig,
    training: &TrainingConfig,
) -> Result<Vec<f64>> {
    let folds = match stratified_folds(labels, training.cv_folds, training.seed) {
        Ok(folds) => folds,
        Err(e) => {
            log::warn!("Skipping cross-validation for {}: {}", kind, e);
            return Ok(Vec::new());
        }
    };

    let mut scores = Vec::with_capacity(folds.len());
    for held_out in &folds {
        let train_idx = complement(held_out, rows.len());
        let fold_rows: Vec<Vec<f64>> = train_idx.iter().map(|&i| rows[i].clone()).collect();
        let fold_labels: Vec<bool> = train_idx.iter().map(|&i| labels[i]).collect();

        let model = TrainedModel::fit(kind, &fold_rows, &fold_labels, models_config, training.seed)?;
        let held_labels: Vec<bool> = held_out.iter().map(|&i| labels[i]).collect();
        let held_rows: Vec<Vec<f64>> = held_out.iter().map(|&i| rows[i].clone()).collect();
        let probs = model.predict_proba_rows(&held_rows)?;
        scores.push(ConfusionMatrix::from_predictions(&held_labels, &probs).accuracy());
    }

    log::debug!("{} cross-validation accuracies: {:?}", kind, scores);
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(accuracy: f64, f1: f64) -> ModelMetrics {
        ModelMetrics {
            accuracy,
            f1,
            ..ModelMetrics::default()
        }
    }

    fn quick_config() -> ModelsConfig {
        let mut config = ModelsConfig::default();
        config.forest.n_trees = 10;
        config.gradient_boosting.n_rounds = 10;
        config.histogram_boosting.n_rounds = 10;
        config.logistic.epochs = 200;
        config
    }

    /// Rows where the first feature decides the label; the rest carry no signal
    fn synthetic_set(n: usize) -> TrainingSet {
        let width = FeatureLayout::Basic.width();
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let mut row: Vec<f64> = (0..width).map(|j| ((i / 10) % 3 + j) as f64).collect();
                row[0] = (i % 10) as f64 / 10.0;
                row
            })
            .collect();
        let labels = rows.iter().map(|r| r[0] >= 0.5).collect();
        TrainingSet {
            layout: FeatureLayout::Basic,
            rows,
            labels,
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let mut m = BTreeMap::new();
        m.insert(ModelKind::Logistic, metrics(0.7, 0.6));
        m.insert(ModelKind::RandomForest, metrics(0.8, 0.8));
        m.insert(ModelKind::GradientBoosting, metrics(0.5, 0.0));
        m.insert(ModelKind::HistogramBoosting, metrics(0.9, 0.9));
        let weights = EnsembleWeights::from_metrics(&ModelKind::ALL, &m);
        assert!((weights.total() - 1.0).abs() < 1e-12);
        assert!(weights.get(ModelKind::HistogramBoosting) > weights.get(ModelKind::RandomForest));
        assert!((weights.get(ModelKind::Logistic) - 0.65 / 2.6).abs() < 1e-12);
    }

    #[test]
    fn test_weights_uniform_without_metrics() {
        let weights = EnsembleWeights::from_metrics(&ModelKind::ALL, &BTreeMap::new());
        for (_, w) in weights.iter() {
            assert!((w - 0.25).abs() < 1e-12);
        }

        let mut zero = BTreeMap::new();
        for kind in ModelKind::ALL {
            zero.insert(kind, ModelMetrics::default());
        }
        let weights = EnsembleWeights::from_metrics(&ModelKind::ALL, &zero);
        assert_eq!(weights, EnsembleWeights::uniform(&ModelKind::ALL));
    }

    #[test]
    fn test_train_and_predict() {
        let set = synthetic_set(100);
        let training = TrainingConfig {
            parallel: false,
            ..TrainingConfig::default()
        };
        let ensemble = ModelEnsemble::train(&set, &quick_config(), &training).unwrap();

        assert_eq!(ensemble.models().len(), 4);
        assert_eq!(ensemble.metrics().len(), 4);
        assert!((ensemble.weights().total() - 1.0).abs() < 1e-9);
        for m in ensemble.metrics().values() {
            assert!(m.accuracy > 0.8);
            assert!(m.cv_mean > 0.0);
        }

        let mut high = set.rows[0].clone();
        high[0] = 0.9;
        let vector = FeatureVector {
            layout: FeatureLayout::Basic,
            values: high,
        };
        let probs = ensemble.predict_proba(&vector).unwrap();
        for (p_first, p_second) in probs.values() {
            assert!((p_first + p_second - 1.0).abs() < 1e-12);
        }

        let importances = ensemble.feature_importances();
        let forest = &importances[&ModelKind::RandomForest];
        assert_eq!(forest.len(), 12);
        assert_eq!(forest[0].0, "win_rate_a");
    }

    #[test]
    fn test_parallel_training_matches_sequential() {
        let set = synthetic_set(60);
        let sequential = TrainingConfig {
            parallel: false,
            ..TrainingConfig::default()
        };
        let parallel = TrainingConfig {
            parallel: true,
            ..TrainingConfig::default()
        };
        let a = ModelEnsemble::train(&set, &quick_config(), &sequential).unwrap();
        let b = ModelEnsemble::train(&set, &quick_config(), &parallel).unwrap();
        assert_eq!(a.metrics(), b.metrics());
        assert_eq!(a.weights(), b.weights());
    }

    #[test]
    fn test_wrong_layout_is_rejected() {
        let set = synthetic_set(60);
        let training = TrainingConfig {
            parallel: false,
            ..TrainingConfig::default()
        };
        let ensemble = ModelEnsemble::train(&set, &quick_config(), &training).unwrap();
        let vector = FeatureVector {
            layout: FeatureLayout::WithMap,
            values: vec![0.0; 15],
        };
        assert!(matches!(
            ensemble.predict_proba(&vector),
            Err(PredictError::FeatureWidth { expected: 12, actual: 15 })
        ));
    }

    #[test]
    fn test_empty_set_fails() {
        let set = TrainingSet {
            layout: FeatureLayout::Basic,
            rows: Vec::new(),
            labels: Vec::new(),
        };
        assert!(ModelEnsemble::train(&set, &quick_config(), &TrainingConfig::default()).is_err());
    }
}
