//! Logistic regression trained with burn
//!
//! A single `Linear` layer fitted by full-batch SGD on binary cross-entropy
//! with an L2 penalty. Weights are zero-initialised so training is
//! deterministic, then exported to plain floats for inference.

use burn::backend::{Autodiff, NdArray};
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::optim::{GradientsParams, Optimizer, SgdConfig};
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use serde::{Deserialize, Serialize};

use super::importance::normalize_importances;
use super::ProbabilisticClassifier;
use crate::{PredictError, Result};

type TrainBackend = Autodiff<NdArray<f32>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticConfig {
    pub learning_rate: f64,
    pub epochs: usize,
    /// L2 penalty on the weights (not the bias)
    pub l2: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        LogisticConfig {
            learning_rate: 0.5,
            epochs: 300,
            l2: 1e-3,
        }
    }
}

/// Fitted weights; inputs must be standardized the way the training rows were
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LogisticModel {
    pub fn fit(rows: &[Vec<f64>], labels: &[bool], config: &LogisticConfig) -> Result<Self> {
        let n = rows.len();
        let d = rows.first().map_or(0, Vec::len);
        if n == 0 || d == 0 || n != labels.len() {
            return Err(PredictError::Training(format!(
                "logistic regression needs matching non-empty rows and labels, got {} and {}",
                n,
                labels.len()
            )));
        }

        let device = <TrainBackend as Backend>::Device::default();

        let flat: Vec<f32> = rows
            .iter()
            .flat_map(|row| row.iter().map(|&v| v as f32))
            .collect();
        if flat.len() != n * d {
            return Err(PredictError::Training("ragged training rows".to_string()));
        }
        let targets: Vec<f32> = labels.iter().map(|&y| if y { 1.0 } else { 0.0 }).collect();

        let inputs = Tensor::<TrainBackend, 2>::from_data(TensorData::new(flat, [n, d]), &device);
        let targets = Tensor::<TrainBackend, 2>::from_data(TensorData::new(targets, [n, 1]), &device);

        let mut model: Linear<TrainBackend> = LinearConfig::new(d, 1)
            .with_initializer(Initializer::Zeros)
            .init(&device);
        let mut optimizer = SgdConfig::new().init::<TrainBackend, Linear<TrainBackend>>();

        for epoch in 0..config.epochs {
            let probs = sigmoid(model.forward(inputs.clone()));
            let bce = binary_cross_entropy(probs, targets.clone());
            let penalty = model
                .weight
                .val()
                .powf_scalar(2.0)
                .sum()
                .mul_scalar(config.l2 / 2.0);
            let loss = bce + penalty;

            if epoch % 50 == 0 || epoch + 1 == config.epochs {
                let loss_val: f32 = loss.clone().into_scalar().elem();
                log::debug!("Logistic epoch {}/{}: loss={:.4}", epoch + 1, config.epochs, loss_val);
            }

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(config.learning_rate, model, grads);
        }

        let weights = model
            .weight
            .val()
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| PredictError::Training(format!("cannot read weights: {:?}", e)))?;
        let bias = match &model.bias {
            Some(bias) => bias
                .val()
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| PredictError::Training(format!("cannot read bias: {:?}", e)))?
                .first()
                .copied()
                .unwrap_or(0.0),
            None => 0.0,
        };

        Ok(LogisticModel {
            weights: weights.into_iter().map(f64::from).collect(),
            bias: f64::from(bias),
        })
    }

    /// Absolute weights, which are comparable on standardized inputs
    fn weight_magnitudes(&self) -> Vec<f64> {
        let magnitudes: Vec<f64> = self.weights.iter().map(|w| w.abs()).collect();
        normalize_importances(magnitudes)
    }
}

fn binary_cross_entropy(
    probs: Tensor<TrainBackend, 2>,
    targets: Tensor<TrainBackend, 2>,
) -> Tensor<TrainBackend, 1> {
    let eps = 1e-7;
    let probs = probs.clamp(eps, 1.0 - eps);
    let loss = targets.clone().neg() * probs.clone().log()
        - (targets.neg() + 1.0) * (probs.neg() + 1.0).log();
    loss.mean()
}

impl ProbabilisticClassifier for LogisticModel {
    fn predict_proba(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.weights.len() {
            return Err(PredictError::FeatureWidth {
                expected: self.weights.len(),
                actual: row.len(),
            });
        }
        let z: f64 = self
            .weights
            .iter()
            .zip(row)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias;
        Ok(1.0 / (1.0 + (-z).exp()))
    }

    fn n_features(&self) -> usize {
        self.weights.len()
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        Some(self.weight_magnitudes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learns_separable_data() {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![(f64::from(i) - 19.5) / 10.0, 0.3])
            .collect();
        let labels: Vec<bool> = (0..40).map(|i| i >= 20).collect();

        let model = LogisticModel::fit(&rows, &labels, &LogisticConfig::default()).unwrap();
        assert_eq!(model.n_features(), 2);
        assert!(model.weights[0] > 0.0);
        assert!(model.predict_proba(&[1.5, 0.3]).unwrap() > 0.8);
        assert!(model.predict_proba(&[-1.5, 0.3]).unwrap() < 0.2);
    }

    #[test]
    fn test_training_is_deterministic() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![f64::from(i % 4), 1.0]).collect();
        let labels: Vec<bool> = (0..10).map(|i| i % 4 >= 2).collect();
        let config = LogisticConfig {
            epochs: 20,
            ..LogisticConfig::default()
        };
        let a = LogisticModel::fit(&rows, &labels, &config).unwrap();
        let b = LogisticModel::fit(&rows, &labels, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_rows_fail() {
        assert!(LogisticModel::fit(&[], &[], &LogisticConfig::default()).is_err());
    }
}
