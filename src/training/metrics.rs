//! Evaluation metrics for binary classifiers

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::model::ModelKind;
use crate::{PredictError, Result};

/// Probability above which a row is predicted as a first-team win
pub const DECISION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(labels: &[bool], probs: &[f64]) -> Self {
        let mut matrix = ConfusionMatrix::default();
        for (&y, &p) in labels.iter().zip(probs) {
            match (y, p > DECISION_THRESHOLD) {
                (true, true) => matrix.true_positives += 1,
                (false, true) => matrix.false_positives += 1,
                (false, false) => matrix.true_negatives += 1,
                (true, false) => matrix.false_negatives += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn accuracy(&self) -> f64 {
        safe_div(
            (self.true_positives + self.true_negatives) as f64,
            self.total() as f64,
        )
    }

    pub fn precision(&self) -> f64 {
        safe_div(
            self.true_positives as f64,
            (self.true_positives + self.false_positives) as f64,
        )
    }

    pub fn recall(&self) -> f64 {
        safe_div(
            self.true_positives as f64,
            (self.true_positives + self.false_negatives) as f64,
        )
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        safe_div(2.0 * p * r, p + r)
    }
}

/// Zero-division yields 0.0
fn safe_div(num: f64, denom: f64) -> f64 {
    if denom == 0.0 {
        0.0
    } else {
        num / denom
    }
}

/// Area under the ROC curve via average ranks (ties share their mean rank)
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> Result<f64> {
    if labels.len() != scores.len() {
        return Err(PredictError::DegenerateMetric {
            metric: "auc",
            reason: format!("{} labels for {} scores", labels.len(), scores.len()),
        });
    }
    let positives = labels.iter().filter(|&&y| y).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(PredictError::DegenerateMetric {
            metric: "auc",
            reason: format!(
                "needs both classes, got {} positive and {} negative",
                positives, negatives
            ),
        });
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; the tied block shares the mean of start+1..=end+1
        let mean_rank = (start + end) as f64 / 2.0 + 1.0;
        rank_sum += order[start..=end]
            .iter()
            .filter(|&&i| labels[i])
            .count() as f64
            * mean_rank;
        start = end + 1;
    }

    let pos = positives as f64;
    let neg = negatives as f64;
    Ok((rank_sum - pos * (pos + 1.0) / 2.0) / (pos * neg))
}

/// Held-out and cross-validated performance of one model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// 0.0 when undefined on the held-out split
    pub auc: f64,
    pub cv_mean: f64,
    pub cv_std: f64,
}

impl ModelMetrics {
    /// Score held-out predictions; cross-validation fields are left at zero
    pub fn evaluate(labels: &[bool], probs: &[f64]) -> Self {
        let matrix = ConfusionMatrix::from_predictions(labels, probs);
        let auc = match roc_auc(labels, probs) {
            Ok(auc) => auc,
            Err(e) => {
                log::warn!("{}, reporting 0.0", e);
                0.0
            }
        };

        ModelMetrics {
            accuracy: matrix.accuracy(),
            precision: matrix.precision(),
            recall: matrix.recall(),
            f1: matrix.f1(),
            auc,
            cv_mean: 0.0,
            cv_std: 0.0,
        }
    }

    pub fn with_cv_scores(mut self, scores: &[f64]) -> Self {
        let (mean, std) = mean_std(scores);
        self.cv_mean = mean;
        self.cv_std = std;
        self
    }

    /// Ensemble weight basis: mean of F1 and accuracy
    pub fn weight_score(&self) -> f64 {
        (self.f1 + self.accuracy) / 2.0
    }
}

impl fmt::Display for ModelMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Acc: {:.2}% | Prec: {:.2}% | Rec: {:.2}% | F1: {:.2}% | AUC: {:.3} | CV: {:.2}% (+/- {:.2}%)",
            self.accuracy * 100.0,
            self.precision * 100.0,
            self.recall * 100.0,
            self.f1 * 100.0,
            self.auc,
            self.cv_mean * 100.0,
            self.cv_std * 100.0
        )
    }
}

/// Population mean and standard deviation
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Plain-text summary of every model's metrics, with weights when given
pub fn format_metrics_table(
    metrics: &BTreeMap<ModelKind, ModelMetrics>,
    weights: Option<&BTreeMap<ModelKind, f64>>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<22} {:>8} {:>9} {:>8} {:>8} {:>7} {:>16} {:>8}\n",
        "Model", "Acc", "Prec", "Recall", "F1", "AUC", "CV", "Weight"
    ));
    out.push_str(&"-".repeat(94));
    out.push('\n');

    for (kind, m) in metrics {
        let weight = weights
            .and_then(|w| w.get(kind))
            .map_or_else(|| "-".to_string(), |w| format!("{:.3}", w));
        out.push_str(&format!(
            "{:<22} {:>7.2}% {:>8.2}% {:>7.2}% {:>7.2}% {:>7.3} {:>7.2}% +/-{:>5.2}% {:>8}\n",
            kind.display_name(),
            m.accuracy * 100.0,
            m.precision * 100.0,
            m.recall * 100.0,
            m.f1 * 100.0,
            m.auc,
            m.cv_mean * 100.0,
            m.cv_std * 100.0,
            weight
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_metrics() {
        let labels = [true, true, false, false, true];
        let probs = [0.9, 0.4, 0.6, 0.1, 0.7];
        let m = ConfusionMatrix::from_predictions(&labels, &probs);
        assert_eq!(m.true_positives, 2);
        assert_eq!(m.false_negatives, 1);
        assert_eq!(m.false_positives, 1);
        assert_eq!(m.true_negatives, 1);
        assert_eq!(m.accuracy(), 0.6);
        assert!((m.precision() - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_is_strict() {
        let m = ConfusionMatrix::from_predictions(&[true], &[0.5]);
        assert_eq!(m.false_negatives, 1);
    }

    #[test]
    fn test_zero_division_is_zero() {
        // Never predicts positive
        let m = ConfusionMatrix::from_predictions(&[true, false], &[0.1, 0.2]);
        assert_eq!(m.precision(), 0.0);
        assert_eq!(m.f1(), 0.0);
        assert_eq!(ConfusionMatrix::default().accuracy(), 0.0);
    }

    #[test]
    fn test_auc_with_ties() {
        assert_eq!(roc_auc(&[false, false, true, true], &[0.1, 0.4, 0.35, 0.8]).unwrap(), 0.75);
        assert_eq!(roc_auc(&[false, true], &[0.5, 0.5]).unwrap(), 0.5);
        assert_eq!(roc_auc(&[false, true], &[0.2, 0.9]).unwrap(), 1.0);
    }

    #[test]
    fn test_degenerate_auc_recovered() {
        assert!(matches!(
            roc_auc(&[true, true], &[0.3, 0.9]),
            Err(PredictError::DegenerateMetric { metric: "auc", .. })
        ));
        let metrics = ModelMetrics::evaluate(&[true, true], &[0.3, 0.9]);
        assert_eq!(metrics.auc, 0.0);
        assert_eq!(metrics.accuracy, 0.5);
    }

    #[test]
    fn test_mean_std_population() {
        let (mean, std) = mean_std(&[0.6, 0.8]);
        assert!((mean - 0.7).abs() < 1e-12);
        assert!((std - 0.1).abs() < 1e-12);
        assert_eq!(mean_std(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_metrics_table_lists_models() {
        let mut metrics = BTreeMap::new();
        metrics.insert(ModelKind::RandomForest, ModelMetrics::default());
        metrics.insert(ModelKind::Logistic, ModelMetrics::default());
        let table = format_metrics_table(&metrics, None);
        assert!(table.contains("Random Forest"));
        assert!(table.lines().nth(2).unwrap().starts_with("Logistic Regression"));
    }
}
