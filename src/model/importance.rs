//! Feature importances that work for any fitted model

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::ProbabilisticClassifier;
use crate::Result;

/// Permutation importance on the given rows
///
/// Each column is shuffled in turn and scored by the mean absolute shift in
/// predicted probability. The result is normalized to sum to one.
pub fn permutation_importances<M>(model: &M, rows: &[Vec<f64>], seed: u64) -> Result<Vec<f64>>
where
    M: ProbabilisticClassifier + ?Sized,
{
    let width = model.n_features();
    if rows.is_empty() {
        return Ok(vec![0.0; width]);
    }
    let baseline = model.predict_proba_rows(rows)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut importances = Vec::with_capacity(width);
    for column in 0..width {
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.shuffle(&mut rng);

        let permuted: Vec<Vec<f64>> = rows
            .iter()
            .zip(&order)
            .map(|(row, &source)| {
                let mut row = row.clone();
                row[column] = rows[source][column];
                row
            })
            .collect();
        let shifted = model.predict_proba_rows(&permuted)?;

        let shift: f64 = baseline
            .iter()
            .zip(&shifted)
            .map(|(a, b)| (a - b).abs())
            .sum();
        importances.push(shift / rows.len() as f64);
    }

    Ok(normalize_importances(importances))
}

/// Scale importances to sum to one, leaving all-zero vectors alone
pub fn normalize_importances(mut importances: Vec<f64>) -> Vec<f64> {
    let total: f64 = importances.iter().sum();
    if total > 0.0 {
        for v in &mut importances {
            *v /= total;
        }
    }
    importances
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reads only the first column
    struct FirstColumn;

    impl ProbabilisticClassifier for FirstColumn {
        fn predict_proba(&self, row: &[f64]) -> Result<f64> {
            Ok(if row[0] > 0.5 { 0.9 } else { 0.1 })
        }

        fn n_features(&self) -> usize {
            3
        }
    }

    #[test]
    fn test_unused_columns_score_zero() {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![f64::from(i % 2), f64::from(i), 7.0])
            .collect();
        let importances = permutation_importances(&FirstColumn, &rows, 42).unwrap();
        assert_eq!(importances.len(), 3);
        assert!((importances[0] - 1.0).abs() < 1e-12);
        assert_eq!(importances[1], 0.0);
        assert_eq!(importances[2], 0.0);
    }

    #[test]
    fn test_importances_are_seeded() {
        let rows: Vec<Vec<f64>> = (0..25)
            .map(|i| vec![f64::from(i % 3) / 2.0, 1.0, 2.0])
            .collect();
        let a = permutation_importances(&FirstColumn, &rows, 3).unwrap();
        let b = permutation_importances(&FirstColumn, &rows, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_leaves_zeros() {
        assert_eq!(normalize_importances(vec![0.0, 0.0]), vec![0.0, 0.0]);
        assert_eq!(normalize_importances(vec![1.0, 3.0]), vec![0.25, 0.75]);
    }
}
