//! Feature standardization (z-score)

use serde::{Deserialize, Serialize};

use crate::{PredictError, Result};

/// Per-feature mean and standard deviation fitted on a training split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl Standardizer {
    /// Fit on training rows. Constant features keep a std of 1.0.
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let width = match rows.first() {
            Some(row) => row.len(),
            None => {
                return Err(PredictError::Training(
                    "cannot fit a standardizer on zero rows".to_string(),
                ))
            }
        };

        let n = rows.len() as f64;
        let mut mean = vec![0.0; width];
        for row in rows {
            check_width(width, row.len())?;
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut var = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *s += (v - m) * (v - m);
            }
        }
        let std = var
            .into_iter()
            .map(|s| {
                let sd = (s / n).sqrt();
                if sd > 0.0 {
                    sd
                } else {
                    1.0
                }
            })
            .collect();

        Ok(Standardizer { mean, std })
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    /// Standardize one row, rejecting rows of the wrong width
    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        check_width(self.width(), row.len())?;
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|row| self.transform(row)).collect()
    }
}

fn check_width(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(PredictError::FeatureWidth { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_and_transform() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = Standardizer::fit(&rows).unwrap();
        assert_eq!(scaler.mean, vec![2.0, 5.0]);
        assert_eq!(scaler.std, vec![1.0, 1.0]);
        assert_eq!(scaler.transform(&[3.0, 5.0]).unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_width_guard() {
        let scaler = Standardizer::fit(&[vec![0.0; 15]]).unwrap();
        match scaler.transform(&[0.0; 12]) {
            Err(PredictError::FeatureWidth { expected, actual }) => {
                assert_eq!(expected, 15);
                assert_eq!(actual, 12);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_fit_fails() {
        assert!(Standardizer::fit(&[]).is_err());
    }
}
