//! Seeded, label-stratified train/test splits and cross-validation folds

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::{PredictError, Result};

/// Row indices of a train/test partition, each list ascending
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Indices per label, each list shuffled with the seeded rng
fn shuffled_classes(labels: &[bool], rng: &mut StdRng) -> [Vec<usize>; 2] {
    let mut negatives = Vec::new();
    let mut positives = Vec::new();
    for (i, &label) in labels.iter().enumerate() {
        if label {
            positives.push(i);
        } else {
            negatives.push(i);
        }
    }
    negatives.shuffle(rng);
    positives.shuffle(rng);
    [negatives, positives]
}

/// Hold out `ceil(test_fraction * n)` rows with class proportions preserved
///
/// Per-class test counts are apportioned by largest remainder, so the totals
/// always add up exactly.
pub fn stratified_split(labels: &[bool], test_fraction: f64, seed: u64) -> Result<Split> {
    let n = labels.len();
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PredictError::Training(format!(
            "test fraction {} must lie strictly between 0 and 1",
            test_fraction
        )));
    }
    let n_test = (test_fraction * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(PredictError::Training(format!(
            "cannot hold out {} of {} rows",
            n_test, n
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let classes = shuffled_classes(labels, &mut rng);

    let ideal: Vec<f64> = classes
        .iter()
        .map(|c| n_test as f64 * c.len() as f64 / n as f64)
        .collect();
    let mut counts: Vec<usize> = ideal.iter().map(|v| v.floor() as usize).collect();
    let mut by_remainder: Vec<usize> = (0..classes.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        let ra = ideal[a] - ideal[a].floor();
        let rb = ideal[b] - ideal[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });
    let mut missing = n_test - counts.iter().sum::<usize>();
    for &class in by_remainder.iter().cycle().take(2 * classes.len()) {
        if missing == 0 {
            break;
        }
        if counts[class] < classes[class].len() {
            counts[class] += 1;
            missing -= 1;
        }
    }

    let mut train = Vec::with_capacity(n - n_test);
    let mut test = Vec::with_capacity(n_test);
    for (class, &count) in classes.iter().zip(&counts) {
        test.extend_from_slice(&class[..count]);
        train.extend_from_slice(&class[count..]);
    }
    train.sort_unstable();
    test.sort_unstable();

    Ok(Split { train, test })
}

/// Assign every row to one of `k` folds, dealing each class round-robin
///
/// Returns the held-out indices of each fold, ascending.
pub fn stratified_folds(labels: &[bool], k: usize, seed: u64) -> Result<Vec<Vec<usize>>> {
    if k < 2 || labels.len() < k {
        return Err(PredictError::Training(format!(
            "cannot build {} folds from {} rows",
            k,
            labels.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut folds = vec![Vec::new(); k];
    let mut slot = 0;
    for class in shuffled_classes(labels, &mut rng) {
        for i in class {
            folds[slot % k].push(i);
            slot += 1;
        }
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    Ok(folds)
}

/// Complement of a sorted index list within `0..n`
pub fn complement(held_out: &[usize], n: usize) -> Vec<usize> {
    let mut out = Vec::with_capacity(n.saturating_sub(held_out.len()));
    let mut held = held_out.iter().peekable();
    for i in 0..n {
        if held.peek() == Some(&&i) {
            held.next();
        } else {
            out.push(i);
        }
    }
    out
}
