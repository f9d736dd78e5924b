//! Seeded train/test splitting

use crate::error::{BuilderError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// Result of a train/test split
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
}

/// Split `x`/`y` into train and test sets.
///
/// The test set holds `ceil(n * test_size)` rows. With `stratify`, each class
/// contributes in proportion to its frequency and always keeps at least one
/// row on the training side.
pub fn train_test_split(
    x: &Array2<f64>,
    y: &Array1<f64>,
    test_size: f64,
    seed: u64,
    stratify: bool,
) -> Result<TrainTestSplit> {
    let n = x.nrows();
    if n != y.len() {
        return Err(BuilderError::ShapeError {
            expected: format!("y length = {}", n),
            actual: format!("y length = {}", y.len()),
        });
    }
    if n < 2 {
        return Err(BuilderError::Validation(format!(
            "Not enough data for train/test split. Need at least 2 samples, got {}.",
            n
        )));
    }

    let n_test = ((n as f64) * test_size).ceil() as usize;
    let n_test = n_test.clamp(1, n - 1);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let (mut train_idx, mut test_idx) = if stratify {
        stratified_indices(y, n_test, &mut rng)
    } else {
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);
        let test = indices.split_off(n - n_test);
        (indices, test)
    };

    if train_idx.is_empty() || test_idx.is_empty() {
        return Err(BuilderError::Validation(format!(
            "Train/test split resulted in empty sets. Train: {}, Test: {}",
            train_idx.len(),
            test_idx.len()
        )));
    }

    train_idx.shuffle(&mut rng);
    test_idx.shuffle(&mut rng);

    Ok(TrainTestSplit {
        x_train: x.select(Axis(0), &train_idx),
        x_test: x.select(Axis(0), &test_idx),
        y_train: train_idx.iter().map(|&i| y[i]).collect(),
        y_test: test_idx.iter().map(|&i| y[i]).collect(),
    })
}

/// Allocate `n_test` rows across classes by largest remainder
fn stratified_indices(y: &Array1<f64>, n_test: usize, rng: &mut ChaCha8Rng) -> (Vec<usize>, Vec<usize>) {
    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        by_class.entry(label.round() as i64).or_default().push(i);
    }

    let n = y.len() as f64;
    let mut allocation: Vec<(i64, usize, f64)> = by_class
        .iter()
        .map(|(&class, idx)| {
            let exact = idx.len() as f64 * n_test as f64 / n;
            let cap = idx.len().saturating_sub(1);
            (class, (exact.floor() as usize).min(cap), exact.fract())
        })
        .collect();

    let mut assigned: usize = allocation.iter().map(|a| a.1).sum();
    let mut order: Vec<usize> = (0..allocation.len()).collect();
    order.sort_by(|&a, &b| allocation[b].2.total_cmp(&allocation[a].2).then(a.cmp(&b)));

    // Hand out the remainder, then keep going past fractional order if caps blocked it
    while assigned < n_test {
        let mut progressed = false;
        for &k in &order {
            if assigned >= n_test {
                break;
            }
            let cap = by_class[&allocation[k].0].len().saturating_sub(1);
            if allocation[k].1 < cap {
                allocation[k].1 += 1;
                assigned += 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    let mut train = Vec::with_capacity(y.len());
    let mut test = Vec::with_capacity(n_test);
    for (class, take, _) in allocation {
        let mut idx = by_class[&class].clone();
        idx.shuffle(rng);
        let class_test = idx.split_off(idx.len() - take);
        train.extend(idx);
        test.extend(class_test);
    }
    (train, test)
}
