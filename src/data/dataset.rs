//! Labelled feature matrices

use crate::error::{IdsError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Feature matrix (one row per example) paired with class labels
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledData {
    features: Array2<f64>,
    labels: Vec<usize>,
}

impl LabeledData {
    /// Pair a feature matrix with its labels
    pub fn new(features: Array2<f64>, labels: Vec<usize>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(IdsError::ShapeError {
                expected: format!("{} labels", features.nrows()),
                actual: format!("{} labels", labels.len()),
            });
        }
        Ok(Self { features, labels })
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn row(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.features.row(idx)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Copy out the rows at `indices`, in the given order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Seeded shuffle-then-cut split into disjoint (train, test) parts.
    ///
    /// The test part receives `round(len * test_fraction)` examples.
    pub fn train_test_split(&self, test_fraction: f64, seed: u64) -> Result<(Self, Self)> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(IdsError::invalid_config(
                "test_fraction",
                test_fraction,
                "must lie strictly between 0 and 1",
            ));
        }

        let n = self.len();
        let test_size = (n as f64 * test_fraction).round() as usize;
        if test_size == 0 || test_size == n {
            return Err(IdsError::EmptyDataset(format!(
                "{} examples cannot be split into non-empty train and test parts",
                n
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let (train_idx, test_idx) = indices.split_at(n - test_size);
        Ok((self.select(train_idx), self.select(test_idx)))
    }
}
