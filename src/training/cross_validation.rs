//! K-fold cross-validation
//!
//! Folds come from a seeded shuffle followed by contiguous slicing, so the same
//! seed always yields the same partition. Fold models are trained in parallel;
//! their held-out predictions are pooled and evaluated once per configuration.

use super::decision_tree::{DecisionTree, DecisionTreeTrainer, Prediction};
use super::metrics::{ClassificationMetrics, Evaluator, ScoredPrediction, SelectionMetric};
use crate::data::LabeledData;
use crate::error::{IdsError, Result};
use ndarray::{ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A fitted model that scores single feature vectors
pub trait Classifier: Sync {
    fn predict(&self, x: ArrayView1<f64>) -> Result<Prediction>;

    fn predict_batch(&self, x: ArrayView2<f64>) -> Result<Vec<Prediction>> {
        (0..x.nrows())
            .into_par_iter()
            .map(|i| self.predict(x.row(i)))
            .collect()
    }
}

/// A configured training procedure
pub trait Estimator: Sync {
    type Model: Classifier + Send;

    fn fit(&self, data: &LabeledData) -> Result<Self::Model>;
}

impl Classifier for DecisionTree {
    fn predict(&self, x: ArrayView1<f64>) -> Result<Prediction> {
        DecisionTree::predict(self, x)
    }

    fn predict_batch(&self, x: ArrayView2<f64>) -> Result<Vec<Prediction>> {
        DecisionTree::predict_batch(self, x)
    }
}

impl Estimator for DecisionTreeTrainer {
    type Model = DecisionTree;

    fn fit(&self, data: &LabeledData) -> Result<DecisionTree> {
        DecisionTreeTrainer::fit(self, data.features(), data.labels())
    }
}

/// A single train/test split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Seeded k-fold partitioner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KFold {
    pub n_splits: usize,
    pub seed: u64,
}

impl KFold {
    pub fn new(n_splits: usize, seed: u64) -> Self {
        Self { n_splits, seed }
    }

    /// Shuffle `0..n_samples` and cut it into `n_splits` contiguous folds.
    /// The first `n_samples % n_splits` folds hold one extra index.
    pub fn split(&self, n_samples: usize) -> Result<Vec<CVSplit>> {
        let n_splits = self.n_splits;
        if n_splits < 2 {
            return Err(IdsError::invalid_config(
                "num_folds",
                n_splits,
                "must be at least 2",
            ));
        }
        if n_samples < n_splits {
            return Err(IdsError::invalid_config(
                "num_folds",
                n_splits,
                &format!("exceeds the number of examples ({})", n_samples),
            ));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;

        let mut splits = Vec::with_capacity(n_splits);
        let mut current = 0;
        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            let test_indices = indices[current..current + fold_size].to_vec();
            let train_indices = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();

            splits.push(CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
            current += fold_size;
        }

        Ok(splits)
    }
}

/// Result of cross-validating a grid of configurations
#[derive(Debug, Clone)]
pub struct CrossValidationOutcome<M> {
    /// Index of the selected configuration within the grid
    pub best_index: usize,
    /// Pooled held-out metrics of the selected configuration
    pub metrics: ClassificationMetrics,
    /// Pooled held-out metrics of every configuration, in grid order
    pub grid_metrics: Vec<ClassificationMetrics>,
    /// Selected configuration refitted on every training example
    pub model: M,
}

/// Cross-validation harness
#[derive(Debug, Clone)]
pub struct CrossValidator {
    folds: KFold,
    selection: SelectionMetric,
}

impl CrossValidator {
    pub fn new(n_folds: usize, seed: u64) -> Self {
        Self {
            folds: KFold::new(n_folds, seed),
            selection: SelectionMetric::default(),
        }
    }

    pub fn with_selection_metric(mut self, selection: SelectionMetric) -> Self {
        self.selection = selection;
        self
    }

    pub fn folds(&self) -> &KFold {
        &self.folds
    }

    /// Fold partition used for `n_samples` examples
    pub fn splits(&self, n_samples: usize) -> Result<Vec<CVSplit>> {
        self.folds.split(n_samples)
    }

    /// Train on every fold's complement and pool the held-out predictions.
    ///
    /// Folds run in parallel; the pool is assembled in fold order once all of
    /// them have finished.
    pub fn pooled_predictions<E: Estimator>(
        &self,
        data: &LabeledData,
        estimator: &E,
        splits: &[CVSplit],
    ) -> Result<Vec<ScoredPrediction>> {
        let per_fold = splits
            .par_iter()
            .map(|split| {
                let train = data.select(&split.train_indices);
                let model = estimator.fit(&train)?;

                let test = data.select(&split.test_indices);
                let predictions = model.predict_batch(test.features())?;

                debug!(
                    fold = split.fold_idx,
                    train = train.len(),
                    test = test.len(),
                    "Fold evaluated"
                );

                Ok(predictions
                    .into_iter()
                    .zip(test.labels())
                    .map(|(p, &actual)| ScoredPrediction::new(p.label, actual, p.score))
                    .collect::<Vec<_>>())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(per_fold.into_iter().flatten().collect())
    }

    /// Cross-validate every configuration in `grid`, pick the best by the
    /// selection metric (earliest wins ties) and refit it on all of `data`.
    pub fn evaluate<E: Estimator>(
        &self,
        data: &LabeledData,
        grid: &[E],
    ) -> Result<CrossValidationOutcome<E::Model>> {
        if grid.is_empty() {
            return Err(IdsError::invalid_config(
                "grid",
                "[]",
                "at least one configuration is required",
            ));
        }
        if data.is_empty() {
            return Err(IdsError::EmptyDataset(
                "cross-validation requires training examples".to_string(),
            ));
        }

        let splits = self.splits(data.len())?;

        let mut grid_metrics = Vec::with_capacity(grid.len());
        let mut best_index = 0;
        for (idx, estimator) in grid.iter().enumerate() {
            let pooled = self.pooled_predictions(data, estimator, &splits)?;
            let metrics = Evaluator::compute(&pooled)?;

            info!(
                config = idx,
                folds = splits.len(),
                f1 = metrics.f1,
                accuracy = metrics.accuracy,
                auc = metrics.area_under_roc,
                "Cross-validated configuration"
            );

            let score = self.selection.value(&metrics);
            if idx > 0 && score > self.selection.value(&grid_metrics[best_index]) {
                best_index = idx;
            }
            grid_metrics.push(metrics);
        }

        let model = grid[best_index].fit(data)?;

        Ok(CrossValidationOutcome {
            best_index,
            metrics: grid_metrics[best_index],
            grid_metrics,
            model,
        })
    }
}
