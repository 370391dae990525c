//! Pipeline configuration

use crate::data::FLOW_STAT_COLUMNS;
use crate::error::{IdsError, Result};
use crate::preprocessing::PcaConfig;
use crate::training::{Criterion, PcaTreeEstimator, SelectionMetric, TreeConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a full train / cross-validate / evaluate run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Record fields assembled into each feature vector, in order
    pub feature_columns: Vec<String>,

    /// PCA output dimensions
    pub n_components: usize,

    /// Scale features to unit variance before PCA
    pub standardize: bool,

    /// Tree depth limit
    pub max_depth: usize,

    /// Additional depths to cross-validate; empty means only `max_depth`
    pub max_depth_grid: Vec<usize>,

    /// Impurity criterion
    pub impurity: Criterion,

    pub min_samples_split: usize,

    pub min_samples_leaf: usize,

    pub min_info_gain: f64,

    /// Candidate threshold cap per feature
    pub max_bins: Option<usize>,

    /// Number of cross-validation folds
    pub num_folds: usize,

    /// Share of examples held out for the final evaluation
    pub test_fraction: f64,

    /// Seed for the train/test split and the fold partition
    pub seed: u64,

    /// Metric used to pick the best grid entry
    pub selection_metric: SelectionMetric,

    /// Worker threads (None = derived from the core layout)
    pub threads: Option<usize>,

    /// Directory receiving the CSV line and the text report
    pub results_dir: PathBuf,

    /// CSV file name inside `results_dir`
    pub csv_file: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let tree = TreeConfig::default();
        Self {
            feature_columns: FLOW_STAT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            n_components: PcaConfig::default().n_components,
            standardize: false,
            max_depth: tree.max_depth,
            max_depth_grid: Vec::new(),
            impurity: tree.criterion,
            min_samples_split: tree.min_samples_split,
            min_samples_leaf: tree.min_samples_leaf,
            min_info_gain: tree.min_info_gain,
            max_bins: tree.max_bins,
            num_folds: 10,
            test_fraction: 0.3,
            seed: 42,
            selection_metric: SelectionMetric::F1,
            threads: None,
            results_dir: PathBuf::from("results"),
            csv_file: "decisionTreePCACrossVal.csv".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file; missing keys take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn with_feature_columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.feature_columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn with_components(mut self, n: usize) -> Self {
        self.n_components = n;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_depth_grid(mut self, depths: Vec<usize>) -> Self {
        self.max_depth_grid = depths;
        self
    }

    pub fn with_impurity(mut self, impurity: Criterion) -> Self {
        self.impurity = impurity;
        self
    }

    pub fn with_max_bins(mut self, bins: usize) -> Self {
        self.max_bins = Some(bins);
        self
    }

    pub fn with_folds(mut self, folds: usize) -> Self {
        self.num_folds = folds;
        self
    }

    pub fn with_test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = fraction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_selection_metric(mut self, metric: SelectionMetric) -> Self {
        self.selection_metric = metric;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    pub fn pca_config(&self) -> PcaConfig {
        PcaConfig {
            n_components: self.n_components,
            standardize: self.standardize,
        }
    }

    pub fn tree_config(&self, max_depth: usize) -> TreeConfig {
        TreeConfig {
            max_depth,
            criterion: self.impurity,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            min_info_gain: self.min_info_gain,
            max_bins: self.max_bins,
        }
    }

    /// Grid of configurations to cross-validate, in selection order
    pub fn grid(&self) -> Vec<PcaTreeEstimator> {
        let depths: Vec<usize> = if self.max_depth_grid.is_empty() {
            vec![self.max_depth]
        } else {
            self.max_depth_grid.clone()
        };
        depths
            .into_iter()
            .map(|depth| PcaTreeEstimator::new(self.pca_config(), self.tree_config(depth)))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.feature_columns.is_empty() {
            return Err(IdsError::invalid_config(
                "feature_columns",
                "[]",
                "at least one column is required",
            ));
        }
        if self.n_components == 0 {
            return Err(IdsError::invalid_config("n_components", 0, "must be at least 1"));
        }
        if self.num_folds < 2 {
            return Err(IdsError::invalid_config(
                "num_folds",
                self.num_folds,
                "must be at least 2",
            ));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(IdsError::invalid_config(
                "test_fraction",
                self.test_fraction,
                "must lie strictly between 0 and 1",
            ));
        }
        if self.threads == Some(0) {
            return Err(IdsError::invalid_config("threads", 0, "must be at least 1"));
        }
        if self.csv_file.is_empty() {
            return Err(IdsError::invalid_config("csv_file", "\"\"", "must not be empty"));
        }
        for estimator in self.grid() {
            estimator.tree.validate()?;
        }
        Ok(())
    }
}
