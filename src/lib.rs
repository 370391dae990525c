//! Kolosal IDS - network flow intrusion classifier
//!
//! Classifies flow records as benign (0) or attack (1) by training a decision
//! tree over a PCA-reduced feature space, selecting the tree configuration by
//! k-fold cross-validation and reporting binary classification metrics.
//!
//! # Modules
//!
//! - [`data`] - Flow records, dataset sources and feature assembly
//! - [`preprocessing`] - PCA with mergeable covariance accumulation
//! - [`training`] - Decision trees, cross-validation and metrics
//! - [`pipeline`] - End-to-end runner and result sinks
//! - [`config`] - Run configuration
//! - [`cli`] - Command-line interface
//! - [`utils`] - Timing and thread pool helpers

// Core error handling
pub mod error;

// Core ML modules
pub mod data;
pub mod preprocessing;
pub mod training;

// Orchestration
pub mod config;
pub mod pipeline;

// Utilities
pub mod utils;

// Services
pub mod cli;

pub use error::{IdsError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{IdsError, Result};

    // Data
    pub use crate::data::{CsvDatasetSource, DatasetSource, FeatureVectorBuilder, FlowRecord, LabeledData};

    // Preprocessing
    pub use crate::preprocessing::{PcaConfig, PcaReducer, PrincipalComponentModel};

    // Training
    pub use crate::training::{
        Classifier, CrossValidator, DecisionTree, DecisionTreeTrainer, Estimator, Evaluator,
        MetricsReport, PcaTreeEstimator, TreeConfig,
    };

    // Pipeline
    pub use crate::config::PipelineConfig;
    pub use crate::pipeline::{FileResultSink, PipelineRunner, ResultSink};
}
