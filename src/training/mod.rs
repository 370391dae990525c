//! Model training module
//!
//! Provides the training side of the classifier:
//! - Decision tree induction over reduced feature vectors
//! - K-fold cross-validation with pooled held-out evaluation
//! - Binary classification metrics (F1, weighted precision/recall, AUC)
//! - The combined PCA + tree estimator used by the pipeline

pub mod cross_validation;
pub mod decision_tree;
pub mod metrics;
pub mod pipeline;

pub use cross_validation::{
    CVSplit, Classifier, CrossValidationOutcome, CrossValidator, Estimator, KFold,
};
pub use decision_tree::{
    ClassCounts, Criterion, DecisionTree, DecisionTreeTrainer, NodeId, Prediction, TreeConfig,
    TreeNode,
};
pub use metrics::{
    area_under_roc, ClassificationMetrics, ConfusionMatrix, Evaluator, MetricsReport,
    ScoredPrediction, SelectionMetric,
};
pub use pipeline::{PcaTreeEstimator, PcaTreeModel};
