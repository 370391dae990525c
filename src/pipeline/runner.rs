//! End-to-end run: features, split, cross-validated fit, held-out evaluation

use crate::config::PipelineConfig;
use crate::data::{DatasetSource, FeatureVectorBuilder, FlowRecord, LabeledData};
use crate::error::{IdsError, Result};
use crate::training::{
    Classifier, ClassificationMetrics, CrossValidator, Evaluator, MetricsReport, PcaTreeEstimator,
    PcaTreeModel, ScoredPrediction,
};
use crate::utils::{ParallelConfig, Timer};
use tracing::info;

use super::sink::ResultSink;

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Held-out metrics plus fit and evaluation timings
    pub metrics: MetricsReport,
    /// Full held-out metrics including the confusion matrix
    pub test_metrics: ClassificationMetrics,
    /// Pooled cross-validation metrics of the selected configuration
    pub cv_metrics: ClassificationMetrics,
    /// Selected grid entry
    pub best_config: PcaTreeEstimator,
    /// Model fitted on the whole training split
    pub model: PcaTreeModel,
    pub n_train: usize,
    pub n_test: usize,
}

/// Drives a configured run over any [`DatasetSource`]
#[derive(Debug, Clone)]
pub struct PipelineRunner {
    config: PipelineConfig,
    features: FeatureVectorBuilder,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let features = FeatureVectorBuilder::new(config.feature_columns.as_slice())?;
        Ok(Self { config, features })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load, train and evaluate. Compute stages run on a pool sized by
    /// `config.threads` when set.
    pub fn run<S: DatasetSource + ?Sized>(&self, source: &S) -> Result<RunReport> {
        let records = source.records()?;
        match self.config.threads {
            Some(n) => ParallelConfig::new()
                .with_threads(n)
                .build_pool()?
                .install(|| self.run_records(&records)),
            None => self.run_records(&records),
        }
    }

    /// Run, then hand the report to `sink`. Nothing is written on failure.
    pub fn run_to_sink<S: DatasetSource + ?Sized>(
        &self,
        source: &S,
        sink: &dyn ResultSink,
        cores: &[usize],
    ) -> Result<RunReport> {
        let report = self.run(source)?;
        sink.write(cores, &report.metrics)?;
        Ok(report)
    }

    pub fn run_records(&self, records: &[FlowRecord]) -> Result<RunReport> {
        if records.is_empty() {
            return Err(IdsError::EmptyDataset("dataset has no records".to_string()));
        }

        let mut stages = Timer::start("pipeline");

        let data = self.features.build_dataset(records)?;
        stages.checkpoint("features");

        let (train, test) = data.train_test_split(self.config.test_fraction, self.config.seed)?;
        info!(
            features = data.n_features(),
            train = train.len(),
            test = test.len(),
            "Split dataset"
        );

        let fit_timer = Timer::start("cross-validated fit");
        let grid = self.config.grid();
        let outcome = CrossValidator::new(self.config.num_folds, self.config.seed)
            .with_selection_metric(self.config.selection_metric)
            .evaluate(&train, &grid)?;
        let fit_secs = fit_timer.stop().as_secs_f64();
        stages.checkpoint("fit");

        info!(
            best = outcome.best_index,
            max_depth = grid[outcome.best_index].tree.max_depth,
            cv_f1 = outcome.metrics.f1,
            "Cross-validation finished"
        );

        let eval_timer = Timer::start("held-out prediction");
        let predictions = predict_labeled(&outcome.model, &test)?;
        let eval_secs = eval_timer.stop().as_secs_f64();

        let test_metrics = Evaluator::compute(&predictions)?;
        stages.checkpoint("evaluate");
        stages.stop_with_report();

        info!(
            f1 = test_metrics.f1,
            precision = test_metrics.weighted_precision,
            recall = test_metrics.weighted_recall,
            accuracy = test_metrics.accuracy,
            auc = test_metrics.area_under_roc,
            "Test split evaluated"
        );

        Ok(RunReport {
            metrics: MetricsReport::new(&test_metrics, fit_secs, eval_secs),
            test_metrics,
            cv_metrics: outcome.metrics,
            best_config: grid[outcome.best_index].clone(),
            model: outcome.model,
            n_train: train.len(),
            n_test: test.len(),
        })
    }
}

fn predict_labeled<C: Classifier>(model: &C, data: &LabeledData) -> Result<Vec<ScoredPrediction>> {
    let predictions = model.predict_batch(data.features())?;
    Ok(predictions
        .into_iter()
        .zip(data.labels())
        .map(|(p, &actual)| ScoredPrediction::new(p.label, actual, p.score))
        .collect())
}
