//! Classification metrics
//!
//! Confusion-matrix metrics (class 1 is the positive, "attack" class) and the
//! area under the ROC curve computed from ranked scores.

use crate::error::{IdsError, Result};
use serde::{Deserialize, Serialize};

/// One held-out prediction: predicted label, true label, class-1 score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredPrediction {
    pub predicted: usize,
    pub actual: usize,
    pub score: f64,
}

impl ScoredPrediction {
    pub fn new(predicted: usize, actual: usize, score: f64) -> Self {
        Self {
            predicted,
            actual,
            score,
        }
    }
}

/// Binary confusion matrix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn harmonic(p: f64, r: f64) -> f64 {
    if p + r > 0.0 {
        2.0 * p * r / (p + r)
    } else {
        0.0
    }
}

impl ConfusionMatrix {
    pub fn from_predictions(predictions: &[ScoredPrediction]) -> Result<Self> {
        let mut cm = Self::default();
        for p in predictions {
            match (p.actual, p.predicted) {
                (1, 1) => cm.tp += 1,
                (0, 1) => cm.fp += 1,
                (0, 0) => cm.tn += 1,
                (1, 0) => cm.fn_ += 1,
                (actual, predicted) => {
                    return Err(IdsError::DataError(format!(
                        "binary metrics need labels 0 or 1, got actual={} predicted={}",
                        actual, predicted
                    )))
                }
            }
        }
        Ok(cm)
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    /// TP / (TP + FP), 0 when nothing was predicted positive
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// TP / (TP + FN), 0 when there are no positives
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        harmonic(self.precision(), self.recall())
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    fn negative_precision(&self) -> f64 {
        ratio(self.tn, self.tn + self.fn_)
    }

    fn negative_recall(&self) -> f64 {
        ratio(self.tn, self.tn + self.fp)
    }

    /// Support of each class in the true labels: (negatives, positives)
    fn supports(&self) -> (f64, f64) {
        ((self.tn + self.fp) as f64, (self.tp + self.fn_) as f64)
    }

    fn weighted(&self, negative: f64, positive: f64) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let (neg_support, pos_support) = self.supports();
        (neg_support * negative + pos_support * positive) / total as f64
    }

    /// Per-class precision weighted by true-class support
    pub fn weighted_precision(&self) -> f64 {
        self.weighted(self.negative_precision(), self.precision())
    }

    /// Per-class recall weighted by true-class support
    pub fn weighted_recall(&self) -> f64 {
        self.weighted(self.negative_recall(), self.recall())
    }

    /// Per-class F1 weighted by true-class support
    pub fn weighted_f1(&self) -> f64 {
        let negative_f1 = harmonic(self.negative_precision(), self.negative_recall());
        self.weighted(negative_f1, self.f1())
    }
}

/// Area under the ROC curve.
///
/// Examples are ranked by descending score and the curve is integrated with
/// the trapezoidal rule; equal scores move the curve in a single diagonal
/// step. Scores must be finite.
pub fn area_under_roc(predictions: &[ScoredPrediction]) -> Result<f64> {
    if let Some(p) = predictions.iter().find(|p| !p.score.is_finite()) {
        return Err(IdsError::DataError(format!(
            "cannot rank non-finite score {}",
            p.score
        )));
    }

    let positives = predictions.iter().filter(|p| p.actual == 1).count();
    let negatives = predictions.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(IdsError::NoPositiveOrNegativeExamples);
    }

    let mut ranked: Vec<&ScoredPrediction> = predictions.iter().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    let (mut tp, mut fp) = (0usize, 0usize);
    let (mut prev_tpr, mut prev_fpr) = (0.0, 0.0);
    let mut area = 0.0;

    let mut i = 0;
    while i < ranked.len() {
        let score = ranked[i].score;
        while i < ranked.len() && ranked[i].score == score {
            if ranked[i].actual == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }

        let tpr = tp as f64 / positives as f64;
        let fpr = fp as f64 / negatives as f64;
        area += (fpr - prev_fpr) * (tpr + prev_tpr) / 2.0;
        prev_tpr = tpr;
        prev_fpr = fpr;
    }

    Ok(area)
}

/// Aggregated classification metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub f1: f64,
    pub weighted_precision: f64,
    pub weighted_recall: f64,
    pub accuracy: f64,
    pub area_under_roc: f64,
    pub confusion: ConfusionMatrix,
}

/// Computes [`ClassificationMetrics`] from pooled predictions
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    pub fn compute(predictions: &[ScoredPrediction]) -> Result<ClassificationMetrics> {
        if predictions.is_empty() {
            return Err(IdsError::EmptyDataset(
                "no predictions to evaluate".to_string(),
            ));
        }

        let confusion = ConfusionMatrix::from_predictions(predictions)?;
        let area_under_roc = area_under_roc(predictions)?;

        Ok(ClassificationMetrics {
            f1: confusion.f1(),
            weighted_precision: confusion.weighted_precision(),
            weighted_recall: confusion.weighted_recall(),
            accuracy: confusion.accuracy(),
            area_under_roc,
            confusion,
        })
    }
}

/// Metric used to rank configurations during cross-validation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMetric {
    #[default]
    F1,
    WeightedPrecision,
    WeightedRecall,
    Accuracy,
    AreaUnderRoc,
}

impl SelectionMetric {
    pub fn value(&self, metrics: &ClassificationMetrics) -> f64 {
        match self {
            SelectionMetric::F1 => metrics.f1,
            SelectionMetric::WeightedPrecision => metrics.weighted_precision,
            SelectionMetric::WeightedRecall => metrics.weighted_recall,
            SelectionMetric::Accuracy => metrics.accuracy,
            SelectionMetric::AreaUnderRoc => metrics.area_under_roc,
        }
    }
}

/// Final run report: held-out metrics plus stage timings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub f1: f64,
    pub weighted_precision: f64,
    pub weighted_recall: f64,
    pub accuracy: f64,
    pub area_under_roc: f64,
    pub fit_duration_secs: f64,
    pub eval_duration_secs: f64,
}

impl MetricsReport {
    pub fn new(metrics: &ClassificationMetrics, fit_duration_secs: f64, eval_duration_secs: f64) -> Self {
        Self {
            f1: metrics.f1,
            weighted_precision: metrics.weighted_precision,
            weighted_recall: metrics.weighted_recall,
            accuracy: metrics.accuracy,
            area_under_roc: metrics.area_under_roc,
            fit_duration_secs,
            eval_duration_secs,
        }
    }
}
