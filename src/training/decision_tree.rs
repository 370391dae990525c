//! Decision tree classifier
//!
//! Greedy impurity-driven partitioning. Nodes live in an arena (`Vec<TreeNode>`)
//! and refer to their children by index, and the tree is grown from an explicit
//! work stack, so neither training nor prediction recurses.

use crate::error::{IdsError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Index of a node inside [`DecisionTree::nodes`]
pub type NodeId = usize;

/// Gains within rounding noise of zero do not justify a split
const GAIN_EPSILON: f64 = 1e-12;

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    /// Shannon entropy, base 2
    Entropy,
    /// Gini impurity
    Gini,
}

impl Default for Criterion {
    fn default() -> Self {
        Criterion::Entropy
    }
}

impl Criterion {
    /// Impurity of a class histogram holding `total` examples
    pub fn impurity(&self, counts: &[usize], total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        match self {
            Criterion::Entropy => -counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.log2()
                })
                .sum::<f64>(),
            Criterion::Gini => {
                1.0 - counts
                    .iter()
                    .map(|&c| (c as f64 / n).powi(2))
                    .sum::<f64>()
            }
        }
    }
}

impl std::str::FromStr for Criterion {
    type Err = IdsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "entropy" => Ok(Criterion::Entropy),
            "gini" => Ok(Criterion::Gini),
            other => Err(IdsError::invalid_config(
                "impurity",
                other,
                "expected 'entropy' or 'gini'",
            )),
        }
    }
}

/// Per-class example counts. Merging is associative and commutative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts(Vec<usize>);

impl ClassCounts {
    pub fn new(n_classes: usize) -> Self {
        Self(vec![0; n_classes])
    }

    pub fn accumulate(mut self, label: usize) -> Self {
        self.0[label] += 1;
        self
    }

    pub fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.0.iter_mut().zip(other.0) {
            *a += b;
        }
        self
    }

    pub fn counts(&self) -> &[usize] {
        &self.0
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    pub fn is_pure(&self) -> bool {
        self.0.iter().filter(|&&c| c > 0).count() <= 1
    }

    /// Most frequent class; ties go to the lowest class index
    pub fn majority(&self) -> usize {
        let mut best = 0;
        for (class, &count) in self.0.iter().enumerate() {
            if count > self.0[best] {
                best = class;
            }
        }
        best
    }

    /// Share of examples carrying `class`
    pub fn proportion(&self, class: usize) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.0.get(class).copied().unwrap_or(0) as f64 / total as f64
    }
}

/// Decision tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf holding the class distribution of its training examples
    Leaf { distribution: ClassCounts },
    /// Internal node: `x[feature_idx] < threshold` goes left, otherwise right
    Split {
        feature_idx: usize,
        threshold: f64,
        left: NodeId,
        right: NodeId,
        n_samples: usize,
        gain: f64,
    },
}

/// Class label and class-1 score returned by a fitted classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: usize,
    pub score: f64,
}

/// Tree induction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum root-to-leaf edge count
    pub max_depth: usize,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Nodes with fewer examples become leaves
    pub min_samples_split: usize,
    /// Splits leaving fewer examples on either side are not considered
    pub min_samples_leaf: usize,
    /// Splits must gain strictly more than this
    pub min_info_gain: f64,
    /// Cap on candidate thresholds per feature (None = every midpoint)
    pub max_bins: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            criterion: Criterion::Entropy,
            min_samples_split: 1,
            min_samples_leaf: 1,
            min_info_gain: 0.0,
            max_bins: None,
        }
    }
}

impl TreeConfig {
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_bins(mut self, max_bins: usize) -> Self {
        self.max_bins = Some(max_bins);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_samples_leaf == 0 {
            return Err(IdsError::invalid_config(
                "min_samples_leaf",
                0,
                "must be at least 1",
            ));
        }
        if let Some(bins) = self.max_bins {
            if bins < 2 {
                return Err(IdsError::invalid_config("max_bins", bins, "must be at least 2"));
            }
        }
        if !(self.min_info_gain >= 0.0) {
            return Err(IdsError::invalid_config(
                "min_info_gain",
                self.min_info_gain,
                "must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Fitted decision tree. Immutable and safe to share across threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Arena of nodes; the root is at index 0
    nodes: Vec<TreeNode>,
    n_features: usize,
    n_classes: usize,
    feature_importances: Array1<f64>,
}

impl DecisionTree {
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn root(&self) -> &TreeNode {
        &self.nodes[0]
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    /// Longest root-to-leaf path, in edges
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0, 0)];
        while let Some((id, depth)) = stack.pop() {
            match &self.nodes[id] {
                TreeNode::Leaf { .. } => max_depth = max_depth.max(depth),
                TreeNode::Split { left, right, .. } => {
                    stack.push((*left, depth + 1));
                    stack.push((*right, depth + 1));
                }
            }
        }
        max_depth
    }

    /// Normalised gain-weighted importance of each feature
    pub fn feature_importances(&self) -> &Array1<f64> {
        &self.feature_importances
    }

    /// Leaf reached by `x`
    pub fn leaf(&self, x: ArrayView1<f64>) -> Result<&ClassCounts> {
        if x.len() != self.n_features {
            return Err(IdsError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.len()),
            });
        }

        let mut id = 0;
        loop {
            match &self.nodes[id] {
                TreeNode::Leaf { distribution } => return Ok(distribution),
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    id = if x[*feature_idx] < *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Majority class of the reached leaf and its class-1 proportion
    pub fn predict(&self, x: ArrayView1<f64>) -> Result<Prediction> {
        let leaf = self.leaf(x)?;
        Ok(Prediction {
            label: leaf.majority(),
            score: leaf.proportion(1),
        })
    }

    /// Predict every row of `x`
    pub fn predict_batch(&self, x: ArrayView2<f64>) -> Result<Vec<Prediction>> {
        (0..x.nrows())
            .into_par_iter()
            .map(|i| self.predict(x.row(i)))
            .collect()
    }
}

/// Best split found for one feature
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// Node waiting to be grown
struct PendingNode {
    id: NodeId,
    indices: Vec<usize>,
    depth: usize,
}

/// Fits [`DecisionTree`]s
#[derive(Debug, Clone, Default)]
pub struct DecisionTreeTrainer {
    config: TreeConfig,
}

impl DecisionTreeTrainer {
    pub fn new(config: TreeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Grow a tree over the rows of `x` labelled by `y`
    pub fn fit(&self, x: ArrayView2<f64>, y: &[usize]) -> Result<DecisionTree> {
        self.config.validate()?;

        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(IdsError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(IdsError::EmptyDataset(
                "decision tree requires at least one example".to_string(),
            ));
        }

        let n_features = x.ncols();
        let n_classes = y.iter().copied().max().unwrap_or(0).max(1) + 1;
        let mut importances = vec![0.0; n_features];

        let mut nodes = vec![TreeNode::Leaf {
            distribution: ClassCounts::new(n_classes),
        }];
        let mut stack = vec![PendingNode {
            id: 0,
            indices: (0..n_samples).collect(),
            depth: 0,
        }];

        while let Some(pending) = stack.pop() {
            let distribution = node_counts(y, &pending.indices, n_classes);
            let n = pending.indices.len();

            let stop = pending.depth >= self.config.max_depth
                || n < self.config.min_samples_split
                || distribution.is_pure();

            let split = if stop {
                None
            } else {
                self.find_best_split(x, y, &pending.indices, &distribution)
            };

            let Some(split) = split else {
                nodes[pending.id] = TreeNode::Leaf { distribution };
                continue;
            };

            let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = pending
                .indices
                .iter()
                .partition(|&&i| x[[i, split.feature_idx]] < split.threshold);

            importances[split.feature_idx] += n as f64 * split.gain;

            let left = nodes.len();
            let right = left + 1;
            nodes.push(TreeNode::Leaf {
                distribution: ClassCounts::new(n_classes),
            });
            nodes.push(TreeNode::Leaf {
                distribution: ClassCounts::new(n_classes),
            });
            nodes[pending.id] = TreeNode::Split {
                feature_idx: split.feature_idx,
                threshold: split.threshold,
                left,
                right,
                n_samples: n,
                gain: split.gain,
            };

            stack.push(PendingNode {
                id: right,
                indices: right_indices,
                depth: pending.depth + 1,
            });
            stack.push(PendingNode {
                id: left,
                indices: left_indices,
                depth: pending.depth + 1,
            });
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }

        let tree = DecisionTree {
            nodes,
            n_features,
            n_classes,
            feature_importances: Array1::from_vec(importances),
        };
        debug!(
            n_samples,
            n_nodes = tree.n_nodes(),
            depth = tree.depth(),
            "Fitted decision tree"
        );
        Ok(tree)
    }

    /// Best (feature, threshold) over all features.
    ///
    /// Features are scanned in parallel and reduced in index order, so equal
    /// gains resolve to the lowest feature index.
    fn find_best_split(
        &self,
        x: ArrayView2<f64>,
        y: &[usize],
        indices: &[usize],
        parent: &ClassCounts,
    ) -> Option<SplitCandidate> {
        let parent_impurity = self.config.criterion.impurity(parent.counts(), indices.len());

        let per_feature: Vec<Option<SplitCandidate>> = (0..x.ncols())
            .into_par_iter()
            .map(|feature_idx| {
                self.best_split_for_feature(x, y, indices, feature_idx, parent, parent_impurity)
            })
            .collect();

        per_feature
            .into_iter()
            .flatten()
            .fold(None, |best: Option<SplitCandidate>, candidate| match best {
                Some(b) if b.gain >= candidate.gain => Some(b),
                _ => Some(candidate),
            })
    }

    /// Sweep the sorted values of one feature, evaluating midpoints between
    /// consecutive distinct values in ascending order.
    fn best_split_for_feature(
        &self,
        x: ArrayView2<f64>,
        y: &[usize],
        indices: &[usize],
        feature_idx: usize,
        parent: &ClassCounts,
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        let n = indices.len();
        let mut pairs: Vec<(f64, usize)> = indices.iter().map(|&i| (x[[i, feature_idx]], y[i])).collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        // Positions i where pairs[i] and pairs[i + 1] hold distinct values
        let boundaries: Vec<usize> = (0..n.saturating_sub(1))
            .filter(|&i| pairs[i].0 < pairs[i + 1].0)
            .collect();
        let boundaries = self.limit_candidates(boundaries);
        if boundaries.is_empty() {
            return None;
        }

        let criterion = self.config.criterion;
        let min_leaf = self.config.min_samples_leaf;
        let mut left = vec![0usize; parent.counts().len()];
        let mut right = parent.counts().to_vec();
        let mut next = boundaries.iter().peekable();
        let mut best: Option<SplitCandidate> = None;
        let mut best_gain = self.config.min_info_gain + GAIN_EPSILON;

        for (i, &(_, label)) in pairs.iter().enumerate() {
            left[label] += 1;
            right[label] -= 1;

            if next.peek() != Some(&&i) {
                continue;
            }
            next.next();

            let n_left = i + 1;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }

            let gain = parent_impurity
                - (n_left as f64 / n as f64) * criterion.impurity(&left, n_left)
                - (n_right as f64 / n as f64) * criterion.impurity(&right, n_right);

            if gain > best_gain {
                let (lo, hi) = (pairs[i].0, pairs[i + 1].0);
                let mid = lo + (hi - lo) / 2.0;
                // Adjacent floats can round the midpoint down onto `lo`
                let threshold = if mid > lo { mid } else { hi };
                best_gain = gain;
                best = Some(SplitCandidate {
                    feature_idx,
                    threshold,
                    gain,
                });
            }

            if next.peek().is_none() {
                break;
            }
        }

        best
    }

    /// Evenly thin the candidate positions down to `max_bins - 1`
    fn limit_candidates(&self, boundaries: Vec<usize>) -> Vec<usize> {
        match self.config.max_bins {
            Some(bins) if boundaries.len() > bins - 1 => {
                let keep = bins - 1;
                (0..keep)
                    .map(|j| boundaries[(j * boundaries.len()) / keep])
                    .collect()
            }
            _ => boundaries,
        }
    }
}

/// Class histogram of the examples at `indices`
fn node_counts(y: &[usize], indices: &[usize], n_classes: usize) -> ClassCounts {
    indices
        .par_iter()
        .fold(
            || ClassCounts::new(n_classes),
            |acc, &i| acc.accumulate(y[i]),
        )
        .reduce(|| ClassCounts::new(n_classes), ClassCounts::merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_problem(n: usize, d: usize, seed: u64) -> (Array2<f64>, Vec<usize>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let x = Array2::from_shape_fn((n, d), |_| rng.gen_range(0.0..1.0));
        let y = (0..n).map(|_| rng.gen_range(0..2)).collect();
        (x, y)
    }

    #[test]
    fn test_impurity_values() {
        assert!((Criterion::Entropy.impurity(&[5, 5], 10) - 1.0).abs() < 1e-12);
        assert!((Criterion::Gini.impurity(&[5, 5], 10) - 0.5).abs() < 1e-12);
        assert_eq!(Criterion::Entropy.impurity(&[7, 0], 7), 0.0);
        assert_eq!(Criterion::Gini.impurity(&[0, 3], 3), 0.0);
    }

    #[test]
    fn test_criterion_from_str() {
        assert_eq!("Gini".parse::<Criterion>().unwrap(), Criterion::Gini);
        assert_eq!("entropy".parse::<Criterion>().unwrap(), Criterion::Entropy);
        assert!("variance".parse::<Criterion>().is_err());
    }

    #[test]
    fn test_class_counts_merge() {
        let a = [0, 1, 1].iter().fold(ClassCounts::new(2), |acc, &l| acc.accumulate(l));
        let b = [0, 0].iter().fold(ClassCounts::new(2), |acc, &l| acc.accumulate(l));
        let merged = a.clone().merge(b.clone());
        assert_eq!(merged, b.merge(a));
        assert_eq!(merged.counts(), &[3, 2]);
        assert_eq!(merged.majority(), 0);
    }

    #[test]
    fn test_separable_split() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = vec![0, 0, 1, 1];

        let tree = DecisionTreeTrainer::default().fit(x.view(), &y).unwrap();
        match tree.root() {
            TreeNode::Split { feature_idx, threshold, .. } => {
                assert_eq!(*feature_idx, 0);
                assert!((threshold - 2.5).abs() < 1e-12);
            }
            other => panic!("expected split, got {:?}", other),
        }

        for (row, &label) in x.rows().into_iter().zip(&y) {
            let p = tree.predict(row).unwrap();
            assert_eq!(p.label, label);
            assert_eq!(p.score, label as f64);
        }
    }

    #[test]
    fn test_single_label_gives_single_leaf() {
        let (x, _) = random_problem(50, 3, 1);
        let y = vec![1; 50];
        for depth in [1, 5, 30] {
            let tree = DecisionTreeTrainer::new(TreeConfig::default().with_max_depth(depth))
                .fit(x.view(), &y)
                .unwrap();
            assert_eq!(tree.n_nodes(), 1);
            assert!(matches!(tree.root(), TreeNode::Leaf { .. }));
            assert_eq!(tree.predict(x.row(0)).unwrap().label, 1);
        }
    }

    #[test]
    fn test_max_depth_respected() {
        let (x, y) = random_problem(200, 4, 2);
        for depth in 0..6 {
            for criterion in [Criterion::Entropy, Criterion::Gini] {
                let config = TreeConfig::default()
                    .with_max_depth(depth)
                    .with_criterion(criterion);
                let tree = DecisionTreeTrainer::new(config).fit(x.view(), &y).unwrap();
                assert!(tree.depth() <= depth, "depth {} > {}", tree.depth(), depth);
            }
        }
    }

    #[test]
    fn test_leaf_tie_goes_to_class_zero() {
        let x = array![[1.0], [2.0]];
        let y = vec![1, 0];
        let tree = DecisionTreeTrainer::new(TreeConfig::default().with_max_depth(0))
            .fit(x.view(), &y)
            .unwrap();
        let p = tree.predict(array![1.5].view()).unwrap();
        assert_eq!(p.label, 0);
        assert!((p.score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_ties_prefer_lowest_feature_then_threshold() {
        // Both features identical: feature 0 must win
        let x = array![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        // Thresholds 0.5 and 2.5 give equal gain: 0.5 must win
        let y = vec![0, 1, 1, 0];
        let tree = DecisionTreeTrainer::new(TreeConfig::default().with_max_depth(1))
            .fit(x.view(), &y)
            .unwrap();
        match tree.root() {
            TreeNode::Split { feature_idx, threshold, .. } => {
                assert_eq!(*feature_idx, 0);
                assert!((threshold - 0.5).abs() < 1e-12);
            }
            other => panic!("expected split, got {:?}", other),
        }
    }

    #[test]
    fn test_no_positive_gain_gives_leaf() {
        let x = array![[1.0], [1.0], [1.0], [1.0]];
        let y = vec![0, 1, 0, 1];
        let tree = DecisionTreeTrainer::default().fit(x.view(), &y).unwrap();
        assert_eq!(tree.n_nodes(), 1);
    }

    #[test]
    fn test_min_samples_split() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = vec![0, 0, 1, 1];
        let tree = DecisionTreeTrainer::new(TreeConfig::default().with_min_samples_split(5))
            .fit(x.view(), &y)
            .unwrap();
        assert_eq!(tree.n_leaves(), 1);
    }

    #[test]
    fn test_max_bins_limits_thresholds() {
        let x = Array2::from_shape_fn((100, 1), |(i, _)| i as f64);
        let y: Vec<usize> = (0..100).map(|i| usize::from(i >= 37)).collect();

        let exact = DecisionTreeTrainer::new(TreeConfig::default().with_max_depth(1))
            .fit(x.view(), &y)
            .unwrap();
        let binned = DecisionTreeTrainer::new(TreeConfig::default().with_max_depth(1).with_max_bins(4))
            .fit(x.view(), &y)
            .unwrap();

        let threshold = |tree: &DecisionTree| match tree.root() {
            TreeNode::Split { threshold, .. } => *threshold,
            _ => panic!("expected split"),
        };
        assert!((threshold(&exact) - 36.5).abs() < 1e-12);
        // Three candidates remain: after positions 0, 33 and 66
        assert!((threshold(&binned) - 33.5).abs() < 1e-12);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = vec![0, 0, 1, 1];
        let tree = DecisionTreeTrainer::default().fit(x.view(), &y).unwrap();
        let importances = tree.feature_importances();
        assert!((importances[0] - 1.0).abs() < 1e-12);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_deterministic_fit() {
        let (x, y) = random_problem(150, 3, 3);
        let a = DecisionTreeTrainer::default().fit(x.view(), &y).unwrap();
        let b = DecisionTreeTrainer::default().fit(x.view(), &y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_dataset() {
        let x = Array2::<f64>::zeros((0, 2));
        let result = DecisionTreeTrainer::default().fit(x.view(), &[]);
        assert!(matches!(result, Err(IdsError::EmptyDataset(_))));
    }

    #[test]
    fn test_invalid_config() {
        let x = array![[1.0]];
        let result = DecisionTreeTrainer::new(TreeConfig::default().with_min_samples_leaf(0))
            .fit(x.view(), &[0]);
        assert!(matches!(result, Err(IdsError::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_predict_shape_mismatch() {
        let x = array![[1.0, 2.0], [2.0, 1.0]];
        let tree = DecisionTreeTrainer::default().fit(x.view(), &[0, 1]).unwrap();
        assert!(tree.predict(array![1.0].view()).is_err());
    }
}
